//! In-memory achievement cache
//!
//! Maps user id to the last computed snapshot. Entries expire after the TTL and
//! the map is kept at `max_entries`: when full, the oldest fifth (rounded up) is
//! evicted before a new user is inserted. Concurrent inserts of distinct new users
//! can briefly overshoot, and the insert trims back down afterwards.
//!
//! Each user also has an invalidation epoch. A snapshot is only stored, and only
//! served, while the epoch it was computed under is still current. A snapshot
//! computed from a read that raced with an invalidation is therefore never cached.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{AchievementCache, AchievementSnapshot, CacheStats, Clock};

pub const DEFAULT_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: AchievementSnapshot,
    computed_at: DateTime<Utc>,
    epoch: u64,
}

pub struct InMemoryAchievementCache {
    entries: DashMap<i32, CacheEntry>,
    invalidations: DashMap<i32, u64>,
    clears: AtomicU64,
    ttl: Duration,
    ttl_secs: u64,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryAchievementCache {
    pub fn new(ttl_secs: u64, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            invalidations: DashMap::new(),
            clears: AtomicU64::new(0),
            ttl: Duration::seconds(
                i64::try_from(ttl_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            ttl_secs,
            max_entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves forward on every invalidation of `user_id` and on every clear
    pub fn epoch_of(&self, user_id: i32) -> u64 {
        let clears = self.clears.load(Ordering::SeqCst);
        let own = self
            .invalidations
            .get(&user_id)
            .map(|count| *count)
            .unwrap_or(0);
        clears + own
    }

    fn is_valid(&self, user_id: i32, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.computed_at < self.ttl && entry.epoch == self.epoch_of(user_id)
    }

    /// Fresh snapshot for a user; a stale entry is dropped and counted as a miss
    pub fn lookup(&self, user_id: i32) -> Option<AchievementSnapshot> {
        let now = self.clock.now();

        let fresh = self
            .entries
            .get(&user_id)
            .filter(|entry| self.is_valid(user_id, entry, now))
            .map(|entry| entry.snapshot.clone());

        match fresh {
            Some(snapshot) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Achievement cache hit for user {}", user_id);
                Some(snapshot)
            }
            None => {
                self.entries
                    .remove_if(&user_id, |_, entry| !self.is_valid(user_id, entry, now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Achievement cache miss for user {}", user_id);
                None
            }
        }
    }

    /// Store a snapshot computed from data read at `epoch`
    pub fn store(&self, user_id: i32, snapshot: AchievementSnapshot, epoch: u64) {
        if self.max_entries == 0 {
            return;
        }
        if epoch != self.epoch_of(user_id) {
            tracing::debug!(
                "Discarding achievement snapshot for user {} computed before an invalidation",
                user_id
            );
            return;
        }
        if !self.entries.contains_key(&user_id) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            user_id,
            CacheEntry {
                snapshot,
                computed_at: self.clock.now(),
                epoch,
            },
        );
        while self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let mut ages: Vec<(DateTime<Utc>, i32)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().computed_at, *entry.key()))
            .collect();
        ages.sort();

        let to_remove = ages.len().div_ceil(5);
        for (_, user_id) in ages.into_iter().take(to_remove) {
            self.entries.remove(&user_id);
        }
        tracing::debug!("Achievement cache full, evicted {} entries", to_remove);
    }

    pub fn remove(&self, user_id: i32) {
        // Bump first so a concurrent store sees the new epoch
        *self.invalidations.entry(user_id).or_insert(0) += 1;
        if self.entries.remove(&user_id).is_some() {
            tracing::debug!("Invalidated achievement cache for user {}", user_id);
        }
    }

    pub fn reset(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        tracing::info!("Achievement cache cleared");
    }

    pub fn snapshot_stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total_entries = self.entries.len();
        let valid_entries = self
            .entries
            .iter()
            .filter(|entry| self.is_valid(*entry.key(), entry.value(), now))
            .count();

        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries.saturating_sub(valid_entries),
            max_entries: self.max_entries,
            ttl_secs: self.ttl_secs,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl AchievementCache for InMemoryAchievementCache {
    async fn get(&self, user_id: i32) -> Option<AchievementSnapshot> {
        self.lookup(user_id)
    }

    async fn epoch(&self, user_id: i32) -> u64 {
        self.epoch_of(user_id)
    }

    async fn set(&self, user_id: i32, snapshot: AchievementSnapshot, epoch: u64) {
        self.store(user_id, snapshot, epoch)
    }

    async fn invalidate(&self, user_id: i32) {
        self.remove(user_id)
    }

    async fn clear(&self) {
        self.reset()
    }

    async fn stats(&self) -> CacheStats {
        self.snapshot_stats()
    }
}
