//! Repository and collaborator trait definitions
//!
//! Implementations live in the infrastructure and services layers.

use async_trait::async_trait;
use serde::Serialize;

use super::LedgerError;
use super::achievements::{AchievementSnapshot, LeaderboardEntry, LedgerHistory};

/// Read-only queries feeding the achievement engine
#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// Completed participations of a user joined with their bounties
    async fn ledger_history(&self, user_id: i32) -> Result<LedgerHistory, LedgerError>;

    /// Users with at least one completion, best first
    async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, LedgerError>;
}

/// Counters reported by an achievement cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Per-user snapshot cache. Best-effort: a miss only costs a recomputation.
#[async_trait]
pub trait AchievementCache: Send + Sync {
    async fn get(&self, user_id: i32) -> Option<AchievementSnapshot>;

    /// Changes whenever the user's entry is invalidated or the cache is cleared.
    /// Read it before loading the data a snapshot is computed from.
    async fn epoch(&self, user_id: i32) -> u64;

    /// Dropped when `epoch` is no longer current for the user
    async fn set(&self, user_id: i32, snapshot: AchievementSnapshot, epoch: u64);

    async fn invalidate(&self, user_id: i32);

    async fn clear(&self);

    async fn stats(&self) -> CacheStats;
}

/// Source of redeemable code candidates
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}
