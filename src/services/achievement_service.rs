//! Achievement Service - cache-aware access to achievement snapshots

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{
    Achievement, AchievementCache, AchievementConfig, AchievementProgress, AchievementRepository,
    AchievementSnapshot, CacheStats, LeaderboardEntry, LedgerError,
};
use crate::services::achievement_engine;

pub const DEFAULT_CALC_BUDGET_MS: u64 = 200;
pub const DEFAULT_LEADERBOARD_LIMIT: u64 = 10;
pub const MAX_LEADERBOARD_LIMIT: u64 = 100;
const RECENT_ACHIEVEMENTS: usize = 5;

/// Achievements earned since a baseline, with the snapshot they came from
#[derive(Debug, Clone, Serialize)]
pub struct NewAchievements {
    pub new_achievements: Vec<Achievement>,
    pub snapshot: AchievementSnapshot,
}

pub struct AchievementService {
    repo: Arc<dyn AchievementRepository>,
    cache: Arc<dyn AchievementCache>,
    config: Arc<AchievementConfig>,
    calc_budget: Duration,
}

impl AchievementService {
    pub fn new(
        repo: Arc<dyn AchievementRepository>,
        cache: Arc<dyn AchievementCache>,
        config: Arc<AchievementConfig>,
        calc_budget: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            config,
            calc_budget,
        }
    }

    pub fn config(&self) -> &AchievementConfig {
        &self.config
    }

    async fn compute(&self, user_id: i32) -> Result<AchievementSnapshot, LedgerError> {
        let history = self.repo.ledger_history(user_id).await?;

        let started = Instant::now();
        let snapshot = achievement_engine::calculate(&self.config, &history);
        let elapsed = started.elapsed();

        if elapsed > self.calc_budget {
            tracing::warn!(
                "Achievement calculation for user {} took {:?} (budget {:?}, {} completions)",
                user_id,
                elapsed,
                self.calc_budget,
                history.completions.len()
            );
        }

        Ok(snapshot)
    }

    /// Cached snapshot, or a fresh computation stored for next time
    pub async fn get_user_achievements(
        &self,
        user_id: i32,
    ) -> Result<AchievementSnapshot, LedgerError> {
        if let Some(snapshot) = self.cache.get(user_id).await {
            return Ok(snapshot);
        }

        let epoch = self.cache.epoch(user_id).await;
        let snapshot = self.compute(user_id).await?;
        self.cache.set(user_id, snapshot.clone(), epoch).await;
        Ok(snapshot)
    }

    /// Achievements held now that `baseline` did not hold.
    /// Without a baseline every earned achievement counts as new.
    pub async fn check_for_new_achievements(
        &self,
        user_id: i32,
        baseline: Option<&AchievementSnapshot>,
    ) -> Result<NewAchievements, LedgerError> {
        let snapshot = self.get_user_achievements(user_id).await?;

        let new_achievements: Vec<Achievement> = snapshot
            .earned()
            .filter(|a| baseline.is_none_or(|before| !before.has(&a.id)))
            .cloned()
            .collect();

        if !new_achievements.is_empty() {
            tracing::info!(
                "User {} earned {} new achievement(s): {}",
                user_id,
                new_achievements.len(),
                new_achievements
                    .iter()
                    .map(|a| a.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(NewAchievements {
            new_achievements,
            snapshot,
        })
    }

    /// Earned count, next milestone and the most recently earned achievements
    pub async fn progress(&self, user_id: i32) -> Result<AchievementProgress, LedgerError> {
        let snapshot = self.get_user_achievements(user_id).await?;

        let mut recent: Vec<Achievement> = snapshot.earned().cloned().collect();
        recent.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        recent.truncate(RECENT_ACHIEVEMENTS);

        Ok(AchievementProgress {
            user_id,
            achievement_count: snapshot.statistics.achievement_count,
            next_milestone: snapshot.statistics.next_milestone.clone(),
            recent,
        })
    }

    pub async fn leaderboard(&self, limit: Option<u64>) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT);
        self.repo.leaderboard(limit).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn invalidate_user(&self, user_id: i32) {
        self.cache.invalidate(user_id).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await
    }
}
