//! Application state containing services and shared resources

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::{AchievementCache, AchievementConfig, Clock, CodeGenerator, SystemClock};
use crate::infrastructure::SeaOrmAchievementRepository;
use crate::infrastructure::config::Config;
use crate::services::{AchievementService, InMemoryAchievementCache, LedgerService, RandomCodeGenerator};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    /// Register / complete / cancel / claim
    pub ledger: Arc<LedgerService>,
    /// Cached achievement snapshots, leaderboard and cache administration
    pub achievements: Arc<AchievementService>,
}

impl AppState {
    /// Production wiring: system clock, random codes, in-memory cache
    pub fn new(db: DatabaseConnection, config: &Config) -> Self {
        Self::with_parts(
            db,
            config,
            Arc::new(SystemClock),
            Arc::new(RandomCodeGenerator::new()),
        )
    }

    /// Wiring with an explicit clock and code source
    pub fn with_parts(
        db: DatabaseConnection,
        config: &Config,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        let cache: Arc<dyn AchievementCache> = Arc::new(InMemoryAchievementCache::new(
            config.achievement_cache_ttl_secs,
            config.achievement_cache_max_entries,
            clock.clone(),
        ));

        let ledger = Arc::new(LedgerService::new(
            db.clone(),
            clock,
            codes,
            cache.clone(),
            config.ledger_settings(),
        ));

        let achievements = Arc::new(AchievementService::new(
            Arc::new(SeaOrmAchievementRepository::new(db.clone())),
            cache,
            Arc::new(AchievementConfig::default()),
            config.calc_budget(),
        ));

        Self {
            db,
            ledger,
            achievements,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

// Implement FromRef to allow extracting DatabaseConnection from AppState
impl axum::extract::FromRef<AppState> for DatabaseConnection {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
