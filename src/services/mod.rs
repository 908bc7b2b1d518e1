//! Services Layer
//!
//! Business logic behind the HTTP handlers: the ledger transaction core, the
//! achievement engine and the cache-aware achievement service.

pub mod achievement_cache;
pub mod achievement_engine;
pub mod achievement_service;
pub mod ledger_service;
pub mod redeem_code;

pub use achievement_cache::InMemoryAchievementCache;
pub use achievement_service::{AchievementService, NewAchievements};
pub use ledger_service::{
    ClaimReceipt, ClaimRecord, IntegrityReport, LedgerBalance, LedgerService, LedgerSettings,
    Registration,
};
pub use redeem_code::RandomCodeGenerator;
