//! Domain error types
//!
//! Every failure a ledger or achievement operation can report is one variant of
//! [`LedgerError`]. Callers branch on the variant (or its stable [`code`](LedgerError::code)),
//! never on the rendered message.

use serde::Serialize;
use thiserror::Error;

use crate::models::ParticipationStatus;

/// Coarse classification used by the API layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    BusinessRule,
    ResourceExhausted,
    Timeout,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Negative points passed to a completion
    #[error("Points earned cannot be negative (got {0})")]
    InvalidPointsEarned(i64),

    /// Negative berries passed to a completion
    #[error("Berries earned cannot be negative (got {0})")]
    InvalidBerriesEarned(i64),

    #[error("User {0} not found")]
    UserNotFound(i32),

    #[error("Bounty {0} not found")]
    BountyNotFound(i32),

    #[error("Reward {0} not found")]
    RewardNotFound(i32),

    #[error("User {user_id} has no participation in bounty {bounty_id}")]
    ParticipationNotFound { user_id: i32, bounty_id: i32 },

    #[error("No claim carries redeemable code {0}")]
    InvalidRedeemableCode(String),

    #[error("User {user_id} is already registered for bounty {bounty_id}")]
    DuplicateParticipation { user_id: i32, bounty_id: i32 },

    #[error("User {user_id} has already claimed reward {reward_id}")]
    RewardAlreadyClaimed { user_id: i32, reward_id: i32 },

    #[error("Bounty {0} is not active")]
    BountyNotActive(i32),

    #[error("Bounty {0} has expired")]
    BountyExpired(i32),

    #[error("Bounty {0} has no remaining capacity")]
    BountyFull(i32),

    #[error("Bounty {0} is already completed")]
    BountyAlreadyCompleted(i32),

    #[error("Cannot cancel completed bounty {0}")]
    CannotCancelCompletedBounty(i32),

    #[error("Participation cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: ParticipationStatus,
        to: ParticipationStatus,
    },

    #[error("Reward {0} has expired")]
    RewardExpired(i32),

    #[error("Insufficient berries: {available} available, {required} required")]
    InsufficientBerries { available: i64, required: i64 },

    #[error("Unable to generate a unique redeemable code after {attempts} attempts")]
    UnableToGenerateUniqueCode { attempts: u32 },

    /// A row lock (or the connection guarding it) was not obtained in time
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    /// Store failure; the message is logged, never shown to clients
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidPointsEarned(_) => "INVALID_POINTS_EARNED",
            LedgerError::InvalidBerriesEarned(_) => "INVALID_BERRIES_EARNED",
            LedgerError::UserNotFound(_) => "USER_NOT_FOUND",
            LedgerError::BountyNotFound(_) => "BOUNTY_NOT_FOUND",
            LedgerError::RewardNotFound(_) => "REWARD_NOT_FOUND",
            LedgerError::ParticipationNotFound { .. } => "PARTICIPATION_NOT_FOUND",
            LedgerError::InvalidRedeemableCode(_) => "INVALID_REDEEMABLE_CODE",
            LedgerError::DuplicateParticipation { .. } => "DUPLICATE_PARTICIPATION",
            LedgerError::RewardAlreadyClaimed { .. } => "REWARD_ALREADY_CLAIMED",
            LedgerError::BountyNotActive(_) => "BOUNTY_NOT_ACTIVE",
            LedgerError::BountyExpired(_) => "BOUNTY_EXPIRED",
            LedgerError::BountyFull(_) => "BOUNTY_FULL",
            LedgerError::BountyAlreadyCompleted(_) => "BOUNTY_ALREADY_COMPLETED",
            LedgerError::CannotCancelCompletedBounty(_) => "CANNOT_CANCEL_COMPLETED_BOUNTY",
            LedgerError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            LedgerError::RewardExpired(_) => "REWARD_EXPIRED",
            LedgerError::InsufficientBerries { .. } => "INSUFFICIENT_BERRIES",
            LedgerError::UnableToGenerateUniqueCode { .. } => "UNABLE_TO_GENERATE_UNIQUE_CODE",
            LedgerError::LockTimeout => "LOCK_TIMEOUT",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidPointsEarned(_) | LedgerError::InvalidBerriesEarned(_) => {
                ErrorKind::Validation
            }
            LedgerError::UserNotFound(_)
            | LedgerError::BountyNotFound(_)
            | LedgerError::RewardNotFound(_)
            | LedgerError::ParticipationNotFound { .. }
            | LedgerError::InvalidRedeemableCode(_) => ErrorKind::NotFound,
            LedgerError::DuplicateParticipation { .. } | LedgerError::RewardAlreadyClaimed { .. } => {
                ErrorKind::Conflict
            }
            LedgerError::BountyNotActive(_)
            | LedgerError::BountyExpired(_)
            | LedgerError::BountyFull(_)
            | LedgerError::BountyAlreadyCompleted(_)
            | LedgerError::CannotCancelCompletedBounty(_)
            | LedgerError::InvalidStatusTransition { .. }
            | LedgerError::RewardExpired(_)
            | LedgerError::InsufficientBerries { .. } => ErrorKind::BusinessRule,
            LedgerError::UnableToGenerateUniqueCode { .. } => ErrorKind::ResourceExhausted,
            LedgerError::LockTimeout => ErrorKind::Timeout,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sea_orm::DbErr> for LedgerError {
    fn from(e: sea_orm::DbErr) -> Self {
        if is_lock_timeout(&e) {
            tracing::warn!("Row lock wait aborted by the store: {}", e);
            return LedgerError::LockTimeout;
        }
        tracing::error!("Store failure: {}", e);
        LedgerError::Internal(e.to_string())
    }
}

/// True for a unique-index violation, the backstop behind the duplicate checks
pub fn is_unique_violation(e: &sea_orm::DbErr) -> bool {
    matches!(
        e.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

/// Postgres `lock_not_available` (55P03) and SQLite BUSY/LOCKED
fn is_lock_timeout(e: &sea_orm::DbErr) -> bool {
    use sea_orm::{DbErr, RuntimeErr};

    let sqlx_err = match e {
        DbErr::Query(RuntimeErr::SqlxError(inner)) | DbErr::Exec(RuntimeErr::SqlxError(inner)) => {
            inner
        }
        _ => return false,
    };

    match sqlx_err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("55P03") | Some("5") | Some("6")
        ),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}
