//! Ledger Service - register, complete, cancel and claim
//!
//! Every mutation runs in one store transaction with the user row locked before
//! the bounty, participation or reward it touches. Lock waits are bounded by
//! `LedgerSettings::lock_timeout`. Dropping the transaction on an error path
//! rolls it back, so a failed operation never leaves a partial write behind.

use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::is_unique_violation;
use crate::domain::{AchievementCache, Clock, CodeGenerator, LedgerError};
use crate::models::participation::{self, ParticipationStatus};
use crate::models::{bounty, reward, reward_claim, user};

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub lock_timeout: Duration,
    pub max_code_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub participation: participation::Model,
    /// Bounties the user is currently registered for, this one included
    pub registered_bounty_ids: Vec<i32>,
}

/// Result of a successful reward claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReceipt {
    pub claim: reward_claim::Model,
    pub reward_name: String,
    pub berries_spent: i64,
    pub remaining_berries: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerBalance {
    pub user_id: i32,
    pub total_points: i64,
    pub total_berries_earned: i64,
    pub total_berries_spent: i64,
    pub net_berries: i64,
}

/// A claim with the name of the reward it bought
#[derive(Debug, Clone, Serialize)]
pub struct ClaimRecord {
    #[serde(flatten)]
    pub claim: reward_claim::Model,
    pub reward_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAmount {
    pub user_id: i32,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    pub user_id: i32,
    pub item_id: i32,
    pub count: u64,
}

/// Ledger-wide consistency check
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub checked_at: DateTime<Utc>,
    pub negative_balances: Vec<UserAmount>,
    pub negative_points: Vec<UserAmount>,
    pub duplicate_participations: Vec<DuplicatePair>,
    pub duplicate_claims: Vec<DuplicatePair>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.negative_balances.is_empty()
            && self.negative_points.is_empty()
            && self.duplicate_participations.is_empty()
            && self.duplicate_claims.is_empty()
    }
}

pub struct LedgerService {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    cache: Arc<dyn AchievementCache>,
    settings: LedgerSettings,
}

impl LedgerService {
    pub fn new(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        cache: Arc<dyn AchievementCache>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            db,
            clock,
            codes,
            cache,
            settings,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Run a lock acquisition, giving up after the configured timeout
    async fn within<T, F>(&self, what: &str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.settings.lock_timeout, fut).await {
            Ok(result) => result.map_err(LedgerError::from),
            Err(_) => {
                tracing::warn!(
                    "Gave up waiting for {} after {:?}",
                    what,
                    self.settings.lock_timeout
                );
                Err(LedgerError::LockTimeout)
            }
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, LedgerError> {
        self.within("a transaction", self.db.begin()).await
    }

    async fn lock_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: i32,
    ) -> Result<user::Model, LedgerError> {
        self.within(
            "user row",
            user::Entity::find_by_id(user_id).lock_exclusive().one(txn),
        )
        .await?
        .ok_or(LedgerError::UserNotFound(user_id))
    }

    async fn lock_participation(
        &self,
        txn: &DatabaseTransaction,
        user_id: i32,
        bounty_id: i32,
    ) -> Result<participation::Model, LedgerError> {
        self.within(
            "participation row",
            participation::Entity::find()
                .filter(participation::Column::UserId.eq(user_id))
                .filter(participation::Column::BountyId.eq(bounty_id))
                .lock_exclusive()
                .one(txn),
        )
        .await?
        .ok_or(LedgerError::ParticipationNotFound { user_id, bounty_id })
    }

    /// Register a user for a bounty
    pub async fn register(&self, user_id: i32, bounty_id: i32) -> Result<Registration, LedgerError> {
        let txn = self.begin().await?;

        self.lock_user(&txn, user_id).await?;
        let bounty = self
            .within(
                "bounty row",
                bounty::Entity::find_by_id(bounty_id).lock_exclusive().one(&txn),
            )
            .await?
            .ok_or(LedgerError::BountyNotFound(bounty_id))?;

        if !bounty.is_active {
            return Err(LedgerError::BountyNotActive(bounty_id));
        }

        let now = self.clock.now();
        if bounty.is_expired_at(now) {
            return Err(LedgerError::BountyExpired(bounty_id));
        }

        let existing = participation::Entity::find()
            .filter(participation::Column::UserId.eq(user_id))
            .filter(participation::Column::BountyId.eq(bounty_id))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::DuplicateParticipation { user_id, bounty_id });
        }

        if let Some(capacity) = bounty.capacity {
            let taken = participation::Entity::find()
                .filter(participation::Column::BountyId.eq(bounty_id))
                .filter(participation::Column::Status.ne(ParticipationStatus::Cancelled))
                .count(&txn)
                .await?;
            if taken >= u64::try_from(capacity).unwrap_or(0) {
                return Err(LedgerError::BountyFull(bounty_id));
            }
        }

        let row = participation::ActiveModel {
            user_id: Set(user_id),
            bounty_id: Set(bounty_id),
            status: Set(ParticipationStatus::Registered),
            points_earned: Set(0),
            berries_earned: Set(0),
            registered_at: Set(now),
            completed_at: Set(None),
            updated_at: Set(now),
            ..Default::default()
        };
        let participation = row.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateParticipation { user_id, bounty_id }
            } else {
                LedgerError::from(e)
            }
        })?;

        let registered_bounty_ids: Vec<i32> = participation::Entity::find()
            .select_only()
            .column(participation::Column::BountyId)
            .filter(participation::Column::UserId.eq(user_id))
            .filter(participation::Column::Status.eq(ParticipationStatus::Registered))
            .order_by_asc(participation::Column::BountyId)
            .into_tuple()
            .all(&txn)
            .await?;

        txn.commit().await?;

        tracing::info!("User {} registered for bounty {}", user_id, bounty_id);

        Ok(Registration {
            participation,
            registered_bounty_ids,
        })
    }

    /// Mark a registered participation completed and credit its points and berries
    pub async fn complete(
        &self,
        user_id: i32,
        bounty_id: i32,
        points_earned: i64,
        berries_earned: i64,
    ) -> Result<participation::Model, LedgerError> {
        if points_earned < 0 {
            return Err(LedgerError::InvalidPointsEarned(points_earned));
        }
        if berries_earned < 0 {
            return Err(LedgerError::InvalidBerriesEarned(berries_earned));
        }

        let txn = self.begin().await?;
        let current = self.lock_participation(&txn, user_id, bounty_id).await?;

        if current.status == ParticipationStatus::Completed {
            return Err(LedgerError::BountyAlreadyCompleted(bounty_id));
        }
        if !current.status.can_transition_to(ParticipationStatus::Completed) {
            return Err(LedgerError::InvalidStatusTransition {
                from: current.status,
                to: ParticipationStatus::Completed,
            });
        }

        let now = self.clock.now();
        let mut active: participation::ActiveModel = current.into();
        active.status = Set(ParticipationStatus::Completed);
        active.points_earned = Set(points_earned);
        active.berries_earned = Set(berries_earned);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        // Committed: the cached snapshot no longer matches the ledger
        self.cache.invalidate(user_id).await;

        tracing::info!(
            "User {} completed bounty {} (+{} points, +{} berries)",
            user_id,
            bounty_id,
            points_earned,
            berries_earned
        );

        Ok(updated)
    }

    /// Withdraw a registration
    pub async fn cancel(
        &self,
        user_id: i32,
        bounty_id: i32,
    ) -> Result<participation::Model, LedgerError> {
        let txn = self.begin().await?;
        let current = self.lock_participation(&txn, user_id, bounty_id).await?;

        if current.status == ParticipationStatus::Completed {
            return Err(LedgerError::CannotCancelCompletedBounty(bounty_id));
        }
        if !current.status.can_transition_to(ParticipationStatus::Cancelled) {
            return Err(LedgerError::InvalidStatusTransition {
                from: current.status,
                to: ParticipationStatus::Cancelled,
            });
        }

        let mut active: participation::ActiveModel = current.into();
        active.status = Set(ParticipationStatus::Cancelled);
        active.updated_at = Set(self.clock.now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!("User {} cancelled bounty {}", user_id, bounty_id);

        Ok(updated)
    }

    /// Spend berries on a reward and issue its redeemable code
    pub async fn claim(&self, user_id: i32, reward_id: i32) -> Result<ClaimReceipt, LedgerError> {
        let txn = self.begin().await?;

        self.lock_user(&txn, user_id).await?;
        let reward = self
            .within(
                "reward row",
                reward::Entity::find_by_id(reward_id).lock_exclusive().one(&txn),
            )
            .await?
            .ok_or(LedgerError::RewardNotFound(reward_id))?;

        let now = self.clock.now();
        if reward.is_expired_at(now) {
            return Err(LedgerError::RewardExpired(reward_id));
        }

        let existing = reward_claim::Entity::find()
            .filter(reward_claim::Column::UserId.eq(user_id))
            .filter(reward_claim::Column::RewardId.eq(reward_id))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::RewardAlreadyClaimed { user_id, reward_id });
        }

        // Recomputed from ledger rows under the user lock, never cached
        let balance = Self::balance_in(&txn, user_id).await?;
        if balance.net_berries < reward.berries_required {
            return Err(LedgerError::InsufficientBerries {
                available: balance.net_berries,
                required: reward.berries_required,
            });
        }

        let redeemable_code = self.unique_code(&txn).await?;

        let row = reward_claim::ActiveModel {
            user_id: Set(user_id),
            reward_id: Set(reward_id),
            berries_spent: Set(reward.berries_required),
            redeemable_code: Set(redeemable_code),
            claimed_at: Set(now),
            ..Default::default()
        };
        let claim = row.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::RewardAlreadyClaimed { user_id, reward_id }
            } else {
                LedgerError::from(e)
            }
        })?;

        txn.commit().await?;

        let remaining_berries = balance.net_berries - claim.berries_spent;
        tracing::info!(
            "User {} claimed reward {} for {} berries ({} left)",
            user_id,
            reward_id,
            claim.berries_spent,
            remaining_berries
        );

        Ok(ClaimReceipt {
            berries_spent: claim.berries_spent,
            reward_name: reward.name,
            remaining_berries,
            claim,
        })
    }

    async fn unique_code(&self, txn: &DatabaseTransaction) -> Result<String, LedgerError> {
        let attempts = self.settings.max_code_attempts;

        for attempt in 1..=attempts {
            let candidate = self.codes.generate();
            let taken = reward_claim::Entity::find()
                .filter(reward_claim::Column::RedeemableCode.eq(candidate.as_str()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
            tracing::debug!("Redeemable code collision on attempt {}", attempt);
        }

        tracing::warn!("No unique redeemable code after {} attempts", attempts);
        Err(LedgerError::UnableToGenerateUniqueCode { attempts })
    }

    async fn balance_in<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
    ) -> Result<LedgerBalance, LedgerError> {
        let earned: Vec<(i64, i64)> = participation::Entity::find()
            .select_only()
            .column(participation::Column::PointsEarned)
            .column(participation::Column::BerriesEarned)
            .filter(participation::Column::UserId.eq(user_id))
            .filter(participation::Column::Status.eq(ParticipationStatus::Completed))
            .into_tuple()
            .all(conn)
            .await?;

        let spent: Vec<i64> = reward_claim::Entity::find()
            .select_only()
            .column(reward_claim::Column::BerriesSpent)
            .filter(reward_claim::Column::UserId.eq(user_id))
            .into_tuple()
            .all(conn)
            .await?;

        let total_points: i64 = earned.iter().map(|(points, _)| points).sum();
        let total_berries_earned: i64 = earned.iter().map(|(_, berries)| berries).sum();
        let total_berries_spent: i64 = spent.iter().sum();

        Ok(LedgerBalance {
            user_id,
            total_points,
            total_berries_earned,
            total_berries_spent,
            net_berries: total_berries_earned - total_berries_spent,
        })
    }

    /// Current totals for a user, derived from ledger rows
    pub async fn balance(&self, user_id: i32) -> Result<LedgerBalance, LedgerError> {
        user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        Self::balance_in(&self.db, user_id).await
    }

    /// Claim history, newest first
    pub async fn claims_for_user(&self, user_id: i32) -> Result<Vec<ClaimRecord>, LedgerError> {
        let claims = reward_claim::Entity::find()
            .filter(reward_claim::Column::UserId.eq(user_id))
            .order_by_desc(reward_claim::Column::ClaimedAt)
            .order_by_desc(reward_claim::Column::Id)
            .find_also_related(reward::Entity)
            .all(&self.db)
            .await?;

        Ok(claims
            .into_iter()
            .map(|(claim, reward)| ClaimRecord {
                claim,
                reward_name: reward.map(|r| r.name),
            })
            .collect())
    }

    /// Find the claim that issued a redeemable code
    pub async fn redeem_code_lookup(&self, code: &str) -> Result<ClaimRecord, LedgerError> {
        let (claim, reward) = reward_claim::Entity::find()
            .filter(reward_claim::Column::RedeemableCode.eq(code))
            .find_also_related(reward::Entity)
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::InvalidRedeemableCode(code.to_string()))?;

        Ok(ClaimRecord {
            claim,
            reward_name: reward.map(|r| r.name),
        })
    }

    /// Scan the whole ledger for states that must never be committed
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let participations: Vec<(i32, i32, ParticipationStatus, i64, i64)> =
            participation::Entity::find()
                .select_only()
                .column(participation::Column::UserId)
                .column(participation::Column::BountyId)
                .column(participation::Column::Status)
                .column(participation::Column::PointsEarned)
                .column(participation::Column::BerriesEarned)
                .into_tuple()
                .all(&self.db)
                .await?;

        let claims: Vec<(i32, i32, i64)> = reward_claim::Entity::find()
            .select_only()
            .column(reward_claim::Column::UserId)
            .column(reward_claim::Column::RewardId)
            .column(reward_claim::Column::BerriesSpent)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut points: BTreeMap<i32, i64> = BTreeMap::new();
        let mut berries: BTreeMap<i32, i64> = BTreeMap::new();
        let mut participation_pairs: HashMap<(i32, i32), u64> = HashMap::new();
        let mut claim_pairs: HashMap<(i32, i32), u64> = HashMap::new();

        for (user_id, bounty_id, status, earned_points, earned_berries) in participations {
            *participation_pairs.entry((user_id, bounty_id)).or_default() += 1;
            if status == ParticipationStatus::Completed {
                *points.entry(user_id).or_default() += earned_points;
                *berries.entry(user_id).or_default() += earned_berries;
            }
        }
        for (user_id, reward_id, spent) in claims {
            *claim_pairs.entry((user_id, reward_id)).or_default() += 1;
            *berries.entry(user_id).or_default() -= spent;
        }

        let negatives = |totals: &BTreeMap<i32, i64>| -> Vec<UserAmount> {
            totals
                .iter()
                .filter(|(_, amount)| **amount < 0)
                .map(|(user_id, amount)| UserAmount {
                    user_id: *user_id,
                    amount: *amount,
                })
                .collect()
        };
        let duplicates = |pairs: HashMap<(i32, i32), u64>| -> Vec<DuplicatePair> {
            let mut found: Vec<DuplicatePair> = pairs
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|((user_id, item_id), count)| DuplicatePair {
                    user_id,
                    item_id,
                    count,
                })
                .collect();
            found.sort_by_key(|d| (d.user_id, d.item_id));
            found
        };

        let report = IntegrityReport {
            checked_at: self.clock.now(),
            negative_balances: negatives(&berries),
            negative_points: negatives(&points),
            duplicate_participations: duplicates(participation_pairs),
            duplicate_claims: duplicates(claim_pairs),
        };

        if report.is_consistent() {
            tracing::info!("Ledger integrity check passed");
        } else {
            tracing::warn!(
                "Ledger integrity violations: {} negative balances, {} negative point totals, {} duplicate participations, {} duplicate claims",
                report.negative_balances.len(),
                report.negative_points.len(),
                report.duplicate_participations.len(),
                report.duplicate_claims.len()
            );
        }

        Ok(report)
    }
}
