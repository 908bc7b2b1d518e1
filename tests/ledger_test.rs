//! Ledger transaction tests against in-memory SQLite

use berries_ledger::db;
use berries_ledger::domain::{
    AchievementCache, CodeGenerator, LedgerError, ManualClock,
};
use berries_ledger::models::participation::ParticipationStatus;
use berries_ledger::models::{bounty, reward, reward_claim, user};
use berries_ledger::services::{
    InMemoryAchievementCache, LedgerService, LedgerSettings, RandomCodeGenerator,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

struct Harness {
    db: DatabaseConnection,
    clock: Arc<ManualClock>,
    cache: Arc<InMemoryAchievementCache>,
    ledger: Arc<LedgerService>,
}

async fn harness_with(settings: LedgerSettings, codes: Arc<dyn CodeGenerator>) -> Harness {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    let clock = Arc::new(ManualClock::new(start()));
    let cache = Arc::new(InMemoryAchievementCache::new(3600, 100, clock.clone()));
    let ledger = Arc::new(LedgerService::new(
        db.clone(),
        clock.clone(),
        codes,
        cache.clone(),
        settings,
    ));

    Harness {
        db,
        clock,
        cache,
        ledger,
    }
}

async fn harness() -> Harness {
    harness_with(
        LedgerSettings::default(),
        Arc::new(RandomCodeGenerator::seeded(7)),
    )
    .await
}

// Helper to create a test user
async fn create_user(db: &DatabaseConnection, name: &str, role: &str) -> i32 {
    let model = user::ActiveModel {
        name: Set(name.to_string()),
        role: Set(role.to_string()),
        college_id: Set(None),
        created_at: Set(start()),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create user").id
}

// Helper to create an active, open-ended bounty
async fn create_bounty(db: &DatabaseConnection, name: &str, kind: &str, points: i64) -> i32 {
    create_bounty_with(db, name, kind, points, None, None, true).await
}

async fn create_bounty_with(
    db: &DatabaseConnection,
    name: &str,
    kind: &str,
    points: i64,
    scheduled_date: Option<DateTime<Utc>>,
    capacity: Option<i32>,
    is_active: bool,
) -> i32 {
    let model = bounty::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        bounty_type: Set(kind.to_string()),
        alloted_points: Set(points),
        alloted_berries: Set(points / 10),
        scheduled_date: Set(scheduled_date),
        capacity: Set(capacity),
        is_active: Set(is_active),
        created_at: Set(start()),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create bounty").id
}

async fn create_reward(
    db: &DatabaseConnection,
    name: &str,
    cost: i64,
    expiry_date: Option<DateTime<Utc>>,
) -> i32 {
    let model = reward::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        berries_required: Set(cost),
        expiry_date: Set(expiry_date),
        created_at: Set(start()),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create reward").id
}

/// Give a user `berries` by registering for and completing a fresh bounty
async fn earn(h: &Harness, user_id: i32, points: i64, berries: i64) {
    let bounty_id = create_bounty(&h.db, "Earner", "coding", points).await;
    h.ledger.register(user_id, bounty_id).await.unwrap();
    h.ledger
        .complete(user_id, bounty_id, points, berries)
        .await
        .unwrap();
}

async fn claim_count(db: &DatabaseConnection, user_id: i32) -> u64 {
    reward_claim::Entity::find()
        .filter(reward_claim::Column::UserId.eq(user_id))
        .count(db)
        .await
        .unwrap()
}

/// Always proposes the same code
struct FixedCode;

impl CodeGenerator for FixedCode {
    fn generate(&self) -> String {
        "RWDFIXED000".to_string()
    }
}

#[tokio::test]
async fn test_register_creates_registered_participation() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let first = create_bounty(&h.db, "First", "coding", 100).await;
    let second = create_bounty(&h.db, "Second", "design", 100).await;

    h.ledger.register(user_id, second).await.unwrap();
    let registration = h.ledger.register(user_id, first).await.unwrap();

    assert_eq!(
        registration.participation.status,
        ParticipationStatus::Registered
    );
    assert_eq!(registration.participation.points_earned, 0);
    assert_eq!(registration.participation.berries_earned, 0);
    assert_eq!(registration.participation.registered_at, start());
    assert!(registration.participation.completed_at.is_none());
    assert_eq!(registration.registered_bounty_ids, vec![first, second]);
}

#[tokio::test]
async fn test_register_unknown_user_or_bounty() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Real", "coding", 100).await;

    assert_eq!(
        h.ledger.register(999, bounty_id).await.unwrap_err(),
        LedgerError::UserNotFound(999)
    );
    assert_eq!(
        h.ledger.register(user_id, 999).await.unwrap_err(),
        LedgerError::BountyNotFound(999)
    );
}

#[tokio::test]
async fn test_register_rejects_inactive_and_expired_bounties() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let inactive = create_bounty_with(&h.db, "Paused", "coding", 100, None, None, false).await;
    let expired = create_bounty_with(
        &h.db,
        "Yesterday",
        "coding",
        100,
        Some(start() - Duration::days(1)),
        None,
        true,
    )
    .await;
    let upcoming = create_bounty_with(
        &h.db,
        "Tomorrow",
        "coding",
        100,
        Some(start() + Duration::days(1)),
        None,
        true,
    )
    .await;

    assert_eq!(
        h.ledger.register(user_id, inactive).await.unwrap_err(),
        LedgerError::BountyNotActive(inactive)
    );
    assert_eq!(
        h.ledger.register(user_id, expired).await.unwrap_err(),
        LedgerError::BountyExpired(expired)
    );
    assert!(h.ledger.register(user_id, upcoming).await.is_ok());

    // Passing the date blocks new registrations only
    h.clock.advance(Duration::days(2));
    let other = create_user(&h.db, "Riley", "student").await;
    assert_eq!(
        h.ledger.register(other, upcoming).await.unwrap_err(),
        LedgerError::BountyExpired(upcoming)
    );
    assert!(h.ledger.complete(user_id, upcoming, 100, 10).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Once", "coding", 100).await;

    h.ledger.register(user_id, bounty_id).await.unwrap();
    let err = h.ledger.register(user_id, bounty_id).await.unwrap_err();

    assert_eq!(err, LedgerError::DuplicateParticipation { user_id, bounty_id });
    assert_eq!(err.code(), "DUPLICATE_PARTICIPATION");
}

#[tokio::test]
async fn test_capacity_counts_only_live_participations() {
    let h = harness().await;
    let a = create_user(&h.db, "A", "student").await;
    let b = create_user(&h.db, "B", "student").await;
    let c = create_user(&h.db, "C", "student").await;
    let bounty_id = create_bounty_with(&h.db, "Tiny", "design", 100, None, Some(1), true).await;

    h.ledger.register(a, bounty_id).await.unwrap();
    assert_eq!(
        h.ledger.register(b, bounty_id).await.unwrap_err(),
        LedgerError::BountyFull(bounty_id)
    );

    h.ledger.cancel(a, bounty_id).await.unwrap();
    h.ledger.register(b, bounty_id).await.unwrap();
    assert_eq!(
        h.ledger.register(c, bounty_id).await.unwrap_err(),
        LedgerError::BountyFull(bounty_id)
    );
}

#[tokio::test]
async fn test_complete_credits_points_and_berries() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Work", "coding", 500).await;
    h.ledger.register(user_id, bounty_id).await.unwrap();

    h.clock.advance(Duration::hours(3));
    let done = h.ledger.complete(user_id, bounty_id, 450, 45).await.unwrap();

    assert_eq!(done.status, ParticipationStatus::Completed);
    assert_eq!(done.points_earned, 450);
    assert_eq!(done.berries_earned, 45);
    assert_eq!(done.completed_at, Some(start() + Duration::hours(3)));

    let balance = h.ledger.balance(user_id).await.unwrap();
    assert_eq!(balance.total_points, 450);
    assert_eq!(balance.net_berries, 45);
}

#[tokio::test]
async fn test_complete_validates_amounts_before_touching_rows() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Work", "coding", 500).await;
    h.ledger.register(user_id, bounty_id).await.unwrap();

    assert_eq!(
        h.ledger.complete(user_id, bounty_id, -1, 10).await.unwrap_err(),
        LedgerError::InvalidPointsEarned(-1)
    );
    assert_eq!(
        h.ledger.complete(user_id, bounty_id, 10, -5).await.unwrap_err(),
        LedgerError::InvalidBerriesEarned(-5)
    );
    // Validation wins even when the participation does not exist
    assert_eq!(
        h.ledger.complete(user_id, 999, -1, 0).await.unwrap_err(),
        LedgerError::InvalidPointsEarned(-1)
    );

    let balance = h.ledger.balance(user_id).await.unwrap();
    assert_eq!(balance.total_points, 0);
    assert_eq!(balance.net_berries, 0);
}

#[tokio::test]
async fn test_complete_state_machine_errors() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let done = create_bounty(&h.db, "Done", "coding", 100).await;
    let dropped = create_bounty(&h.db, "Dropped", "coding", 100).await;

    assert_eq!(
        h.ledger.complete(user_id, done, 100, 10).await.unwrap_err(),
        LedgerError::ParticipationNotFound {
            user_id,
            bounty_id: done
        }
    );

    h.ledger.register(user_id, done).await.unwrap();
    h.ledger.complete(user_id, done, 100, 10).await.unwrap();
    assert_eq!(
        h.ledger.complete(user_id, done, 100, 10).await.unwrap_err(),
        LedgerError::BountyAlreadyCompleted(done)
    );

    h.ledger.register(user_id, dropped).await.unwrap();
    h.ledger.cancel(user_id, dropped).await.unwrap();
    assert_eq!(
        h.ledger.complete(user_id, dropped, 100, 10).await.unwrap_err(),
        LedgerError::InvalidStatusTransition {
            from: ParticipationStatus::Cancelled,
            to: ParticipationStatus::Completed
        }
    );

    // Only the first completion was credited
    assert_eq!(h.ledger.balance(user_id).await.unwrap().net_berries, 10);
}

#[tokio::test]
async fn test_cancel_rules() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Maybe", "writing", 100).await;
    let finished = create_bounty(&h.db, "Finished", "writing", 100).await;

    h.ledger.register(user_id, bounty_id).await.unwrap();
    let cancelled = h.ledger.cancel(user_id, bounty_id).await.unwrap();
    assert_eq!(cancelled.status, ParticipationStatus::Cancelled);

    assert_eq!(
        h.ledger.cancel(user_id, bounty_id).await.unwrap_err(),
        LedgerError::InvalidStatusTransition {
            from: ParticipationStatus::Cancelled,
            to: ParticipationStatus::Cancelled
        }
    );

    h.ledger.register(user_id, finished).await.unwrap();
    h.ledger.complete(user_id, finished, 100, 10).await.unwrap();
    assert_eq!(
        h.ledger.cancel(user_id, finished).await.unwrap_err(),
        LedgerError::CannotCancelCompletedBounty(finished)
    );

    assert_eq!(
        h.ledger.cancel(user_id, 999).await.unwrap_err(),
        LedgerError::ParticipationNotFound {
            user_id,
            bounty_id: 999
        }
    );
}

#[tokio::test]
async fn test_claim_spends_reward_cost() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 1000, 120).await;
    let reward_id = create_reward(&h.db, "Hoodie", 50, Some(start() + Duration::days(30))).await;

    let receipt = h.ledger.claim(user_id, reward_id).await.unwrap();

    assert_eq!(receipt.reward_name, "Hoodie");
    assert_eq!(receipt.berries_spent, 50);
    assert_eq!(receipt.remaining_berries, 70);
    assert_eq!(receipt.claim.berries_spent, 50);
    assert_eq!(receipt.claim.claimed_at, start());
    assert!(receipt.claim.redeemable_code.starts_with("RWD"));

    let balance = h.ledger.balance(user_id).await.unwrap();
    assert_eq!(balance.total_berries_earned, 120);
    assert_eq!(balance.total_berries_spent, 50);
    assert_eq!(balance.net_berries, 70);
    assert_eq!(balance.total_points, 1000);
}

#[tokio::test]
async fn test_claim_with_insufficient_berries_changes_nothing() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 400, 40).await;
    let reward_id = create_reward(&h.db, "Voucher", 50, None).await;

    let err = h.ledger.claim(user_id, reward_id).await.unwrap_err();

    assert_eq!(
        err,
        LedgerError::InsufficientBerries {
            available: 40,
            required: 50
        }
    );
    assert_eq!(claim_count(&h.db, user_id).await, 0);
    assert_eq!(h.ledger.balance(user_id).await.unwrap().net_berries, 40);
}

#[tokio::test]
async fn test_expired_reward_rejects_everyone() {
    let h = harness().await;
    let rich = create_user(&h.db, "Rich", "student").await;
    let poor = create_user(&h.db, "Poor", "student").await;
    earn(&h, rich, 5000, 500).await;
    let reward_id = create_reward(&h.db, "Old", 10, Some(start() - Duration::hours(1))).await;

    for user_id in [rich, poor] {
        assert_eq!(
            h.ledger.claim(user_id, reward_id).await.unwrap_err(),
            LedgerError::RewardExpired(reward_id)
        );
    }
}

#[tokio::test]
async fn test_claim_unknown_user_or_reward() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let reward_id = create_reward(&h.db, "Mug", 1, None).await;

    assert_eq!(
        h.ledger.claim(999, reward_id).await.unwrap_err(),
        LedgerError::UserNotFound(999)
    );
    assert_eq!(
        h.ledger.claim(user_id, 999).await.unwrap_err(),
        LedgerError::RewardNotFound(999)
    );
}

#[tokio::test]
async fn test_second_claim_is_rejected() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 1000, 100).await;
    let reward_id = create_reward(&h.db, "Sticker", 10, None).await;

    h.ledger.claim(user_id, reward_id).await.unwrap();
    assert_eq!(
        h.ledger.claim(user_id, reward_id).await.unwrap_err(),
        LedgerError::RewardAlreadyClaimed { user_id, reward_id }
    );
    assert_eq!(h.ledger.balance(user_id).await.unwrap().net_berries, 90);
}

#[tokio::test]
async fn test_code_generation_gives_up_after_max_attempts() {
    let settings = LedgerSettings {
        max_code_attempts: 3,
        ..LedgerSettings::default()
    };
    let h = harness_with(settings, Arc::new(FixedCode)).await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 1000, 100).await;
    let first = create_reward(&h.db, "First", 10, None).await;
    let second = create_reward(&h.db, "Second", 10, None).await;

    let receipt = h.ledger.claim(user_id, first).await.unwrap();
    assert_eq!(receipt.claim.redeemable_code, "RWDFIXED000");

    let err = h.ledger.claim(user_id, second).await.unwrap_err();
    assert_eq!(err, LedgerError::UnableToGenerateUniqueCode { attempts: 3 });
    assert_eq!(claim_count(&h.db, user_id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_yield_exactly_one_success() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 1000, 100).await;
    let reward_id = create_reward(&h.db, "Ticket", 10, None).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = h.ledger.clone();
            tokio::spawn(async move { ledger.claim(user_id, reward_id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::RewardAlreadyClaimed { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(claim_count(&h.db, user_id).await, 1);
    assert_eq!(h.ledger.balance(user_id).await.unwrap().net_berries, 90);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_yield_exactly_one_success() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Popular", "coding", 100).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = h.ledger.clone();
            tokio::spawn(async move { ledger.register(user_id, bounty_id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::DuplicateParticipation { .. })))
            .count(),
        9
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_overdraw() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 500, 50).await;

    let mut rewards = Vec::new();
    for i in 0..5 {
        rewards.push(create_reward(&h.db, &format!("Reward {}", i), 20, None).await);
    }

    let handles: Vec<_> = rewards
        .into_iter()
        .map(|reward_id| {
            let ledger = h.ledger.clone();
            tokio::spawn(async move { ledger.claim(user_id, reward_id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(e) => matches!(e, LedgerError::InsufficientBerries { .. }),
    }));
    assert_eq!(h.ledger.balance(user_id).await.unwrap().net_berries, 10);
}

#[tokio::test]
async fn test_lock_wait_is_bounded() {
    let settings = LedgerSettings {
        lock_timeout: std::time::Duration::from_millis(100),
        ..LedgerSettings::default()
    };
    let h = harness_with(settings, Arc::new(RandomCodeGenerator::seeded(1))).await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Busy", "coding", 100).await;

    // Hold the only SQLite connection so the ledger cannot start its transaction
    let blocker = h.db.begin().await.unwrap();
    let err = h.ledger.register(user_id, bounty_id).await.unwrap_err();
    assert_eq!(err, LedgerError::LockTimeout);
    assert_eq!(err.code(), "LOCK_TIMEOUT");
    blocker.rollback().await.unwrap();

    assert!(h.ledger.register(user_id, bounty_id).await.is_ok());
}

#[tokio::test]
async fn test_completion_invalidates_cached_achievements() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    let bounty_id = create_bounty(&h.db, "Work", "coding", 100).await;
    h.ledger.register(user_id, bounty_id).await.unwrap();

    let empty = berries_ledger::services::achievement_engine::calculate(
        &Default::default(),
        &Default::default(),
    );
    let epoch = h.cache.epoch(user_id).await;
    h.cache.set(user_id, empty, epoch).await;
    assert!(h.cache.get(user_id).await.is_some());

    // A cancellation does not change achievements and leaves the entry alone
    let other = create_bounty(&h.db, "Other", "coding", 100).await;
    h.ledger.register(user_id, other).await.unwrap();
    h.ledger.cancel(user_id, other).await.unwrap();
    assert!(h.cache.get(user_id).await.is_some());

    h.ledger.complete(user_id, bounty_id, 100, 10).await.unwrap();
    assert!(h.cache.get(user_id).await.is_none());
}

#[tokio::test]
async fn test_claim_history_and_code_lookup() {
    let h = harness().await;
    let user_id = create_user(&h.db, "Sam", "student").await;
    earn(&h, user_id, 1000, 100).await;
    let mug = create_reward(&h.db, "Mug", 10, None).await;
    let pen = create_reward(&h.db, "Pen", 5, None).await;

    let first = h.ledger.claim(user_id, mug).await.unwrap();
    h.clock.advance(Duration::minutes(5));
    let second = h.ledger.claim(user_id, pen).await.unwrap();

    let history = h.ledger.claims_for_user(user_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].claim.id, second.claim.id);
    assert_eq!(history[0].reward_name.as_deref(), Some("Pen"));
    assert_eq!(history[1].claim.id, first.claim.id);

    let found = h
        .ledger
        .redeem_code_lookup(&first.claim.redeemable_code)
        .await
        .unwrap();
    assert_eq!(found.claim.reward_id, mug);
    assert_eq!(found.reward_name.as_deref(), Some("Mug"));

    assert_eq!(
        h.ledger.redeem_code_lookup("RWDNOPE").await.unwrap_err(),
        LedgerError::InvalidRedeemableCode("RWDNOPE".to_string())
    );
    assert_eq!(
        h.ledger.balance(999).await.unwrap_err(),
        LedgerError::UserNotFound(999)
    );
}

#[tokio::test]
async fn test_integrity_report_flags_overdrawn_users() {
    let h = harness().await;
    let honest = create_user(&h.db, "Honest", "student").await;
    let overdrawn = create_user(&h.db, "Overdrawn", "student").await;
    earn(&h, honest, 300, 30).await;
    let reward_id = create_reward(&h.db, "Bike", 500, None).await;

    let report = h.ledger.verify_integrity().await.unwrap();
    assert!(report.is_consistent());

    // Written around the ledger, which would have refused it
    reward_claim::ActiveModel {
        user_id: Set(overdrawn),
        reward_id: Set(reward_id),
        berries_spent: Set(500),
        redeemable_code: Set("RWDBYPASS01".to_string()),
        claimed_at: Set(start()),
        ..Default::default()
    }
    .insert(&h.db)
    .await
    .unwrap();

    let report = h.ledger.verify_integrity().await.unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.negative_balances.len(), 1);
    assert_eq!(report.negative_balances[0].user_id, overdrawn);
    assert_eq!(report.negative_balances[0].amount, -500);
    assert!(report.negative_points.is_empty());
    assert!(report.duplicate_participations.is_empty());
    assert!(report.duplicate_claims.is_empty());
}
