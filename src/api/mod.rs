pub mod achievements;
pub mod error;
pub mod health;
pub mod ledger;
pub mod participation;
pub mod rewards;
pub mod user;

use axum::{
    Router,
    routing::{get, post},
};

use crate::infrastructure::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Bounty participation
        .route("/bounties/:id/register", post(participation::register))
        .route("/bounties/:id/cancel", post(participation::cancel))
        .route("/bounties/:id/complete", post(participation::complete))
        // Rewards
        .route("/rewards/:id/claim", post(rewards::claim_reward))
        .route("/rewards/claimed", get(rewards::list_claimed))
        .route("/rewards/codes/:code", get(rewards::lookup_code))
        // Balance
        .route("/users/me/balance", get(user::get_my_balance))
        // Achievements
        .route("/achievements/me", get(achievements::get_my_achievements))
        .route("/achievements/leaderboard", get(achievements::get_leaderboard))
        .route("/achievements/cache/stats", get(achievements::get_cache_stats))
        .route("/achievements/cache/clear", post(achievements::clear_cache))
        .route(
            "/achievements/cache/invalidate/:user_id",
            post(achievements::invalidate_user),
        )
        // Ledger administration
        .route("/ledger/integrity", get(ledger::verify_integrity))
        .with_state(state)
}
