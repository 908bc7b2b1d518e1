//! Reward claim handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use super::error::forbidden;
use crate::infrastructure::AppState;
use crate::infrastructure::auth::Claims;

#[utoipa::path(
    post,
    path = "/api/rewards/{id}/claim",
    params(("id" = i32, Path, description = "Reward id")),
    responses(
        (status = 201, description = "Reward claimed, redeemable code issued"),
        (status = 400, description = "Reward expired or insufficient berries"),
        (status = 404, description = "Unknown user or reward"),
        (status = 409, description = "Reward already claimed")
    )
)]
pub async fn claim_reward(
    State(state): State<AppState>,
    claims: Claims,
    Path(reward_id): Path<i32>,
) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_participate()) {
        return forbidden("Your role cannot claim rewards");
    }

    match state.ledger.claim(claims.user_id(), reward_id).await {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": format!("Successfully claimed {}", receipt.reward_name),
                "claim": receipt.claim,
                "reward_name": receipt.reward_name,
                "berries_spent": receipt.berries_spent,
                "remaining_berries": receipt.remaining_berries
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_claimed(State(state): State<AppState>, claims: Claims) -> impl IntoResponse {
    match state.ledger.claims_for_user(claims.user_id()).await {
        Ok(claims) => Json(json!({
            "success": true,
            "total": claims.len(),
            "claims": claims
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn lookup_code(
    State(state): State<AppState>,
    claims: Claims,
    Path(code): Path<String>,
) -> impl IntoResponse {
    match state.ledger.redeem_code_lookup(&code).await {
        Ok(record) => {
            let is_staff = claims.role().is_some_and(|r| r.can_administer());
            if record.claim.user_id != claims.user_id() && !is_staff {
                return forbidden("This code belongs to another user");
            }
            Json(json!({ "success": true, "claim": record })).into_response()
        }
        Err(e) => e.into_response(),
    }
}
