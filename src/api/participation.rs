//! Bounty participation handlers: register, cancel, complete

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::error::forbidden;
use crate::infrastructure::AppState;
use crate::infrastructure::auth::Claims;

#[utoipa::path(
    post,
    path = "/api/bounties/{id}/register",
    params(("id" = i32, Path, description = "Bounty id")),
    responses(
        (status = 201, description = "Registered"),
        (status = 400, description = "Bounty inactive, expired or full"),
        (status = 404, description = "Unknown user or bounty"),
        (status = 409, description = "Already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    claims: Claims,
    Path(bounty_id): Path<i32>,
) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_participate()) {
        return forbidden("Your role cannot join bounties");
    }

    match state.ledger.register(claims.user_id(), bounty_id).await {
        Ok(registration) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "participation": registration.participation,
                "registered_bounty_ids": registration.registered_bounty_ids
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    claims: Claims,
    Path(bounty_id): Path<i32>,
) -> impl IntoResponse {
    match state.ledger.cancel(claims.user_id(), bounty_id).await {
        Ok(participation) => Json(json!({
            "success": true,
            "participation": participation
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Request DTO for awarding a completion
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub user_id: i32,
    pub points_earned: i64,
    pub berries_earned: i64,
}

pub async fn complete(
    State(state): State<AppState>,
    claims: Claims,
    Path(bounty_id): Path<i32>,
    Json(payload): Json<CompleteRequest>,
) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_award_completions()) {
        return forbidden("Only admin or faculty can award completions");
    }

    // Achievements held before this completion, to report what it unlocked
    let baseline = state
        .achievements
        .get_user_achievements(payload.user_id)
        .await
        .ok();

    let participation = match state
        .ledger
        .complete(
            payload.user_id,
            bounty_id,
            payload.points_earned,
            payload.berries_earned,
        )
        .await
    {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    // The completion is committed; achievement trouble only costs the notification
    let new_achievements = match state
        .achievements
        .check_for_new_achievements(payload.user_id, baseline.as_ref())
        .await
    {
        Ok(found) => found.new_achievements,
        Err(e) => {
            tracing::error!(
                "Achievement check failed after completion for user {}: {}",
                payload.user_id,
                e
            );
            Vec::new()
        }
    };

    Json(json!({
        "success": true,
        "participation": participation,
        "new_achievements": new_achievements
    }))
    .into_response()
}
