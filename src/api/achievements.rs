//! Achievement handlers, leaderboard and cache administration

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::error::forbidden;
use crate::infrastructure::AppState;
use crate::infrastructure::auth::Claims;

pub async fn get_my_achievements(
    State(state): State<AppState>,
    claims: Claims,
) -> impl IntoResponse {
    let user_id = claims.user_id();

    let snapshot = match state.achievements.get_user_achievements(user_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return e.into_response(),
    };
    let progress = match state.achievements.progress(user_id).await {
        Ok(progress) => progress,
        Err(e) => return e.into_response(),
    };

    Json(json!({
        "success": true,
        "achievements": snapshot,
        "progress": progress
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u64>,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    match state.achievements.leaderboard(query.limit).await {
        Ok(entries) => Json(json!({ "success": true, "leaderboard": entries })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_cache_stats(State(state): State<AppState>, claims: Claims) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_administer()) {
        return forbidden("Only admin or faculty can inspect the achievement cache");
    }
    let stats = state.achievements.cache_stats().await;
    Json(json!({ "success": true, "stats": stats })).into_response()
}

pub async fn clear_cache(State(state): State<AppState>, claims: Claims) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_administer()) {
        return forbidden("Only admin or faculty can clear the achievement cache");
    }
    state.achievements.clear_cache().await;
    Json(json!({ "success": true, "message": "Achievement cache cleared" })).into_response()
}

pub async fn invalidate_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_administer()) {
        return forbidden("Only admin or faculty can invalidate achievement cache entries");
    }
    state.achievements.invalidate_user(user_id).await;
    Json(json!({
        "success": true,
        "message": format!("Achievement cache invalidated for user {}", user_id)
    }))
    .into_response()
}
