use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::infrastructure::AppState;
use crate::infrastructure::auth::Claims;

#[utoipa::path(
    get,
    path = "/api/users/me/balance",
    responses(
        (status = 200, description = "Points and berries derived from the ledger"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_my_balance(State(state): State<AppState>, claims: Claims) -> impl IntoResponse {
    match state.ledger.balance(claims.user_id()).await {
        Ok(balance) => Json(json!({ "success": true, "balance": balance })).into_response(),
        Err(e) => e.into_response(),
    }
}
