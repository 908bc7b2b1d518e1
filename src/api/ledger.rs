use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use super::error::forbidden;
use crate::infrastructure::AppState;
use crate::infrastructure::auth::Claims;

pub async fn verify_integrity(State(state): State<AppState>, claims: Claims) -> impl IntoResponse {
    if !claims.role().is_some_and(|r| r.can_administer()) {
        return forbidden("Only admin or faculty can run the integrity check");
    }

    match state.ledger.verify_integrity().await {
        Ok(report) => Json(json!({
            "success": true,
            "consistent": report.is_consistent(),
            "report": report
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
