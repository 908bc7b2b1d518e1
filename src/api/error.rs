//! JSON error responses
//!
//! Every failure leaves the API as `{ "success": false, "code": ..., "error": ... }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::{ErrorKind, LedgerError};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::BusinessRule => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ResourceExhausted | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        // Store details stay in the logs
        let message = match &self {
            LedgerError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(json!({
                "success": false,
                "code": self.code(),
                "error": message
            })),
        )
            .into_response()
    }
}

pub fn forbidden(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "success": false,
            "code": "FORBIDDEN",
            "error": message
        })),
    )
        .into_response()
}
