//! API error mapping.
//!
//! Admin endpoints surface the underlying error message with a non-2xx
//! status. The webhook endpoint never uses this type for provider-facing
//! responses; it always acknowledges (see `routes::webhook`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use mailsync_db::DbError;
use mailsync_engine::SyncError;

/// Error returned by admin handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        let status = match &error {
            SyncError::MailboxNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::MailboxDisabled(_) => StatusCode::CONFLICT,
            SyncError::Validation(_) => StatusCode::UNAUTHORIZED,
            SyncError::Provider(_) => StatusCode::BAD_GATEWAY,
            SyncError::Db(db) => db_status(db),
        };
        ApiError::new(status, error.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        ApiError::new(db_status(&error), error.to_string())
    }
}

fn db_status(error: &DbError) -> StatusCode {
    match error {
        DbError::NotFound { .. } => StatusCode::NOT_FOUND,
        DbError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}
