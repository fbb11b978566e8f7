//! Operator-facing admin endpoints.
//!
//! Thin CRUD over the lifecycle state machine: every handler delegates to
//! the orchestrator, engine or subscription manager and surfaces failures
//! as non-2xx JSON.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;
use mailsync_core::{Mailbox, MailboxStatus};

/// Admin routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/mailboxes", get(list_mailboxes))
        .route("/api/admin/mailboxes/{address}", get(get_mailbox))
        .route(
            "/api/admin/mailboxes/{address}/initialize",
            post(initialize_mailbox),
        )
        .route(
            "/api/admin/mailboxes/{address}/reinitialize",
            post(reinitialize_mailbox),
        )
        .route("/api/admin/mailboxes/{address}/sync", post(trigger_sync))
        .route(
            "/api/admin/mailboxes/{address}/subscription/renew",
            post(renew_subscription),
        )
        .route("/api/admin/stats", get(get_stats))
}

// =============================================================================
// DTOs
// =============================================================================

/// Per-mailbox status view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxStatusDto {
    pub address: String,
    pub sync_status: String,
    pub initial_sync_completed: bool,
    pub subscription_id: Option<String>,
    pub subscription_expiration: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: i64,
    pub email_count: i64,
}

impl MailboxStatusDto {
    fn from_mailbox(mailbox: Mailbox, email_count: i64) -> Self {
        MailboxStatusDto {
            address: mailbox.address,
            sync_status: mailbox.status.to_string(),
            initial_sync_completed: mailbox.initial_sync_done,
            subscription_id: mailbox.subscription_id,
            subscription_expiration: mailbox.subscription_expires_at,
            last_sync_time: mailbox.last_synced_at,
            last_error: mailbox.last_error,
            consecutive_failures: mailbox.consecutive_failures,
            email_count,
        }
    }
}

/// Aggregate service statistics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    pub total_mailboxes: i64,
    pub active_mailboxes: i64,
    pub total_emails: i64,
    pub pending_notifications: i64,
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_mailboxes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MailboxStatusDto>>, ApiError> {
    let mailboxes = state.db.mailboxes().list_all().await?;

    let mut dtos = Vec::with_capacity(mailboxes.len());
    for mailbox in mailboxes {
        let email_count = state.db.emails().count_by_mailbox(&mailbox.id).await?;
        dtos.push(MailboxStatusDto::from_mailbox(mailbox, email_count));
    }

    Ok(Json(dtos))
}

async fn get_mailbox(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<MailboxStatusDto>, ApiError> {
    let mailbox = state
        .db
        .mailboxes()
        .find_by_address(&address)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Mailbox not found: {address}")))?;

    let email_count = state.db.emails().count_by_mailbox(&mailbox.id).await?;
    Ok(Json(MailboxStatusDto::from_mailbox(mailbox, email_count)))
}

async fn initialize_mailbox(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(address = %address, "Admin triggered initialization");

    state.orchestrator.initialize(&address).await?;
    Ok(success("Mailbox initialized successfully"))
}

async fn reinitialize_mailbox(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(address = %address, "Admin triggered reinitialization");

    state.orchestrator.reinitialize(&address).await?;
    Ok(success("Mailbox reinitialized successfully"))
}

async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(address = %address, "Admin triggered manual sync");

    state.engine.delta_sync(&address).await?;
    Ok(success("Manual sync completed successfully"))
}

async fn renew_subscription(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(address = %address, "Admin triggered subscription renewal");

    state.subscriptions.renew(&address).await?;
    Ok(success("Subscription renewed successfully"))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsDto>, ApiError> {
    let mailboxes = state.db.mailboxes();

    let stats = StatsDto {
        total_mailboxes: mailboxes.count().await?,
        active_mailboxes: mailboxes.count_by_status(MailboxStatus::Active).await?,
        total_emails: state.db.emails().count().await?,
        pending_notifications: state.db.notifications().count_pending().await?,
    };

    Ok(Json(stats))
}

fn success(message: &str) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "message": message,
    }))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dto_reflects_mailbox_fields() {
        let mut mailbox = Mailbox::new("a@x.com");
        mailbox.status = MailboxStatus::Active;
        mailbox.initial_sync_done = true;
        mailbox.subscription_id = Some("sub-1".into());
        mailbox.subscription_expires_at = Some(Utc::now());
        mailbox.last_error = Some("old error".into());

        let dto = MailboxStatusDto::from_mailbox(mailbox, 42);

        assert_eq!(dto.address, "a@x.com");
        assert_eq!(dto.sync_status, "ACTIVE");
        assert!(dto.initial_sync_completed);
        assert_eq!(dto.subscription_id.as_deref(), Some("sub-1"));
        assert_eq!(dto.email_count, 42);
    }

    #[test]
    fn status_dto_serializes_camel_case() {
        let dto = MailboxStatusDto::from_mailbox(Mailbox::new("a@x.com"), 0);
        let value = serde_json::to_value(&dto).unwrap();

        assert_eq!(value["syncStatus"], "NOT_INITIALIZED");
        assert_eq!(value["initialSyncCompleted"], false);
        assert!(value.get("emailCount").is_some());
    }
}
