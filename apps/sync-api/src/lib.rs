//! # Mailsync API
//!
//! HTTP service keeping local mailbox mirrors synchronized with the email
//! provider.
//!
//! ## Surfaces
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mailsync API Server                             │
//! │                                                                         │
//! │  Provider ──► POST /api/webhooks/notifications ──► NotificationProc.   │
//! │  Provider ──► GET  /api/webhooks/notifications ──► validation echo     │
//! │                                                                         │
//! │  Operator ──► /api/admin/mailboxes/...  ──► Orchestrator / Engine      │
//! │  Probes   ──► GET /health                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables, see [`config::AppConfig`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use mailsync_db::Database;
use mailsync_engine::{
    DeltaSyncEngine, MailboxOrchestrator, NotificationProcessor, SubscriptionManager,
};

// Re-exports
pub use config::AppConfig;
pub use error::ApiError;

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Database,
    pub engine: DeltaSyncEngine,
    pub subscriptions: SubscriptionManager,
    pub notifications: NotificationProcessor,
    pub orchestrator: MailboxOrchestrator,
}

/// Builds the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(routes::webhook::routes())
        .merge(routes::admin::routes())
        .with_state(state)
}

/// Liveness probe.
async fn health_handler() -> &'static str {
    "OK"
}
