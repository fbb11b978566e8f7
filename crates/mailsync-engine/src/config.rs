//! # Engine Settings
//!
//! Plain settings structs for the engine components. The application layer
//! builds these from its environment configuration; the engine itself
//! never reads the environment.
//!
//! Retry/circuit settings live in [`crate::gateway`], sweep intervals in
//! [`crate::scheduler`], next to the machinery they drive.

use mailsync_core::{MAX_DELTA_SYNC_FAILURES, MAX_NOTIFICATION_RETRIES};

// =============================================================================
// Delta Sync
// =============================================================================

/// Settings for the delta sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// How far back the initial sync reaches. Messages older than this
    /// that later change are never reconciled; accepted boundary.
    pub look_back_days: i64,

    /// Page size requested from the provider.
    pub page_size: u32,

    /// Consecutive delta failures before the mailbox is demoted to ERROR.
    pub max_consecutive_failures: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            look_back_days: 7,
            page_size: 50,
            max_consecutive_failures: MAX_DELTA_SYNC_FAILURES,
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Settings for the subscription lifecycle manager.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    /// Renewal sweep lead time: ACTIVE mailboxes whose subscription
    /// expires within this many hours are renewed.
    pub renewal_lead_hours: i64,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        SubscriptionSettings {
            renewal_lead_hours: 12,
        }
    }
}

// =============================================================================
// Webhook Processing
// =============================================================================

/// Settings for the webhook notification processor.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Shared secret the provider must echo in every notification.
    pub client_state: String,

    /// Processing attempts per notification before it is abandoned.
    pub max_retries: i64,

    /// Processed ledger entries older than this many days are purged by
    /// the cleanup sweep.
    pub retention_days: i64,
}

impl WebhookSettings {
    /// Settings with the given shared secret and default bounds.
    pub fn new(client_state: impl Into<String>) -> Self {
        WebhookSettings {
            client_state: client_state.into(),
            max_retries: MAX_NOTIFICATION_RETRIES,
            retention_days: 30,
        }
    }
}
