//! # Webhook Notification Processor
//!
//! Validates, persists and idempotently drains inbound change
//! notifications.
//!
//! ## Notification State Machine
//! ```text
//! received ──(delta sync ok)──────────► processed   (terminal)
//!    │
//!    └──(failure)──► failed, retry_count += 1
//!                       │
//!                       ├── retry sweep, while retry_count < max
//!                       └── at max: abandoned, kept for audit
//! ```
//!
//! Re-processing a notification is safe: the downstream action is a delta
//! sync keyed by cursor, and the engine's upsert rule makes repeated
//! application of the same change set a no-op beyond timestamp churn.

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::WebhookSettings;
use crate::error::{SyncError, SyncResult};
use crate::sync::DeltaSyncEngine;
use mailsync_core::WebhookNotification;
use mailsync_db::Database;

/// Processor for inbound webhook notifications.
#[derive(Clone)]
pub struct NotificationProcessor {
    db: Database,
    engine: DeltaSyncEngine,
    settings: WebhookSettings,
}

impl NotificationProcessor {
    /// Creates a new notification processor.
    pub fn new(db: Database, engine: DeltaSyncEngine, settings: WebhookSettings) -> Self {
        NotificationProcessor {
            db,
            engine,
            settings,
        }
    }

    /// Validates and persists one inbound notification, returning the
    /// ledger entry. Processing happens separately (see
    /// [`Self::spawn_process`]) so the webhook endpoint can acknowledge
    /// immediately.
    ///
    /// A client-state mismatch is rejected *before* any persistence: no
    /// ledger row is created for an unauthenticated notification.
    pub async fn accept(
        &self,
        subscription_id: &str,
        change_type: Option<String>,
        resource: Option<String>,
        client_state: Option<String>,
        raw_payload: Option<String>,
    ) -> SyncResult<WebhookNotification> {
        if client_state.as_deref() != Some(self.settings.client_state.as_str()) {
            return Err(SyncError::Validation(
                "client state token mismatch".to_string(),
            ));
        }

        let notification = WebhookNotification::new(
            subscription_id,
            change_type,
            resource,
            client_state,
            raw_payload,
        );
        self.db.notifications().insert(&notification).await?;

        info!(
            notification_id = %notification.id,
            subscription_id = %subscription_id,
            "Webhook notification accepted"
        );
        Ok(notification)
    }

    /// Processes a notification off the caller's path. The webhook
    /// endpoint calls this after [`Self::accept`] and returns without
    /// waiting for the outcome.
    pub fn spawn_process(&self, notification: WebhookNotification) {
        let processor = self.clone();
        tokio::spawn(async move {
            processor.process(&notification).await;
        });
    }

    /// One processing attempt: resolve the mailbox by subscription id and
    /// run a delta sync. All outcomes are recorded on the ledger entry;
    /// nothing propagates, the retry sweep owns unfinished entries.
    pub async fn process(&self, notification: &WebhookNotification) {
        debug!(
            notification_id = %notification.id,
            subscription_id = %notification.subscription_id,
            "Processing webhook notification"
        );

        let mailbox = match self
            .db
            .mailboxes()
            .find_by_subscription_id(&notification.subscription_id)
            .await
        {
            Ok(Some(mailbox)) => mailbox,
            Ok(None) => {
                error!(
                    subscription_id = %notification.subscription_id,
                    "No mailbox found for subscription"
                );
                self.record_failure(notification, "Mailbox not found for subscription")
                    .await;
                return;
            }
            Err(e) => {
                self.record_failure(notification, &e.to_string()).await;
                return;
            }
        };

        match self.engine.delta_sync(&mailbox.address).await {
            Ok(()) => {
                if let Err(e) = self.db.notifications().mark_processed(&notification.id).await {
                    error!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to mark notification processed"
                    );
                    return;
                }
                info!(
                    notification_id = %notification.id,
                    address = %mailbox.address,
                    "Webhook notification processed"
                );
            }
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    address = %mailbox.address,
                    error = %e,
                    "Webhook-triggered delta sync failed"
                );
                self.record_failure(notification, &e.to_string()).await;
            }
        }
    }

    /// Re-attempts unprocessed notifications with retries remaining,
    /// oldest received first. Returns how many entries were attempted.
    pub async fn retry_sweep(&self) -> SyncResult<usize> {
        let retryable = self
            .db
            .notifications()
            .list_retryable(self.settings.max_retries)
            .await?;

        if retryable.is_empty() {
            debug!("No failed notifications to retry");
            return Ok(0);
        }

        info!(count = retryable.len(), "Retrying failed notifications");

        for notification in &retryable {
            self.process(notification).await;
        }

        Ok(retryable.len())
    }

    /// Purges processed notifications older than the retention window.
    /// Unprocessed entries are never purged.
    pub async fn cleanup(&self) -> SyncResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.settings.retention_days);
        let purged = self.db.notifications().purge_processed_before(cutoff).await?;

        if purged > 0 {
            info!(purged, "Purged old processed notifications");
        }
        Ok(purged)
    }

    async fn record_failure(&self, notification: &WebhookNotification, message: &str) {
        if let Err(e) = self
            .db
            .notifications()
            .mark_failed(&notification.id, message)
            .await
        {
            error!(
                notification_id = %notification.id,
                error = %e,
                "Failed to record notification failure"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
