//! # Subscription Lifecycle Manager
//!
//! Creates, renews and tears down provider push subscriptions, and runs
//! the periodic sweep over subscriptions nearing expiry.
//!
//! ## Escalation Ladder
//! Renewal is the one path that escalates instead of retrying silently:
//! renew → fall back to create → mark SUBSCRIPTION_EXPIRED and propagate.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SubscriptionSettings;
use crate::error::{SyncError, SyncResult};
use crate::provider::{ProviderClient, ProviderError};
use mailsync_core::{Mailbox, MailboxStatus};
use mailsync_db::Database;

/// Manager for provider push subscriptions.
#[derive(Clone)]
pub struct SubscriptionManager {
    db: Database,
    provider: Arc<dyn ProviderClient>,
    settings: SubscriptionSettings,
}

impl SubscriptionManager {
    /// Creates a new subscription manager.
    pub fn new(
        db: Database,
        provider: Arc<dyn ProviderClient>,
        settings: SubscriptionSettings,
    ) -> Self {
        SubscriptionManager {
            db,
            provider,
            settings,
        }
    }

    /// Creates a fresh subscription for the mailbox and persists its id
    /// and expiry.
    ///
    /// Any existing subscription is deleted best-effort first: a stale
    /// external subscription must never block creating its replacement,
    /// so teardown failures are logged and swallowed.
    pub async fn create(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.load(address).await?;

        info!(address = %address, "Creating subscription");

        if let Some(existing) = mailbox.subscription_id.clone() {
            if let Err(e) = self.provider.delete_subscription(&existing).await {
                warn!(
                    address = %address,
                    subscription_id = %existing,
                    error = %e,
                    "Failed to delete existing subscription, continuing"
                );
            }
        }

        let subscription = self.provider.create_subscription(address).await?;

        mailbox.subscription_id = Some(subscription.id.clone());
        mailbox.subscription_expires_at = Some(subscription.expires_at);
        self.db.mailboxes().update(&mailbox).await?;

        info!(
            address = %address,
            subscription_id = %subscription.id,
            expires_at = %subscription.expires_at,
            "Subscription created"
        );
        Ok(())
    }

    /// Extends the mailbox's subscription.
    ///
    /// A mailbox without a subscription id delegates to [`Self::create`]
    /// (self-healing, same policy as delta sync without a cursor). A
    /// failed renewal falls back to `create`; if that also fails the
    /// mailbox is marked SUBSCRIPTION_EXPIRED and the error propagates.
    pub async fn renew(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.load(address).await?;

        let Some(subscription_id) = mailbox.subscription_id.clone() else {
            warn!(
                address = %address,
                "No subscription id found, creating new subscription"
            );
            return self.create(address).await;
        };

        info!(address = %address, subscription_id = %subscription_id, "Renewing subscription");

        match self.provider.renew_subscription(&subscription_id).await {
            Ok(expires_at) => {
                mailbox.subscription_expires_at = Some(expires_at);
                self.db.mailboxes().update(&mailbox).await?;

                info!(
                    address = %address,
                    subscription_id = %subscription_id,
                    expires_at = %expires_at,
                    "Subscription renewed"
                );
                Ok(())
            }
            Err(renew_err) => {
                warn!(
                    address = %address,
                    error = %renew_err,
                    "Renewal failed, attempting to create replacement subscription"
                );

                match self.create(address).await {
                    Ok(()) => Ok(()),
                    Err(create_err) => {
                        error!(
                            address = %address,
                            error = %create_err,
                            "Replacement subscription failed, marking SUBSCRIPTION_EXPIRED"
                        );

                        // Reload: create() may have bumped the row version.
                        let mut mailbox = self.db.mailboxes().get_by_address(address).await?;
                        mailbox.status = MailboxStatus::SubscriptionExpired;
                        mailbox.last_error = Some(create_err.to_string());
                        self.db.mailboxes().update(&mailbox).await?;

                        Err(create_err)
                    }
                }
            }
        }
    }

    /// Deletes the mailbox's subscription, clears the subscription fields
    /// and soft-disables the mailbox.
    ///
    /// A provider-side not-found is success: the goal state already holds.
    pub async fn delete(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.load(address).await?;

        let Some(subscription_id) = mailbox.subscription_id.clone() else {
            warn!(address = %address, "No subscription id found, nothing to delete");
            return Ok(());
        };

        info!(address = %address, subscription_id = %subscription_id, "Deleting subscription");

        match self.provider.delete_subscription(&subscription_id).await {
            Ok(()) => {}
            Err(ProviderError::NotFound(_)) => {
                debug!(
                    subscription_id = %subscription_id,
                    "Subscription already gone on provider side"
                );
            }
            Err(e) => return Err(e.into()),
        }

        mailbox.subscription_id = None;
        mailbox.subscription_expires_at = None;
        mailbox.status = MailboxStatus::Disabled;
        self.db.mailboxes().update(&mailbox).await?;

        info!(address = %address, "Subscription deleted, mailbox disabled");
        Ok(())
    }

    /// Renews every ACTIVE mailbox whose subscription expires within the
    /// configured lead time. Per-mailbox failures are logged and do not
    /// abort the sweep. Returns the number of successful renewals.
    pub async fn sweep(&self) -> SyncResult<usize> {
        let threshold = Utc::now() + Duration::hours(self.settings.renewal_lead_hours);
        let candidates = self
            .db
            .mailboxes()
            .list_expiring_subscriptions(threshold)
            .await?;

        if candidates.is_empty() {
            debug!("No subscriptions need renewal");
            return Ok(0);
        }

        info!(count = candidates.len(), "Renewing expiring subscriptions");

        let mut renewed = 0;
        for mailbox in candidates {
            match self.renew(&mailbox.address).await {
                Ok(()) => renewed += 1,
                Err(e) => {
                    error!(
                        address = %mailbox.address,
                        error = %e,
                        "Failed to renew subscription, continuing sweep"
                    );
                }
            }
        }

        Ok(renewed)
    }

    async fn load(&self, address: &str) -> SyncResult<Mailbox> {
        self.db
            .mailboxes()
            .find_by_address(address)
            .await?
            .ok_or_else(|| SyncError::MailboxNotFound(address.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
