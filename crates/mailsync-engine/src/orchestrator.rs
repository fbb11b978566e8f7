//! # Mailbox Orchestrator
//!
//! Top-level lifecycle driver composing the sync engine and subscription
//! manager on mailbox add/initialize/reinitialize.
//!
//! ## Lifecycle
//! ```text
//! initialize:   NOT_INITIALIZED/ERROR ──► INITIALIZING ──(full sync)──►
//!               create subscription ──► ACTIVE
//!               (any failure ──► ERROR, message + counter recorded)
//!
//! reinitialize: any state ──(best-effort teardown)──► NOT_INITIALIZED
//!               (state reset) ──► initialize
//! ```

use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::subscription::SubscriptionManager;
use crate::sync::DeltaSyncEngine;
use mailsync_core::MailboxStatus;
use mailsync_db::Database;

/// Lifecycle driver for monitored mailboxes.
#[derive(Clone)]
pub struct MailboxOrchestrator {
    db: Database,
    engine: DeltaSyncEngine,
    subscriptions: SubscriptionManager,
}

impl MailboxOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(db: Database, engine: DeltaSyncEngine, subscriptions: SubscriptionManager) -> Self {
        MailboxOrchestrator {
            db,
            engine,
            subscriptions,
        }
    }

    /// Initializes every configured mailbox. Per-mailbox failures are
    /// logged and do not abort the loop; the admin surface can retry
    /// individual mailboxes later.
    pub async fn initialize_configured(&self, addresses: &[String]) {
        info!(count = addresses.len(), "Initializing configured mailboxes");

        for address in addresses {
            if let Err(e) = self.initialize(address).await {
                error!(
                    address = %address,
                    error = %e,
                    "Failed to initialize mailbox, continuing"
                );
            }
        }

        info!("Mailbox initialization pass complete");
    }

    /// Brings one mailbox to ACTIVE: create-on-first-reference, full sync
    /// if needed, then a fresh push subscription.
    ///
    /// Idempotent: an already-ACTIVE, fully-synced mailbox is a no-op.
    /// A DISABLED mailbox is refused; only [`Self::reinitialize`] revives
    /// it. On failure the mailbox lands in ERROR with the message
    /// recorded, and the error propagates to the caller.
    pub async fn initialize(&self, address: &str) -> SyncResult<()> {
        info!(address = %address, "Initializing mailbox");

        let mailbox = self.db.mailboxes().get_or_create(address).await?;

        if mailbox.status == MailboxStatus::Disabled {
            return Err(SyncError::MailboxDisabled(address.to_string()));
        }

        if mailbox.is_active() {
            info!(address = %address, "Mailbox already initialized and active");
            return Ok(());
        }

        // An ERROR mailbox re-earns ACTIVE through a successful sync, it
        // never flips back silently.
        let needs_full_sync =
            !mailbox.initial_sync_done || mailbox.status == MailboxStatus::Error;

        let result: SyncResult<()> = async {
            if needs_full_sync {
                self.engine.initial_sync(address).await?;
            }
            self.subscriptions.create(address).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.promote_if_recovered(address).await?;
                info!(address = %address, "Mailbox initialized");
                Ok(())
            }
            Err(e) => {
                error!(address = %address, error = %e, "Mailbox initialization failed");
                self.record_initialization_failure(address, &e).await;
                Err(e)
            }
        }
    }

    /// Tears the mailbox down best-effort, clears all sync and
    /// subscription state, and runs `initialize` from scratch.
    pub async fn reinitialize(&self, address: &str) -> SyncResult<()> {
        info!(address = %address, "Reinitializing mailbox");

        let mailbox = self
            .db
            .mailboxes()
            .find_by_address(address)
            .await?
            .ok_or_else(|| SyncError::MailboxNotFound(address.to_string()))?;

        if mailbox.subscription_id.is_some() {
            if let Err(e) = self.subscriptions.delete(address).await {
                warn!(
                    address = %address,
                    error = %e,
                    "Best-effort subscription teardown failed during reinitialization"
                );
            }
        }

        // Reload: the teardown path may have bumped the row version.
        let mut mailbox = self.db.mailboxes().get_by_address(address).await?;
        mailbox.reset();
        self.db.mailboxes().update(&mailbox).await?;

        self.initialize(address).await
    }

    /// A mailbox whose mirror survived (initial sync done) and which now
    /// holds a fresh subscription is serviceable again, e.g. after
    /// SUBSCRIPTION_EXPIRED. ERROR recovery always goes through a full
    /// sync, which already promoted the mailbox.
    async fn promote_if_recovered(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.db.mailboxes().get_by_address(address).await?;

        if !mailbox.is_active() && mailbox.initial_sync_done {
            mailbox.status = MailboxStatus::Active;
            mailbox.last_error = None;
            self.db.mailboxes().update(&mailbox).await?;
        }

        Ok(())
    }

    async fn record_initialization_failure(&self, address: &str, error: &SyncError) {
        match self.db.mailboxes().find_by_address(address).await {
            Ok(Some(mut mailbox)) => {
                mailbox.status = MailboxStatus::Error;
                mailbox.last_error = Some(error.to_string());
                if let Err(db_err) = self.db.mailboxes().update(&mailbox).await {
                    error!(
                        address = %address,
                        error = %db_err,
                        "Failed to record initialization failure"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    address = %address,
                    error = %e,
                    "Failed to load mailbox while recording initialization failure"
                );
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
