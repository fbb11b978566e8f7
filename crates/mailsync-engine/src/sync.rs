//! # Delta Sync Engine
//!
//! Drives full (initial) and incremental (delta) synchronization for one
//! mailbox at a time and applies fetched change records to the local
//! mirror.
//!
//! ## Cursor Contract
//! The stored cursor only ever moves forward:
//! - a sync that fails before the terminal page leaves the cursor untouched
//! - a terminal page without a new cursor leaves the cursor untouched
//! - the cursor and the matching status fields are written together, after
//!   all fetched records were applied
//!
//! ## Per-Record Tolerance
//! One malformed message must never stall the whole mailbox: record-level
//! failures are logged and absorbed, and the sync still succeeds as long
//! as pagination and cursor retrieval succeed.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::locks::MailboxLocks;
use crate::provider::{Continuation, ProviderClient};
use mailsync_core::{ChangeKind, ChangeMessage, EmailRecord, Mailbox, MailboxStatus};
use mailsync_db::{Database, DbError, EmailRepository};

/// Outcome of one pagination loop: records applied plus the new resume
/// cursor, if the provider issued one.
struct PaginationOutcome {
    applied: usize,
    cursor: Option<String>,
}

/// Engine for full and incremental mailbox synchronization.
#[derive(Clone)]
pub struct DeltaSyncEngine {
    db: Database,
    provider: Arc<dyn ProviderClient>,
    locks: Arc<MailboxLocks>,
    settings: SyncSettings,
}

impl DeltaSyncEngine {
    /// Creates a new sync engine over the given store and provider.
    pub fn new(db: Database, provider: Arc<dyn ProviderClient>, settings: SyncSettings) -> Self {
        DeltaSyncEngine {
            db,
            provider,
            locks: Arc::new(MailboxLocks::new()),
            settings,
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Performs a full sync bounded by the look-back window, then stores
    /// the resume cursor and promotes the mailbox to ACTIVE.
    ///
    /// On failure the mailbox is demoted to ERROR with the message and
    /// failure counter recorded, and the error propagates. The cursor is
    /// never partially updated.
    pub async fn initial_sync(&self, address: &str) -> SyncResult<()> {
        let _guard = self.locks.acquire(address).await;
        self.initial_sync_locked(address).await
    }

    /// Performs an incremental sync from the stored cursor.
    ///
    /// A mailbox without a cursor degrades to a full sync instead of
    /// failing. Failures below the consecutive-failure budget leave the
    /// status untouched; at the budget the mailbox is demoted to ERROR.
    pub async fn delta_sync(&self, address: &str) -> SyncResult<()> {
        let _guard = self.locks.acquire(address).await;
        self.delta_sync_locked(address).await
    }

    // =========================================================================
    // Locked Implementations
    // =========================================================================

    async fn initial_sync_locked(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.load(address).await?;

        info!(address = %address, "Starting initial sync");

        mailbox.status = MailboxStatus::Initializing;
        let mut mailbox = self.db.mailboxes().update(&mailbox).await?;

        match self.paginate_initial(&mailbox).await {
            Ok(outcome) => {
                mailbox.delta_cursor = outcome.cursor;
                mailbox.initial_sync_done = true;
                mailbox.status = MailboxStatus::Active;
                mailbox.last_synced_at = Some(Utc::now());
                mailbox.last_error = None;
                mailbox.consecutive_failures = 0;
                self.db.mailboxes().update(&mailbox).await?;

                info!(
                    address = %address,
                    applied = outcome.applied,
                    "Initial sync completed"
                );
                Ok(())
            }
            Err(e) => {
                error!(address = %address, error = %e, "Initial sync failed");

                mailbox.status = MailboxStatus::Error;
                mailbox.last_error = Some(e.to_string());
                mailbox.consecutive_failures += 1;
                self.db.mailboxes().update(&mailbox).await?;

                Err(e)
            }
        }
    }

    async fn delta_sync_locked(&self, address: &str) -> SyncResult<()> {
        let mut mailbox = self.load(address).await?;

        let Some(cursor) = mailbox.delta_cursor.clone() else {
            warn!(
                address = %address,
                "No delta cursor found, performing initial sync instead"
            );
            return self.initial_sync_locked(address).await;
        };

        debug!(address = %address, "Starting delta sync");

        match self.paginate_delta(&mailbox, &cursor).await {
            Ok(outcome) => {
                if let Some(cursor) = outcome.cursor {
                    mailbox.delta_cursor = Some(cursor);
                }
                mailbox.last_synced_at = Some(Utc::now());
                mailbox.last_error = None;
                mailbox.consecutive_failures = 0;
                self.db.mailboxes().update(&mailbox).await?;

                info!(
                    address = %address,
                    applied = outcome.applied,
                    "Delta sync completed"
                );
                Ok(())
            }
            Err(e) => {
                error!(address = %address, error = %e, "Delta sync failed");

                mailbox.last_error = Some(e.to_string());
                mailbox.consecutive_failures += 1;
                if mailbox.consecutive_failures >= self.settings.max_consecutive_failures {
                    warn!(
                        address = %address,
                        failures = mailbox.consecutive_failures,
                        "Consecutive failure budget exhausted, marking mailbox ERROR"
                    );
                    mailbox.status = MailboxStatus::Error;
                }
                self.db.mailboxes().update(&mailbox).await?;

                Err(e)
            }
        }
    }

    async fn load(&self, address: &str) -> SyncResult<Mailbox> {
        self.db
            .mailboxes()
            .find_by_address(address)
            .await?
            .ok_or_else(|| SyncError::MailboxNotFound(address.to_string()))
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    async fn paginate_initial(&self, mailbox: &Mailbox) -> SyncResult<PaginationOutcome> {
        let first = self
            .provider
            .fetch_initial_page(
                &mailbox.address,
                self.settings.look_back_days,
                self.settings.page_size,
            )
            .await?;

        self.drain_pages(mailbox, first).await
    }

    async fn paginate_delta(
        &self,
        mailbox: &Mailbox,
        cursor: &str,
    ) -> SyncResult<PaginationOutcome> {
        let first = self.provider.fetch_changes_since(cursor).await?;
        self.drain_pages(mailbox, first).await
    }

    /// Applies pages in provider order until a terminal continuation.
    async fn drain_pages(
        &self,
        mailbox: &Mailbox,
        first: crate::provider::ChangePage,
    ) -> SyncResult<PaginationOutcome> {
        let mut page = first;
        let mut applied = 0;

        loop {
            applied += self.apply_messages(mailbox, &page.messages).await;

            match page.continuation {
                Continuation::NextPage(token) => {
                    debug!(address = %mailbox.address, "Fetching next page");
                    page = self.provider.fetch_next_page(&token).await?;
                }
                Continuation::ResumeCursor(cursor) => {
                    return Ok(PaginationOutcome {
                        applied,
                        cursor: Some(cursor),
                    });
                }
                Continuation::End => {
                    return Ok(PaginationOutcome {
                        applied,
                        cursor: None,
                    });
                }
            }
        }
    }

    // =========================================================================
    // Upsert Application
    // =========================================================================

    /// Applies one page of change records, absorbing per-record failures.
    /// Returns how many records were applied.
    async fn apply_messages(&self, mailbox: &Mailbox, messages: &[ChangeMessage]) -> usize {
        let emails = self.db.emails();
        let mut applied = 0;

        for message in messages {
            let Some(message_id) = message.id.as_deref() else {
                warn!(address = %mailbox.address, "Skipping change record without message id");
                continue;
            };

            match self.apply_message(mailbox, message_id, message, &emails).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    error!(
                        address = %mailbox.address,
                        message_id = %message_id,
                        error = %e,
                        "Failed to apply change record, continuing batch"
                    );
                }
            }
        }

        applied
    }

    /// Upsert rule: known message id overwrites in place (UPDATED),
    /// unknown inserts (CREATED), removal flags the row (DELETED).
    async fn apply_message(
        &self,
        mailbox: &Mailbox,
        message_id: &str,
        message: &ChangeMessage,
        emails: &EmailRepository,
    ) -> SyncResult<()> {
        if message.removed {
            return match emails.mark_deleted(message_id).await {
                // Removal of a message we never mirrored is a no-op.
                Ok(()) | Err(DbError::NotFound { .. }) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(mut existing) = emails.find_by_message_id(message_id).await? {
            overwrite_fields(&mut existing, message);
            existing.change_kind = ChangeKind::Updated;
            existing.is_deleted = false;
            emails.update(&existing).await?;
            debug!(message_id = %message_id, "Updated existing email");
        } else {
            let mut record = empty_record(mailbox, message_id);
            overwrite_fields(&mut record, message);
            record.change_kind = ChangeKind::Created;
            emails.insert(&record).await?;
            debug!(message_id = %message_id, "Created new email");
        }

        Ok(())
    }
}

/// Blank email row for a first sighting.
fn empty_record(mailbox: &Mailbox, message_id: &str) -> EmailRecord {
    let now = Utc::now();
    EmailRecord {
        id: Uuid::new_v4().to_string(),
        message_id: message_id.to_string(),
        mailbox_id: mailbox.id.clone(),
        subject: None,
        sender_email: None,
        sender_name: None,
        recipients: None,
        received_at: None,
        has_attachments: false,
        is_read: false,
        importance: None,
        body_preview: None,
        body_content: None,
        body_content_type: None,
        categories: None,
        conversation_id: None,
        change_kind: ChangeKind::Created,
        is_deleted: false,
        raw_json: None,
        created_at: now,
        updated_at: now,
    }
}

/// Copies the mutable fields of a change record onto an email row.
fn overwrite_fields(email: &mut EmailRecord, message: &ChangeMessage) {
    email.subject = message.subject.clone();
    email.sender_email = message.sender_email.clone();
    email.sender_name = message.sender_name.clone();
    email.recipients = if message.recipients.is_empty() {
        None
    } else {
        Some(message.recipients.join(", "))
    };
    email.received_at = message.received_at;
    email.has_attachments = message.has_attachments;
    email.is_read = message.is_read;
    email.importance = message.importance.clone();
    email.body_preview = message.body_preview.clone();
    email.body_content = message.body_content.clone();
    email.body_content_type = message.body_content_type.clone();
    email.categories = if message.categories.is_empty() {
        None
    } else {
        Some(message.categories.join(", "))
    };
    email.conversation_id = message.conversation_id.clone();
    email.raw_json = match &message.raw {
        Some(raw) => Some(raw.to_string()),
        None => serde_json::to_string(message).ok(),
    };
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChangePage, ProviderError};
    use crate::testing::{message, FakeProvider};
    use mailsync_db::DbConfig;

    async fn setup() -> (Database, Arc<FakeProvider>, DeltaSyncEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.mailboxes().get_or_create("a@x.com").await.unwrap();
        let fake = Arc::new(FakeProvider::new());
        let engine = DeltaSyncEngine::new(db.clone(), fake.clone(), SyncSettings::default());
        (db, fake, engine)
    }

    #[tokio::test]
    async fn initial_sync_pages_through_and_stores_cursor() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::partial(
            vec![message("msg-1"), message("msg-2")],
            "page-2",
        )));
        fake.queue_next(Ok(ChangePage::terminal(vec![message("msg-3")], "cursor-1")));

        engine.initial_sync("a@x.com").await.unwrap();

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.status, MailboxStatus::Active);
        assert!(mailbox.initial_sync_done);
        assert_eq!(mailbox.delta_cursor.as_deref(), Some("cursor-1"));
        assert!(mailbox.last_synced_at.is_some());
        assert_eq!(mailbox.consecutive_failures, 0);
        assert_eq!(db.emails().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn initial_sync_failure_marks_error_and_keeps_cursor_empty() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::partial(vec![message("msg-1")], "page-2")));
        fake.queue_next(Err(ProviderError::Transport("mid-pagination".into())));

        let err = engine.initial_sync("a@x.com").await.unwrap_err();
        assert!(matches!(err, SyncError::Provider(_)));

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.status, MailboxStatus::Error);
        assert!(!mailbox.initial_sync_done);
        assert!(mailbox.delta_cursor.is_none());
        assert_eq!(mailbox.consecutive_failures, 1);
        assert!(mailbox.last_error.unwrap().contains("mid-pagination"));
    }

    #[tokio::test]
    async fn delta_sync_without_cursor_degrades_to_initial_sync() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![message("msg-1")], "cursor-1")));

        engine.delta_sync("a@x.com").await.unwrap();

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.status, MailboxStatus::Active);
        assert!(mailbox.initial_sync_done);
        assert_eq!(mailbox.delta_cursor.as_deref(), Some("cursor-1"));
        assert_eq!(fake.calls_for("fetch_initial_page"), 1);
        assert_eq!(fake.calls_for("fetch_changes_since"), 0);
    }

    #[tokio::test]
    async fn delta_sync_advances_cursor_and_applies_updates() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![message("msg-1")], "cursor-1")));
        engine.initial_sync("a@x.com").await.unwrap();

        let mut changed = message("msg-1");
        changed.subject = Some("edited".into());
        fake.queue_delta(Ok(ChangePage::terminal(
            vec![changed, message("msg-2")],
            "cursor-2",
        )));

        engine.delta_sync("a@x.com").await.unwrap();

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.delta_cursor.as_deref(), Some("cursor-2"));

        // Idempotent upsert: msg-1 stays a single row, reclassified.
        assert_eq!(db.emails().count().await.unwrap(), 2);
        let email = db
            .emails()
            .find_by_message_id("msg-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(email.change_kind, ChangeKind::Updated);
        assert_eq!(email.subject.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn delta_sync_with_no_new_cursor_leaves_stored_cursor_unchanged() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![], "cursor-1")));
        engine.initial_sync("a@x.com").await.unwrap();

        fake.queue_delta(Ok(ChangePage::end(vec![message("msg-1")])));
        engine.delta_sync("a@x.com").await.unwrap();

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.delta_cursor.as_deref(), Some("cursor-1"));
        assert_eq!(db.emails().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_delta_failures_demote_only_at_the_budget() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![], "cursor-1")));
        engine.initial_sync("a@x.com").await.unwrap();

        for round in 1..=5 {
            fake.queue_delta(Err(ProviderError::Transport(format!("outage {round}"))));
            let _ = engine.delta_sync("a@x.com").await.unwrap_err();

            let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
            assert_eq!(mailbox.consecutive_failures, round);
            if round < 5 {
                // Sub-budget failures leave an otherwise healthy mailbox alone.
                assert_eq!(mailbox.status, MailboxStatus::Active, "round {round}");
            } else {
                assert_eq!(mailbox.status, MailboxStatus::Error);
            }
        }

        // Cursor never regressed through the failures.
        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.delta_cursor.as_deref(), Some("cursor-1"));
    }

    #[tokio::test]
    async fn success_resets_the_failure_counter() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![], "cursor-1")));
        engine.initial_sync("a@x.com").await.unwrap();

        for _ in 0..3 {
            fake.queue_delta(Err(ProviderError::Transport("outage".into())));
            let _ = engine.delta_sync("a@x.com").await.unwrap_err();
        }

        fake.queue_delta(Ok(ChangePage::terminal(vec![], "cursor-2")));
        engine.delta_sync("a@x.com").await.unwrap();

        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.consecutive_failures, 0);
        assert!(mailbox.last_error.is_none());
        assert_eq!(mailbox.status, MailboxStatus::Active);
    }

    #[tokio::test]
    async fn records_without_message_id_are_skipped() {
        let (db, fake, engine) = setup().await;

        let mut anonymous = message("ignored");
        anonymous.id = None;
        fake.queue_initial(Ok(ChangePage::terminal(
            vec![anonymous, message("msg-1")],
            "cursor-1",
        )));

        engine.initial_sync("a@x.com").await.unwrap();

        assert_eq!(db.emails().count().await.unwrap(), 1);
        let mailbox = db.mailboxes().get_by_address("a@x.com").await.unwrap();
        assert_eq!(mailbox.status, MailboxStatus::Active);
    }

    #[tokio::test]
    async fn removal_records_flag_rows_instead_of_deleting() {
        let (db, fake, engine) = setup().await;

        fake.queue_initial(Ok(ChangePage::terminal(vec![message("msg-1")], "cursor-1")));
        engine.initial_sync("a@x.com").await.unwrap();

        fake.queue_delta(Ok(ChangePage::terminal(
            vec![
                ChangeMessage::removed("msg-1"),
                // Removal of a never-seen message must not fail the batch.
                ChangeMessage::removed("msg-ghost"),
            ],
            "cursor-2",
        )));
        engine.delta_sync("a@x.com").await.unwrap();

        let email = db
            .emails()
            .find_by_message_id("msg-1")
            .await
            .unwrap()
            .unwrap();
        assert!(email.is_deleted);
        assert_eq!(email.change_kind, ChangeKind::Deleted);
        assert_eq!(db.emails().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_mailbox_is_reported_not_created() {
        let (_db, _fake, engine) = setup().await;

        let err = engine.delta_sync("ghost@x.com").await.unwrap_err();
        assert!(matches!(err, SyncError::MailboxNotFound(_)));
    }
}
