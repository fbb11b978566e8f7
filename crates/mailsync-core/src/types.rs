//! # Domain Types
//!
//! Core domain types used throughout Mailsync.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Mailbox      │   │   EmailRecord   │   │ WebhookNotification │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  address        │   │  message_id     │   │  subscription_id    │   │
//! │  │  delta_cursor   │   │  mailbox_id(FK) │   │  processed          │   │
//! │  │  status         │   │  change_kind    │   │  retry_count        │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ChangeMessage: one change record as returned by the provider,         │
//! │  before it is folded into an EmailRecord by the sync engine.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every persisted entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business key: (address, message_id) - provider-assigned, unique

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseStatusError;

// =============================================================================
// Mailbox Status
// =============================================================================

/// Lifecycle state of a monitored mailbox.
///
/// ## Transitions
/// ```text
/// NOT_INITIALIZED ──► INITIALIZING ──► ACTIVE
///                          │             │
///                          ▼             ├──► ERROR (recoverable via sync)
///                        ERROR           ├──► SUBSCRIPTION_EXPIRED
///                                        └──► DISABLED (until reinitialize)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MailboxStatus {
    /// Mailbox is known but has never completed an initial sync.
    NotInitialized,
    /// Initial sync in progress.
    Initializing,
    /// Initial sync done, subscription in place, delta syncs running.
    Active,
    /// Last operation failed hard; recoverable by a successful sync.
    Error,
    /// Subscription renewal and recreation both failed.
    SubscriptionExpired,
    /// Soft-off: subscription torn down, mailbox kept for audit.
    Disabled,
}

impl MailboxStatus {
    /// Stable string form, matching the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxStatus::NotInitialized => "NOT_INITIALIZED",
            MailboxStatus::Initializing => "INITIALIZING",
            MailboxStatus::Active => "ACTIVE",
            MailboxStatus::Error => "ERROR",
            MailboxStatus::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            MailboxStatus::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for MailboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailboxStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_INITIALIZED" => Ok(MailboxStatus::NotInitialized),
            "INITIALIZING" => Ok(MailboxStatus::Initializing),
            "ACTIVE" => Ok(MailboxStatus::Active),
            "ERROR" => Ok(MailboxStatus::Error),
            "SUBSCRIPTION_EXPIRED" => Ok(MailboxStatus::SubscriptionExpired),
            "DISABLED" => Ok(MailboxStatus::Disabled),
            other => Err(ParseStatusError::new("mailbox status", other)),
        }
    }
}

// =============================================================================
// Mailbox
// =============================================================================

/// One monitored mailbox and its sync/subscription state.
///
/// ## Invariants
/// - `address` is unique across the store
/// - `status == Active` implies `initial_sync_done`
/// - `subscription_id.is_some()` implies `subscription_expires_at.is_some()`
/// - rows are never hard-deleted; `Disabled` is the off state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Mailbox {
    /// Storage key (UUID v4).
    pub id: String,

    /// Email address; the business key.
    pub address: String,

    /// Opaque provider continuation token ("delta link"). `None` until the
    /// first successful initial sync.
    pub delta_cursor: Option<String>,

    /// Provider push-subscription id, if one is live.
    pub subscription_id: Option<String>,

    /// Expiry of the live subscription.
    pub subscription_expires_at: Option<DateTime<Utc>>,

    /// Lifecycle state.
    pub status: MailboxStatus,

    /// Whether an initial sync has completed at least once.
    pub initial_sync_done: bool,

    /// Timestamp of the last successful sync (initial or delta).
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,

    /// Consecutive sync failures since the last success.
    pub consecutive_failures: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic-lock counter; bumped on every update. An update carrying
    /// a stale version must fail with a conflict instead of overwriting.
    pub version: i64,
}

impl Mailbox {
    /// Creates a fresh, never-synced mailbox for the given address.
    pub fn new(address: impl Into<String>) -> Self {
        let now = Utc::now();
        Mailbox {
            id: Uuid::new_v4().to_string(),
            address: address.into(),
            delta_cursor: None,
            subscription_id: None,
            subscription_expires_at: None,
            status: MailboxStatus::NotInitialized,
            initial_sync_done: false,
            last_synced_at: None,
            last_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// True when the mailbox is fully initialized and healthy.
    pub fn is_active(&self) -> bool {
        self.status == MailboxStatus::Active && self.initial_sync_done
    }

    /// Clears all sync and subscription state back to a pristine
    /// `NotInitialized` mailbox, keeping identity and timestamps.
    pub fn reset(&mut self) {
        self.delta_cursor = None;
        self.subscription_id = None;
        self.subscription_expires_at = None;
        self.status = MailboxStatus::NotInitialized;
        self.initial_sync_done = false;
        self.last_error = None;
        self.consecutive_failures = 0;
    }
}

// =============================================================================
// Change Kind
// =============================================================================

/// Classification of the last change applied to an [`EmailRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// First sighting of this message id.
    Created,
    /// Subsequent sighting; mutable fields overwritten in place.
    Updated,
    /// Provider reported the message removed; row kept, flagged deleted.
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ChangeKind::Created),
            "UPDATED" => Ok(ChangeKind::Updated),
            "DELETED" => Ok(ChangeKind::Deleted),
            other => Err(ParseStatusError::new("change kind", other)),
        }
    }
}

// =============================================================================
// Email Record
// =============================================================================

/// Local mirror of one provider message.
///
/// Keyed by the provider-assigned `message_id`, which is globally unique
/// across all mailboxes. Upsert by message id is the only mutation path;
/// deletion events flag the row instead of removing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EmailRecord {
    /// Storage key (UUID v4).
    pub id: String,

    /// Provider-assigned message id; globally unique.
    pub message_id: String,

    /// Owning mailbox (storage key).
    pub mailbox_id: String,

    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,

    /// Recipient addresses, comma-joined.
    pub recipients: Option<String>,

    pub received_at: Option<DateTime<Utc>>,
    pub has_attachments: bool,
    pub is_read: bool,
    pub importance: Option<String>,
    pub body_preview: Option<String>,
    pub body_content: Option<String>,
    pub body_content_type: Option<String>,

    /// Categories, comma-joined.
    pub categories: Option<String>,

    pub conversation_id: Option<String>,

    /// Classification of the last applied change.
    pub change_kind: ChangeKind,

    /// Logical delete flag; set on provider removal events.
    pub is_deleted: bool,

    /// Raw provider payload snapshot (JSON).
    pub raw_json: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Webhook Notification
// =============================================================================

/// Append-only ledger entry for one inbound push notification.
///
/// Retained after successful processing for audit; only the cleanup sweep
/// removes rows, and only processed ones past the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WebhookNotification {
    /// Storage key (UUID v4).
    pub id: String,

    /// Subscription the provider attributed the change to. Resolved to a
    /// mailbox at processing time; a weak reference, not a foreign key.
    pub subscription_id: String,

    /// Provider change type ("created", "updated", "deleted").
    pub change_type: Option<String>,

    /// Provider resource path of the changed entity.
    pub resource: Option<String>,

    /// Shared client-state token echoed by the provider.
    pub client_state: Option<String>,

    /// Terminal success flag.
    pub processed: bool,

    /// Message of the last processing failure.
    pub processing_error: Option<String>,

    /// Processing attempts so far; bounded by
    /// [`crate::MAX_NOTIFICATION_RETRIES`].
    pub retry_count: i64,

    /// Raw webhook payload as received.
    pub raw_payload: Option<String>,

    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookNotification {
    /// Creates an unprocessed ledger entry for a freshly accepted
    /// notification.
    pub fn new(
        subscription_id: impl Into<String>,
        change_type: Option<String>,
        resource: Option<String>,
        client_state: Option<String>,
        raw_payload: Option<String>,
    ) -> Self {
        WebhookNotification {
            id: Uuid::new_v4().to_string(),
            subscription_id: subscription_id.into(),
            change_type,
            resource,
            client_state,
            processed: false,
            processing_error: None,
            retry_count: 0,
            raw_payload,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

// =============================================================================
// Change Message (provider side)
// =============================================================================

/// One change record as returned by the provider, before the sync engine
/// folds it into an [`EmailRecord`].
///
/// `id` is optional on purpose: the provider occasionally emits records
/// without one, and those are skipped (logged, not an error).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Provider message id. Records without one are skipped by the engine.
    pub id: Option<String>,

    /// Set when the provider reports the message as removed.
    pub removed: bool,

    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub recipients: Vec<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub has_attachments: bool,
    pub is_read: bool,
    pub importance: Option<String>,
    pub body_preview: Option<String>,
    pub body_content: Option<String>,
    pub body_content_type: Option<String>,
    pub categories: Vec<String>,
    pub conversation_id: Option<String>,

    /// Raw provider payload for the snapshot column.
    pub raw: Option<serde_json::Value>,
}

impl ChangeMessage {
    /// Shorthand for a removal record, as emitted by delta queries.
    pub fn removed(id: impl Into<String>) -> Self {
        ChangeMessage {
            id: Some(id.into()),
            removed: true,
            ..ChangeMessage::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
