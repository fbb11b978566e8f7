//! # Engine Error Types
//!
//! Error taxonomy for sync operations.
//!
//! ## Propagation Policy
//! - Per-record failures inside a sync batch are absorbed and logged,
//!   never surfaced here
//! - Per-mailbox failures during a sweep are absorbed and logged
//! - Everything else propagates to the caller, which records it on the
//!   mailbox or notification row

use thiserror::Error;

use crate::provider::ProviderError;
use mailsync_db::DbError;

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine error type covering sync, subscription and webhook failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The referenced mailbox does not exist. Caller-visible; never
    /// retried automatically.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    /// The mailbox was explicitly disabled; only `reinitialize` may
    /// bring it back.
    #[error("Mailbox is disabled: {0}")]
    MailboxDisabled(String),

    /// Webhook client-state token did not match the configured secret.
    /// Rejected before any persistence.
    #[error("Webhook validation failed: {0}")]
    Validation(String),

    /// Provider call failed (after retry/circuit handling).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Store operation failed, including optimistic-lock conflicts.
    #[error(transparent)]
    Db(#[from] DbError),
}
