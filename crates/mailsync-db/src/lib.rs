//! # mailsync-db: Database Layer for Mailsync
//!
//! This crate provides database access for the mailbox mirror store.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (mailbox, email, notification)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mailsync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/mailsync.db")).await?;
//!
//! let mailbox = db.mailboxes().get_or_create("a@x.com").await?;
//! let count = db.emails().count_by_mailbox(&mailbox.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::email::EmailRepository;
pub use repository::mailbox::MailboxRepository;
pub use repository::notification::NotificationRepository;
