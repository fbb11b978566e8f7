//! # Repository Module
//!
//! Database repository implementations for the mirror store.
//!
//! Each repository wraps the shared pool behind a small typed API so SQL
//! stays in one place per entity:
//!
//! - [`mailbox::MailboxRepository`] - mailbox rows, optimistic versioning,
//!   sweep candidate queries
//! - [`email::EmailRepository`] - message mirror, upsert by message id
//! - [`notification::NotificationRepository`] - webhook ledger, retry queue

pub mod email;
pub mod mailbox;
pub mod notification;
