//! # mailsync-core: Pure Domain Types for Mailsync
//!
//! This crate is the leaf of the workspace. It contains the domain model
//! shared by every other crate, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mailsync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  apps/sync-api (Axum HTTP)                      │   │
//! │  │     webhook surface ── admin surface ── periodic sweeps         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          mailsync-engine / mailsync-db / mailsync-graph         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mailsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   Mailbox ── MailboxStatus ── EmailRecord ── ChangeKind         │   │
//! │  │   WebhookNotification ── ChangeMessage                          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE TYPES                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Mailbox, EmailRecord, WebhookNotification, ...)
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ParseStatusError;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Consecutive delta-sync failures tolerated before a mailbox is demoted
/// to [`MailboxStatus::Error`]. Failures below this leave the status
/// untouched so a transient provider hiccup does not flip a healthy
/// mailbox.
pub const MAX_DELTA_SYNC_FAILURES: i64 = 5;

/// Processing attempts allowed per webhook notification before it is
/// abandoned. Abandoned notifications stay in the ledger for audit and
/// are never retried again.
pub const MAX_NOTIFICATION_RETRIES: i64 = 5;
