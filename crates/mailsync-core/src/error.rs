//! # Domain Error Types
//!
//! Errors for conversions inside the pure domain model. Database and
//! provider failures have their own error types in mailsync-db and
//! mailsync-engine.

use thiserror::Error;

/// Returned when a persisted status string does not name a known enum
/// variant.
///
/// ## When This Occurs
/// - A database row was written by a newer (or corrupted) schema
/// - A hand-edited row contains a typo
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseStatusError {
    /// Which enum failed to parse ("mailbox status", "change kind").
    pub kind: &'static str,
    /// The offending string.
    pub value: String,
}

impl ParseStatusError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        ParseStatusError {
            kind,
            value: value.into(),
        }
    }
}
