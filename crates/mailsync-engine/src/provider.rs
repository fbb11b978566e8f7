//! # Provider Capability
//!
//! The opaque client capability consumed by the engine: fetch change sets,
//! manage push subscriptions. Transport, authentication and timeouts live
//! behind this trait (see the `mailsync-graph` adapter); the engine only
//! sees pages of [`ChangeMessage`]s and continuation tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use mailsync_core::ChangeMessage;

// =============================================================================
// Provider Errors
// =============================================================================

/// Failures surfaced by the provider capability.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient transport failure (network, 5xx, throttling). Retried
    /// with backoff by the gateway.
    #[error("Provider transport error: {0}")]
    Transport(String),

    /// Authentication/authorization failure. Not retried.
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    /// The referenced provider resource does not exist. Not retried and
    /// not counted as a circuit-breaker failure.
    #[error("Provider resource not found: {0}")]
    NotFound(String),

    /// The provider answered with something the adapter could not
    /// interpret.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    /// The gateway's circuit breaker is open; the call was not attempted.
    #[error("Provider circuit breaker is open")]
    CircuitOpen,
}

impl ProviderError {
    /// Whether the gateway should retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }

    /// Whether this outcome counts against the circuit breaker's failure
    /// ratio. Not-found reached the provider and got a definitive answer;
    /// it is not a provider health signal.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, ProviderError::NotFound(_) | ProviderError::CircuitOpen)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// A live push subscription as reported by the provider.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    /// Provider-assigned subscription id.
    pub id: String,
    /// Expiry of the registration; renewals extend it.
    pub expires_at: DateTime<Utc>,
}

/// What follows the records of one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// More pages follow; fetch with [`ProviderClient::fetch_next_page`].
    NextPage(String),
    /// Terminal page. The cursor represents "all changes up to here" and
    /// must be stored for the next incremental sync.
    ResumeCursor(String),
    /// Terminal page without a new cursor. The stored cursor (if any)
    /// stays as it is.
    End,
}

/// One page of change records plus its continuation.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub messages: Vec<ChangeMessage>,
    pub continuation: Continuation,
}

impl ChangePage {
    /// A terminal page carrying records and a resume cursor.
    pub fn terminal(messages: Vec<ChangeMessage>, cursor: impl Into<String>) -> Self {
        ChangePage {
            messages,
            continuation: Continuation::ResumeCursor(cursor.into()),
        }
    }

    /// An intermediate page pointing at the next one.
    pub fn partial(messages: Vec<ChangeMessage>, next: impl Into<String>) -> Self {
        ChangePage {
            messages,
            continuation: Continuation::NextPage(next.into()),
        }
    }

    /// A terminal page without a new cursor.
    pub fn end(messages: Vec<ChangeMessage>) -> Self {
        ChangePage {
            messages,
            continuation: Continuation::End,
        }
    }
}

// =============================================================================
// Provider Client Trait
// =============================================================================

/// The provider capability consumed by the engine.
///
/// Implementations must be stateless from the engine's point of view:
/// every method is an independent remote operation. The engine always
/// talks to this trait through a [`crate::gateway::ProviderGateway`].
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Registers a push subscription for the mailbox. Expiration window,
    /// notification URL and client-state secret are adapter concerns.
    async fn create_subscription(
        &self,
        address: &str,
    ) -> Result<ProviderSubscription, ProviderError>;

    /// Extends an existing subscription, returning the new expiry.
    async fn renew_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<DateTime<Utc>, ProviderError>;

    /// Deletes a subscription. A provider-side not-found is a success:
    /// the goal state (subscription gone) already holds.
    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ProviderError>;

    /// Fetches the first page of the full change set, bounded by the
    /// look-back window.
    async fn fetch_initial_page(
        &self,
        address: &str,
        look_back_days: i64,
        page_size: u32,
    ) -> Result<ChangePage, ProviderError>;

    /// Fetches the first page of changes after the given resume cursor.
    async fn fetch_changes_since(&self, cursor: &str) -> Result<ChangePage, ProviderError>;

    /// Fetches a continuation page (from [`Continuation::NextPage`]).
    async fn fetch_next_page(&self, page_token: &str) -> Result<ChangePage, ProviderError>;
}
