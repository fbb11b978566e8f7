//! # mailsync-engine: Sync Engine for Mailsync
//!
//! This crate provides the reconciliation layer between the email provider
//! (an eventually-consistent event source pushing webhook notifications)
//! and the local durable mirror store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                MailboxOrchestrator (lifecycle driver)            │  │
//! │  │   initialize / reinitialize: full sync + subscription + ACTIVE   │  │
//! │  └───────────┬─────────────────────────────┬────────────────────────┘  │
//! │              ▼                             ▼                            │
//! │  ┌────────────────────┐        ┌──────────────────────┐                │
//! │  │  DeltaSyncEngine   │        │ SubscriptionManager  │                │
//! │  │                    │        │                      │                │
//! │  │ initial/delta sync │        │ create/renew/delete  │                │
//! │  │ cursor handling    │        │ expiry sweep         │                │
//! │  │ upsert application │        │                      │                │
//! │  └─────────┬──────────┘        └──────────┬───────────┘                │
//! │            │                              │                            │
//! │            ▼                              ▼                            │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │           ProviderGateway (retry + circuit breaker)              │  │
//! │  │        wraps the opaque ProviderClient capability                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │   NotificationProcessor: webhook ledger → delta sync, retries    │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`provider`] - The consumed provider capability (trait + wire types)
//! - [`gateway`] - Retry/circuit-breaker decorator around the capability
//! - [`sync`] - Full and incremental synchronization
//! - [`subscription`] - Push subscription lifecycle
//! - [`webhook`] - Inbound notification ledger and retry processing
//! - [`orchestrator`] - Mailbox lifecycle state machine
//! - [`scheduler`] - Timer-driven sweeps (renewal, retry, cleanup)
//! - [`locks`] - Per-mailbox mutual exclusion
//! - [`config`] - Engine settings
//! - [`error`] - Engine error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod subscription;
pub mod sync;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{SubscriptionSettings, SyncSettings, WebhookSettings};
pub use error::{SyncError, SyncResult};
pub use gateway::{CircuitBreakerSettings, CircuitState, ProviderGateway, RetrySettings};
pub use orchestrator::MailboxOrchestrator;
pub use provider::{ChangePage, Continuation, ProviderClient, ProviderError, ProviderSubscription};
pub use scheduler::{SweepHandle, SweepScheduler, SweepSettings};
pub use subscription::SubscriptionManager;
pub use sync::DeltaSyncEngine;
pub use webhook::NotificationProcessor;
