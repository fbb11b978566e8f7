//! # mailsync-graph: Microsoft Graph Provider Adapter
//!
//! Implements [`mailsync_engine::ProviderClient`] against the Microsoft
//! Graph REST surface:
//!
//! - client-credentials OAuth2 with a cached access token
//! - `/users/{address}/messages/delta` queries with `@odata.nextLink` /
//!   `@odata.deltaLink` continuations and `@removed` markers
//! - `/subscriptions` CRUD (a 404 on delete counts as success)
//!
//! The engine never sees any of this: it talks to the `ProviderClient`
//! trait, usually through a `ProviderGateway`.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod model;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::GraphClient;
pub use config::GraphConfig;
