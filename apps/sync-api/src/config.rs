//! Application configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults; credentials and webhook settings are required and fail fast
//! when absent.

use std::env;
use std::time::Duration;

use mailsync_engine::{
    CircuitBreakerSettings, RetrySettings, SubscriptionSettings, SweepSettings, SyncSettings,
    WebhookSettings,
};
use mailsync_graph::GraphConfig;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub http_port: u16,

    /// Path to the SQLite mirror database.
    pub database_path: String,

    /// Mailbox addresses initialized at startup.
    pub mailboxes: Vec<String>,

    /// Azure AD tenant id.
    pub graph_tenant_id: String,

    /// Application (client) id.
    pub graph_client_id: String,

    /// Client secret.
    pub graph_client_secret: String,

    /// Graph REST base URL override (sovereign clouds, tests).
    pub graph_api_base_url: Option<String>,

    /// Public URL the provider POSTs notifications to.
    pub webhook_notification_url: String,

    /// Shared client-state secret echoed in every notification.
    pub webhook_client_state: String,

    /// Subscription lifetime requested from the provider, in hours.
    pub subscription_expiration_hours: i64,

    /// Renewal sweep lead time, in hours.
    pub subscription_renewal_lead_hours: i64,

    /// Initial sync look-back window, in days.
    pub sync_look_back_days: i64,

    /// Delta query page size.
    pub sync_page_size: u32,

    /// Provider retry attempts per call.
    pub retry_max_attempts: u32,

    /// Initial provider retry delay, in milliseconds.
    pub retry_initial_interval_ms: u64,

    /// Provider retry backoff multiplier.
    pub retry_multiplier: f64,

    /// Provider retry delay cap, in milliseconds.
    pub retry_max_interval_ms: u64,

    /// Circuit breaker cooldown while open, in seconds.
    pub circuit_open_cooldown_secs: u64,

    /// Subscription sweep cadence, in seconds.
    pub subscription_sweep_interval_secs: u64,

    /// Webhook retry sweep cadence, in seconds.
    pub webhook_retry_interval_secs: u64,

    /// Webhook cleanup cadence, in seconds.
    pub webhook_cleanup_interval_secs: u64,

    /// Processed notification retention, in days.
    pub webhook_retention_days: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = AppConfig {
            http_port: parsed_var("HTTP_PORT", 8080)?,

            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "mailsync.db".to_string()),

            mailboxes: parse_mailboxes(&env::var("MAILBOXES").unwrap_or_default()),

            graph_tenant_id: required_var("GRAPH_TENANT_ID")?,
            graph_client_id: required_var("GRAPH_CLIENT_ID")?,
            graph_client_secret: required_var("GRAPH_CLIENT_SECRET")?,
            graph_api_base_url: env::var("GRAPH_API_BASE_URL").ok(),

            webhook_notification_url: required_var("WEBHOOK_NOTIFICATION_URL")?,
            webhook_client_state: required_var("WEBHOOK_CLIENT_STATE")?,

            subscription_expiration_hours: parsed_var("SUBSCRIPTION_EXPIRATION_HOURS", 72)?,
            subscription_renewal_lead_hours: parsed_var("SUBSCRIPTION_RENEWAL_LEAD_HOURS", 12)?,

            sync_look_back_days: parsed_var("SYNC_LOOK_BACK_DAYS", 7)?,
            sync_page_size: parsed_var("SYNC_PAGE_SIZE", 50)?,

            retry_max_attempts: parsed_var("RETRY_MAX_ATTEMPTS", 3)?,
            retry_initial_interval_ms: parsed_var("RETRY_INITIAL_INTERVAL_MS", 1000)?,
            retry_multiplier: parsed_var("RETRY_MULTIPLIER", 2.0)?,
            retry_max_interval_ms: parsed_var("RETRY_MAX_INTERVAL_MS", 10_000)?,

            circuit_open_cooldown_secs: parsed_var("CIRCUIT_OPEN_COOLDOWN_SECS", 30)?,

            subscription_sweep_interval_secs: parsed_var("SUBSCRIPTION_SWEEP_INTERVAL_SECS", 3600)?,
            webhook_retry_interval_secs: parsed_var("WEBHOOK_RETRY_INTERVAL_SECS", 300)?,
            webhook_cleanup_interval_secs: parsed_var("WEBHOOK_CLEANUP_INTERVAL_SECS", 86_400)?,
            webhook_retention_days: parsed_var("WEBHOOK_RETENTION_DAYS", 30)?,
        };

        Ok(config)
    }

    /// Graph adapter configuration.
    pub fn graph_config(&self) -> GraphConfig {
        let mut config = GraphConfig::new(
            &self.graph_tenant_id,
            &self.graph_client_id,
            &self.graph_client_secret,
            &self.webhook_notification_url,
            &self.webhook_client_state,
        );
        config.subscription_expiration_hours = self.subscription_expiration_hours;
        if let Some(base_url) = &self.graph_api_base_url {
            config.api_base_url = base_url.clone();
        }
        config
    }

    /// Delta sync engine settings.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            look_back_days: self.sync_look_back_days,
            page_size: self.sync_page_size,
            ..SyncSettings::default()
        }
    }

    /// Subscription manager settings.
    pub fn subscription_settings(&self) -> SubscriptionSettings {
        SubscriptionSettings {
            renewal_lead_hours: self.subscription_renewal_lead_hours,
        }
    }

    /// Webhook processor settings.
    pub fn webhook_settings(&self) -> WebhookSettings {
        WebhookSettings {
            retention_days: self.webhook_retention_days,
            ..WebhookSettings::new(&self.webhook_client_state)
        }
    }

    /// Provider gateway retry settings.
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.retry_max_attempts,
            initial_interval: Duration::from_millis(self.retry_initial_interval_ms),
            multiplier: self.retry_multiplier,
            max_interval: Duration::from_millis(self.retry_max_interval_ms),
        }
    }

    /// Provider gateway circuit breaker settings.
    pub fn circuit_settings(&self) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            open_cooldown: Duration::from_secs(self.circuit_open_cooldown_secs),
            ..CircuitBreakerSettings::default()
        }
    }

    /// Periodic sweep intervals.
    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            subscription_sweep_interval: Duration::from_secs(self.subscription_sweep_interval_secs),
            retry_sweep_interval: Duration::from_secs(self.webhook_retry_interval_secs),
            cleanup_interval: Duration::from_secs(self.webhook_cleanup_interval_secs),
        }
    }
}

/// Splits the MAILBOXES variable into trimmed, non-empty addresses.
fn parse_mailboxes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingRequired(name)),
    }
}

fn parsed_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),
}

// =============================================================================
// Unit Tests
// =============================================================================
