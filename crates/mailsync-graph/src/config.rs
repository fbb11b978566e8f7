//! Graph adapter configuration.

use std::time::Duration;

/// Default Graph REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default OAuth2 scope for app-only access.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Configuration for the Graph client.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Azure AD tenant id.
    pub tenant_id: String,

    /// Application (client) id.
    pub client_id: String,

    /// Client secret for the credentials flow.
    pub client_secret: String,

    /// OAuth2 scope requested with the token.
    pub scope: String,

    /// Public URL the provider POSTs change notifications to.
    pub notification_url: String,

    /// Shared secret echoed back in every notification.
    pub client_state: String,

    /// Subscription lifetime requested at create/renew time, relative to
    /// "now" at call time.
    pub subscription_expiration_hours: i64,

    /// Graph REST base URL. Overridable for tests and sovereign clouds.
    pub api_base_url: String,

    /// OAuth2 token endpoint. Defaults to the public-cloud endpoint for
    /// the tenant when not set.
    pub token_url: Option<String>,

    /// Transport-level timeout for every request.
    pub request_timeout: Duration,
}

impl GraphConfig {
    /// Configuration with the required credentials and webhook settings;
    /// everything else takes defaults.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        notification_url: impl Into<String>,
        client_state: impl Into<String>,
    ) -> Self {
        GraphConfig {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: DEFAULT_SCOPE.to_string(),
            notification_url: notification_url.into(),
            client_state: client_state.into(),
            subscription_expiration_hours: 72,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Resolved token endpoint.
    pub fn token_endpoint(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant_id
            )
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_endpoint_derives_from_tenant() {
        let config = GraphConfig::new("tenant-1", "client", "secret", "https://cb", "state");
        assert_eq!(
            config.token_endpoint(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn explicit_token_url_wins() {
        let mut config = GraphConfig::new("tenant-1", "client", "secret", "https://cb", "state");
        config.token_url = Some("http://localhost:9999/token".into());
        assert_eq!(config.token_endpoint(), "http://localhost:9999/token");
    }
}
