//! Graph REST client implementing the provider capability.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::model::{DeltaResponse, SubscriptionResponse, TokenResponse};
use mailsync_engine::{ChangePage, ProviderClient, ProviderError, ProviderSubscription};

/// Message fields requested from delta queries. Matches what the mirror
/// persists; everything else stays out of the payload.
const MESSAGE_SELECT: &str = "id,subject,from,toRecipients,receivedDateTime,hasAttachments,\
                              isRead,importance,bodyPreview,body,categories,conversationId";

/// Access tokens are refreshed this long before their actual expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    refresh_after: Instant,
}

/// Microsoft Graph implementation of [`ProviderClient`].
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    /// Builds a client with the configured transport timeout.
    pub fn new(config: GraphConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(GraphClient {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Returns a valid access token, fetching a fresh one when the cached
    /// token is absent or close to expiry.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_after {
                return Ok(token.access_token.clone());
            }
        }

        debug!(tenant_id = %self.config.tenant_id, "Requesting fresh access token");

        let response = self
            .http
            .post(self.config.token_endpoint())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token request failed with {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in.max(0) as u64);
        let refresh_after = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_after,
        });

        Ok(token.access_token)
    }

    // =========================================================================
    // Request Helpers
    // =========================================================================

    /// GETs one delta page (entry URL, nextLink or deltaLink alike).
    async fn get_page(&self, url: &str) -> Result<ChangePage, ProviderError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;

        let delta: DeltaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(delta.into_change_page())
    }

    fn subscription_expiry(&self) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::hours(self.config.subscription_expiration_hours)
    }
}

/// Maps non-success statuses onto the provider error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Auth(format!("{status}: {body}"))
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::Transport(format!("throttled: {body}")),
        status if status.is_server_error() => {
            ProviderError::Transport(format!("{status}: {body}"))
        }
        status => ProviderError::InvalidResponse(format!("{status}: {body}")),
    })
}

#[async_trait]
impl ProviderClient for GraphClient {
    async fn create_subscription(
        &self,
        address: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        info!(address = %address, "Creating Graph subscription");

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "changeType": "created,updated,deleted",
            "notificationUrl": self.config.notification_url,
            "resource": format!("users/{address}/messages"),
            "expirationDateTime": self.subscription_expiry(),
            "clientState": self.config.client_state,
        });

        let response = self
            .http
            .post(format!("{}/subscriptions", self.config.api_base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;
        let subscription: SubscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        info!(
            address = %address,
            subscription_id = %subscription.id,
            "Graph subscription created"
        );

        Ok(ProviderSubscription {
            id: subscription.id,
            expires_at: subscription.expiration_date_time,
        })
    }

    async fn renew_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<DateTime<Utc>, ProviderError> {
        info!(subscription_id = %subscription_id, "Renewing Graph subscription");

        let token = self.access_token().await?;
        let body = serde_json::json!({ "expirationDateTime": self.subscription_expiry() });

        let response = self
            .http
            .patch(format!(
                "{}/subscriptions/{subscription_id}",
                self.config.api_base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;
        let subscription: SubscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(subscription.expiration_date_time)
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ProviderError> {
        info!(subscription_id = %subscription_id, "Deleting Graph subscription");

        let token = self.access_token().await?;

        let response = self
            .http
            .delete(format!(
                "{}/subscriptions/{subscription_id}",
                self.config.api_base_url
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        match check_status(response).await {
            Ok(_) => Ok(()),
            // Goal state already holds: the subscription no longer exists.
            Err(ProviderError::NotFound(_)) => {
                warn!(
                    subscription_id = %subscription_id,
                    "Subscription not found (already deleted?)"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_initial_page(
        &self,
        address: &str,
        look_back_days: i64,
        page_size: u32,
    ) -> Result<ChangePage, ProviderError> {
        let since = Utc::now() - ChronoDuration::days(look_back_days);
        let filter = format!(
            "receivedDateTime ge {}",
            since.format("%Y-%m-%dT%H:%M:%SZ")
        );

        debug!(address = %address, %filter, "Starting Graph delta query");

        let token = self.access_token().await?;
        let top = page_size.to_string();

        let response = self
            .http
            .get(format!(
                "{}/users/{address}/messages/delta",
                self.config.api_base_url
            ))
            .query(&[
                ("$select", MESSAGE_SELECT),
                ("$top", top.as_str()),
                ("$filter", filter.as_str()),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;
        let delta: DeltaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(delta.into_change_page())
    }

    async fn fetch_changes_since(&self, cursor: &str) -> Result<ChangePage, ProviderError> {
        // The delta link is a complete URL issued by the provider.
        self.get_page(cursor).await
    }

    async fn fetch_next_page(&self, page_token: &str) -> Result<ChangePage, ProviderError> {
        self.get_page(page_token).await
    }
}
