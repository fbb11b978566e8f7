//! Provider-facing webhook endpoints.
//!
//! ## Acknowledgement Policy
//! The notification endpoint always returns 202, even when internal
//! processing fails: the provider disables subscriptions after repeated
//! negative acknowledgements, so server-side faults must never leak into
//! the response. The two exceptions are a malformed payload (400) and a
//! client-state mismatch (401), both of which indicate the caller, not
//! this service, is broken.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::AppState;
use mailsync_engine::SyncError;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/webhooks/notifications",
        get(validate_webhook).post(receive_notifications),
    )
}

// =============================================================================
// Validation Handshake
// =============================================================================

#[derive(Debug, Deserialize)]
struct ValidationQuery {
    #[serde(rename = "validationToken")]
    validation_token: Option<String>,
}

/// Echoes the provider's validation token back verbatim as text/plain.
async fn validate_webhook(Query(query): Query<ValidationQuery>) -> Response {
    match query.validation_token {
        Some(token) if !token.trim().is_empty() => {
            info!("Webhook validation request received");
            (StatusCode::OK, [("Content-Type", "text/plain")], token).into_response()
        }
        _ => {
            warn!("Webhook validation request without token");
            (StatusCode::BAD_REQUEST, "Missing validation token").into_response()
        }
    }
}

// =============================================================================
// Notification Intake
// =============================================================================

/// One change event extracted from the batch payload.
#[derive(Debug, PartialEq)]
pub(crate) struct NotificationItem {
    pub subscription_id: String,
    pub change_type: Option<String>,
    pub resource: Option<String>,
    pub client_state: Option<String>,
}

/// Extracts the `value` array of change events from a raw webhook body.
pub(crate) fn parse_notifications(payload: &str) -> Result<Vec<NotificationItem>, String> {
    let root: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {e}"))?;

    let Some(events) = root.get("value").and_then(|v| v.as_array()) else {
        return Err("payload has no 'value' array".to_string());
    };

    let mut items = Vec::with_capacity(events.len());
    for event in events {
        let Some(subscription_id) = event.get("subscriptionId").and_then(|v| v.as_str()) else {
            warn!("Skipping notification event without subscriptionId");
            continue;
        };

        let string_field = |name: &str| {
            event
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        items.push(NotificationItem {
            subscription_id: subscription_id.to_string(),
            change_type: string_field("changeType"),
            resource: string_field("resource"),
            client_state: string_field("clientState"),
        });
    }

    Ok(items)
}

/// Accepts a batch of change notifications.
async fn receive_notifications(State(state): State<Arc<AppState>>, payload: String) -> Response {
    info!("Webhook notification received");
    debug!(payload = %payload, "Notification payload");

    let items = match parse_notifications(&payload) {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "Invalid webhook payload structure");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    for item in items {
        match state
            .notifications
            .accept(
                &item.subscription_id,
                item.change_type,
                item.resource,
                item.client_state,
                Some(payload.clone()),
            )
            .await
        {
            Ok(notification) => state.notifications.spawn_process(notification),
            Err(SyncError::Validation(message)) => {
                error!(message = %message, "Invalid client state in webhook notification");
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Err(e) => {
                // Acknowledge anyway: internal faults are retried from the
                // ledger, never surfaced to the provider.
                error!(error = %e, "Failed to accept webhook notification");
            }
        }
    }

    StatusCode::ACCEPTED.into_response()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_payload_parses_all_fields() {
        let payload = r#"{
            "value": [
                {
                    "subscriptionId": "sub-1",
                    "changeType": "created",
                    "resource": "users/a@x.com/messages/m1",
                    "clientState": "secret"
                },
                {
                    "subscriptionId": "sub-2",
                    "changeType": "deleted"
                }
            ]
        }"#;

        let items = parse_notifications(payload).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            NotificationItem {
                subscription_id: "sub-1".into(),
                change_type: Some("created".into()),
                resource: Some("users/a@x.com/messages/m1".into()),
                client_state: Some("secret".into()),
            }
        );
        assert_eq!(items[1].subscription_id, "sub-2");
        assert!(items[1].client_state.is_none());
    }

    #[test]
    fn events_without_subscription_id_are_skipped() {
        let payload = r#"{"value": [ {"changeType": "created"}, {"subscriptionId": "sub-1"} ]}"#;

        let items = parse_notifications(payload).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subscription_id, "sub-1");
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_notifications("not json").is_err());
        assert!(parse_notifications(r#"{"value": 42}"#).is_err());
        assert!(parse_notifications(r#"{"other": []}"#).is_err());
    }
}
