//! Graph wire types and their mapping onto the engine's domain types.
//!
//! Messages are kept as raw JSON values alongside the typed view so the
//! full provider payload survives into the mirror's snapshot column.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use mailsync_core::ChangeMessage;
use mailsync_engine::{ChangePage, Continuation};

// =============================================================================
// Responses
// =============================================================================

/// OAuth2 token response (client-credentials flow).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Subscription resource as returned by create/renew calls.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub expiration_date_time: DateTime<Utc>,
}

/// One page of a message delta query.
#[derive(Debug, Deserialize)]
pub struct DeltaResponse {
    #[serde(default)]
    pub value: Vec<serde_json::Value>,

    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,

    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

impl DeltaResponse {
    /// Maps the page onto the engine's change-page shape. A delta link
    /// wins over a next link; neither means the page stream just ends.
    pub fn into_change_page(self) -> ChangePage {
        let messages = self.value.into_iter().map(change_message_from_value).collect();

        let continuation = if let Some(delta_link) = self.delta_link {
            Continuation::ResumeCursor(delta_link)
        } else if let Some(next_link) = self.next_link {
            Continuation::NextPage(next_link)
        } else {
            Continuation::End
        };

        ChangePage {
            messages,
            continuation,
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Typed view of the message fields the mirror keeps.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: Option<String>,
    #[serde(rename = "@removed")]
    removed: Option<serde_json::Value>,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    to_recipients: Option<Vec<GraphRecipient>>,
    received_date_time: Option<DateTime<Utc>>,
    has_attachments: Option<bool>,
    is_read: Option<bool>,
    importance: Option<String>,
    body_preview: Option<String>,
    body: Option<GraphItemBody>,
    categories: Option<Vec<String>>,
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEmailAddress {
    address: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphItemBody {
    content_type: Option<String>,
    content: Option<String>,
}

/// Maps one raw delta entry onto a [`ChangeMessage`].
///
/// An unparseable entry degrades to an id-less record, which the engine
/// skips and logs instead of failing the batch.
fn change_message_from_value(value: serde_json::Value) -> ChangeMessage {
    let message: GraphMessage = match serde_json::from_value(value.clone()) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Unparseable delta entry, passing through as id-less record");
            return ChangeMessage {
                raw: Some(value),
                ..ChangeMessage::default()
            };
        }
    };

    let (sender_email, sender_name) = match message.from.and_then(|r| r.email_address) {
        Some(address) => (address.address, address.name),
        None => (None, None),
    };

    let recipients = message
        .to_recipients
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.email_address.and_then(|a| a.address))
        .collect();

    let (body_content_type, body_content) = match message.body {
        Some(body) => (body.content_type, body.content),
        None => (None, None),
    };

    ChangeMessage {
        id: message.id,
        removed: message.removed.is_some(),
        subject: message.subject,
        sender_email,
        sender_name,
        recipients,
        received_at: message.received_date_time,
        has_attachments: message.has_attachments.unwrap_or(false),
        is_read: message.is_read.unwrap_or(false),
        importance: message.importance,
        body_preview: message.body_preview,
        body_content,
        body_content_type,
        categories: message.categories.unwrap_or_default(),
        conversation_id: message.conversation_id,
        raw: Some(value),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_page_maps_messages_and_next_link() {
        let response: DeltaResponse = serde_json::from_value(json!({
            "value": [
                {
                    "id": "msg-1",
                    "subject": "hello",
                    "from": { "emailAddress": { "address": "s@y.com", "name": "Sender" } },
                    "toRecipients": [
                        { "emailAddress": { "address": "a@x.com" } },
                        { "emailAddress": { "address": "b@x.com" } }
                    ],
                    "receivedDateTime": "2026-07-01T10:00:00Z",
                    "hasAttachments": true,
                    "isRead": false,
                    "importance": "high",
                    "bodyPreview": "hello there",
                    "body": { "contentType": "html", "content": "<p>hello there</p>" },
                    "categories": ["alerts"],
                    "conversationId": "conv-1"
                }
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next-page"
        }))
        .unwrap();

        let page = response.into_change_page();

        assert_eq!(
            page.continuation,
            Continuation::NextPage("https://graph.microsoft.com/v1.0/next-page".into())
        );
        assert_eq!(page.messages.len(), 1);

        let message = &page.messages[0];
        assert_eq!(message.id.as_deref(), Some("msg-1"));
        assert!(!message.removed);
        assert_eq!(message.sender_email.as_deref(), Some("s@y.com"));
        assert_eq!(message.sender_name.as_deref(), Some("Sender"));
        assert_eq!(message.recipients, vec!["a@x.com", "b@x.com"]);
        assert!(message.has_attachments);
        assert_eq!(message.body_content_type.as_deref(), Some("html"));
        assert!(message.raw.is_some());
    }

    #[test]
    fn delta_link_wins_and_removed_markers_are_detected() {
        let response: DeltaResponse = serde_json::from_value(json!({
            "value": [
                { "id": "msg-1", "@removed": { "reason": "deleted" } }
            ],
            "@odata.deltaLink": "https://graph.microsoft.com/v1.0/delta-token"
        }))
        .unwrap();

        let page = response.into_change_page();

        assert_eq!(
            page.continuation,
            Continuation::ResumeCursor("https://graph.microsoft.com/v1.0/delta-token".into())
        );
        assert!(page.messages[0].removed);
        assert_eq!(page.messages[0].id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn empty_terminal_page_ends_the_stream() {
        let response: DeltaResponse = serde_json::from_value(json!({ "value": [] })).unwrap();
        let page = response.into_change_page();

        assert_eq!(page.continuation, Continuation::End);
        assert!(page.messages.is_empty());
    }

    #[test]
    fn unparseable_entries_degrade_to_idless_records() {
        let response: DeltaResponse = serde_json::from_value(json!({
            "value": [ { "receivedDateTime": "not-a-date" } ]
        }))
        .unwrap();

        let page = response.into_change_page();

        assert_eq!(page.messages.len(), 1);
        assert!(page.messages[0].id.is_none());
        assert!(page.messages[0].raw.is_some());
    }

    #[test]
    fn subscription_response_parses_expiry() {
        let response: SubscriptionResponse = serde_json::from_value(json!({
            "id": "sub-1",
            "expirationDateTime": "2026-07-04T10:00:00Z",
            "resource": "users/a@x.com/messages"
        }))
        .unwrap();

        assert_eq!(response.id, "sub-1");
        assert_eq!(response.expiration_date_time.to_rfc3339(), "2026-07-04T10:00:00+00:00");
    }
}
