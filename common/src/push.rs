// Push delivery client
// Sends one notification to an Expo-compatible push endpoint

use crate::config::PushConfig;
use crate::errors::DeliveryError;
use crate::models::NotificationPayload;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

/// Message body accepted by the push service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    pub session_id: String,
}

impl From<&NotificationPayload> for PushMessage {
    fn from(payload: &NotificationPayload) -> Self {
        Self {
            to: payload.push_target.clone(),
            sound: "default",
            title: payload.title.clone(),
            body: payload.body.clone(),
            data: PushData {
                session_id: payload.session_id.clone(),
            },
        }
    }
}

/// Delivers a single push notification
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Send the message. `Ok` means the push service accepted it.
    async fn send(&self, message: &PushMessage) -> Result<(), DeliveryError>;
}

/// Client for the Expo push API
pub struct ExpoPushClient {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl ExpoPushClient {
    /// Create a new client with the configured endpoint and timeout
    pub fn new(config: &PushConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                DeliveryError::RequestFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

/// Expo answers 200 even for some rejected messages and reports the problem in
/// the ticket: `{"data": {"status": "error", "message": ...}}`. Batch sends
/// return an array of tickets instead.
fn ticket_error(response: &Value) -> Option<String> {
    let tickets = match response.get("data") {
        Some(Value::Array(tickets)) => tickets.iter().collect::<Vec<_>>(),
        Some(ticket @ Value::Object(_)) => vec![ticket],
        _ => return None,
    };

    tickets.into_iter().find_map(|ticket| {
        if ticket.get("status").and_then(Value::as_str) == Some("error") {
            let message = ticket
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown push ticket error");
            Some(message.to_string())
        } else {
            None
        }
    })
}

#[async_trait]
impl PushDelivery for ExpoPushClient {
    #[instrument(skip(self, message), fields(session_id = %message.data.session_id))]
    async fn send(&self, message: &PushMessage) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(message);

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Push service rejected request");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // A body that is not JSON carries no ticket to inspect
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            if let Some(reason) = ticket_error(&parsed) {
                return Err(DeliveryError::TicketError(reason));
            }
        }

        tracing::debug!(status = status.as_u16(), "Push accepted");
        Ok(())
    }
}
