use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use mudey_core::config::ChannelConfig;

use crate::messages::OutboundMessage;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel transport failure: {0}")]
    Transport(String),
    #[error("channel rejected the message: {0}")]
    Rejected(String),
    #[error("channel sender is not configured")]
    NotConfigured,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Outbound side of the channel adapter.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        identity: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError>;
}

/// WhatsApp Cloud-style HTTP sender.
pub struct HttpChannelSender {
    client: reqwest::Client,
    config: ChannelConfig,
}

impl HttpChannelSender {
    pub fn from_config(config: &ChannelConfig) -> Option<Self> {
        if config.access_token.expose_secret().is_empty() || config.phone_number_id.is_empty() {
            return None;
        }

        let client = reqwest::Client::builder().timeout(Duration::from_secs(15)).build().ok()?;
        Some(Self { client, config: config.clone() })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    fn payload(identity: &str, message: &OutboundMessage) -> Value {
        match message {
            OutboundMessage::Text { body } => json!({
                "messaging_product": "whatsapp",
                "to": identity,
                "type": "text",
                "text": { "body": body },
            }),
            OutboundMessage::Buttons { body, buttons } => json!({
                "messaging_product": "whatsapp",
                "to": identity,
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": { "text": body },
                    "action": {
                        "buttons": buttons.iter().map(|button| json!({
                            "type": "reply",
                            "reply": { "id": button.id, "title": button.title },
                        })).collect::<Vec<_>>(),
                    },
                },
            }),
            OutboundMessage::List { body, button_label, options } => json!({
                "messaging_product": "whatsapp",
                "to": identity,
                "type": "interactive",
                "interactive": {
                    "type": "list",
                    "body": { "text": body },
                    "action": {
                        "button": button_label,
                        "sections": [{
                            "title": "Opções",
                            "rows": options.iter().map(|option| json!({
                                "id": option.id,
                                "title": option.title,
                                "description": option.description,
                            })).collect::<Vec<_>>(),
                        }],
                    },
                },
            }),
        }
    }
}

#[async_trait]
impl ChannelSender for HttpChannelSender {
    async fn send(
        &self,
        identity: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&Self::payload(identity, message))
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected(format!("status {status}: {body}")));
        }

        let body: Value =
            response.json().await.map_err(|error| SendError::Transport(error.to_string()))?;
        let message_id = body
            .pointer("/messages/0/id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(SendReceipt { message_id })
    }
}

/// Captures sends in memory; the test double for the whole pipeline.
#[derive(Default)]
pub struct InMemoryChannelSender {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl InMemoryChannelSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChannelSender for InMemoryChannelSender {
    async fn send(
        &self,
        identity: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        self.sent.lock().await.push((identity.to_string(), message.clone()));
        Ok(SendReceipt { message_id: Some(format!("mem-{}", self.sent.lock().await.len())) })
    }
}
