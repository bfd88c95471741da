use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use mudey_core::config::{EmailConfig, EmailProviderConfig};

/// Provider-agnostic outbound e-mail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub from: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
    pub provider: &'static str,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("no email provider is configured")]
    NotConfigured,
    #[error("provider {provider} transport failure: {reason}")]
    Transport { provider: &'static str, reason: String },
    #[error("provider {provider} rejected the message: {reason}")]
    Rejected { provider: &'static str, reason: String },
    #[error("all {attempts} email providers failed; last error: {last_error}")]
    AllProvidersFailed { attempts: usize, last_error: String },
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError>;
}

/// Tries each configured provider in order; first acceptance wins.
pub struct FailoverEmailSender {
    providers: Vec<Box<dyn EmailSender>>,
}

impl FailoverEmailSender {
    pub fn new(providers: Vec<Box<dyn EmailSender>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        let timeout = Duration::from_secs(15);
        let providers = config
            .providers
            .iter()
            .filter_map(|provider| build_provider(provider, timeout))
            .collect();
        Self::new(providers)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl EmailSender for FailoverEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        if self.providers.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let mut last_error = String::new();
        for provider in &self.providers {
            match provider.send(message).await {
                Ok(receipt) => return Ok(receipt),
                Err(error) => {
                    warn!(
                        event_name = "email.provider_failed",
                        error = %error,
                        "email provider failed; trying next"
                    );
                    last_error = error.to_string();
                }
            }
        }

        Err(EmailError::AllProvidersFailed { attempts: self.providers.len(), last_error })
    }
}

fn build_provider(
    config: &EmailProviderConfig,
    timeout: Duration,
) -> Option<Box<dyn EmailSender>> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(match config {
        EmailProviderConfig::Sendgrid { api_key } => {
            Box::new(SendgridSender { client, api_key: api_key.clone() })
        }
        EmailProviderConfig::Mailgun { api_key, domain } => Box::new(MailgunSender {
            client,
            api_key: api_key.clone(),
            domain: domain.clone(),
        }),
        EmailProviderConfig::Postmark { server_token } => {
            Box::new(PostmarkSender { client, server_token: server_token.clone() })
        }
    })
}

struct SendgridSender {
    client: reqwest::Client,
    api_key: String,
}

#[async_trait]
impl EmailSender for SendgridSender {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let mut payload = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": message.from, "name": message.from_name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        });
        if let Some(reply_to) = &message.reply_to {
            payload["reply_to"] = json!({ "email": reply_to });
        }

        let response = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| EmailError::Transport {
                provider: "sendgrid",
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                provider: "sendgrid",
                reason: format!("status {status}: {body}"),
            });
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(EmailReceipt { message_id, provider: "sendgrid" })
    }
}

struct MailgunSender {
    client: reqwest::Client,
    api_key: String,
    domain: String,
}

#[async_trait]
impl EmailSender for MailgunSender {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let from = format!("{} <{}>", message.from_name, message.from);
        let mut form = vec![
            ("from", from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("html", message.html.as_str()),
        ];
        if let Some(reply_to) = &message.reply_to {
            form.push(("h:Reply-To", reply_to.as_str()));
        }

        let response = self
            .client
            .post(format!("https://api.mailgun.net/v3/{}/messages", self.domain))
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|error| EmailError::Transport {
                provider: "mailgun",
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                provider: "mailgun",
                reason: format!("status {status}: {body}"),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|error| {
            EmailError::Transport { provider: "mailgun", reason: error.to_string() }
        })?;
        let message_id = body.get("id").and_then(serde_json::Value::as_str).map(str::to_string);

        Ok(EmailReceipt { message_id, provider: "mailgun" })
    }
}

struct PostmarkSender {
    client: reqwest::Client,
    server_token: String,
}

#[async_trait]
impl EmailSender for PostmarkSender {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let mut payload = json!({
            "From": format!("{} <{}>", message.from_name, message.from),
            "To": message.to,
            "Subject": message.subject,
            "HtmlBody": message.html,
            "MessageStream": "outbound",
        });
        if let Some(reply_to) = &message.reply_to {
            payload["ReplyTo"] = json!(reply_to);
        }

        let response = self
            .client
            .post("https://api.postmarkapp.com/email")
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(&payload)
            .send()
            .await
            .map_err(|error| EmailError::Transport {
                provider: "postmark",
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                provider: "postmark",
                reason: format!("status {status}: {body}"),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|error| {
            EmailError::Transport { provider: "postmark", reason: error.to_string() }
        })?;
        let message_id =
            body.get("MessageID").and_then(serde_json::Value::as_str).map(str::to_string);

        Ok(EmailReceipt { message_id, provider: "postmark" })
    }
}

/// Test double: records sent mail and fails on demand.
#[derive(Default)]
pub struct InMemoryEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failures_remaining: Mutex<usize>,
}

impl InMemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with a transport error.
    pub async fn fail_next(&self, count: usize) {
        *self.failures_remaining.lock().await = count;
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for InMemoryEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        let mut failures = self.failures_remaining.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(EmailError::Transport {
                provider: "in-memory",
                reason: "scripted failure".to_string(),
            });
        }
        drop(failures);

        let mut sent = self.sent.lock().await;
        sent.push(message.clone());
        Ok(EmailReceipt { message_id: Some(format!("mem-{}", sent.len())), provider: "in-memory" })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{
        EmailError, EmailMessage, EmailReceipt, EmailSender, FailoverEmailSender,
        InMemoryEmailSender,
    };

    fn message() -> EmailMessage {
        EmailMessage {
            to: "leads@andorinha.example.com".to_string(),
            subject: "Novo lead de mudança".to_string(),
            html: "<p>lead</p>".to_string(),
            from: "leads@mudey.com.br".to_string(),
            from_name: "Mudey".to_string(),
            reply_to: None,
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl EmailSender for AlwaysFails {
        async fn send(&self, _message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
            Err(EmailError::Rejected { provider: "broken", reason: "401".to_string() })
        }
    }

    #[tokio::test]
    async fn failover_uses_the_first_working_provider() {
        let working = InMemoryEmailSender::new();
        let sender =
            FailoverEmailSender::new(vec![Box::new(AlwaysFails), Box::new(working)]);

        let receipt = sender.send(&message()).await.expect("second provider works");
        assert_eq!(receipt.provider, "in-memory");
    }

    #[tokio::test]
    async fn failover_reports_when_every_provider_fails() {
        let sender = FailoverEmailSender::new(vec![Box::new(AlwaysFails), Box::new(AlwaysFails)]);

        let error = sender.send(&message()).await.expect_err("all fail");
        assert!(matches!(error, EmailError::AllProvidersFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn empty_provider_list_is_not_configured() {
        let sender = FailoverEmailSender::new(Vec::new());
        assert!(matches!(
            sender.send(&message()).await,
            Err(EmailError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn in_memory_sender_scripts_failures() {
        let sender = InMemoryEmailSender::new();
        sender.fail_next(1).await;

        assert!(sender.send(&message()).await.is_err());
        assert!(sender.send(&message()).await.is_ok());
        assert_eq!(sender.sent().await.len(), 1);
    }
}
