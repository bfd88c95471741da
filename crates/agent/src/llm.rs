use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use mudey_core::config::LlmConfig;

/// Completion-service client. Injectable so the estimator can be tested
/// with scripted fakes instead of network calls.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Low temperature keeps the estimates reproducible; the request timeout
/// is the only cancellation mechanism.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpCompletionClient {
    /// Returns `None` when no API key or base URL is configured: the
    /// pipeline then runs on the deterministic fallback estimator only.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if config.api_key.is_none() && config.base_url.is_none() {
            return None;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;

        Some(Self { client, config: config.clone() })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("completion service returned status {status}"));
        }

        let parsed: ChatResponse =
            response.json().await.context("completion response was not valid JSON")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("completion response carried no content"))
    }
}
