use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use mudey_core::config::{ShortenerConfig, ShortenerKind};

/// All providers failed. Callers must fail the delivery and let the sweep
/// retry later; falling back to the unshortened URL is forbidden because
/// the long link embeds content that breaks when truncated in transit.
#[derive(Debug, Error)]
pub enum ShortenError {
    #[error("all {attempts} shortening providers failed; last error: {last_error}")]
    Unavailable { attempts: usize, last_error: String },
}

/// One third-party shortening service.
///
/// `attempt` resolves to the provider's answer; a provider-reported error
/// code counts as failure even under HTTP 200.
#[async_trait]
pub trait ShortenProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, url: &str) -> Result<String, String>;
}

/// Ordered cascade over independent shortening providers.
pub struct UrlShortener {
    providers: Vec<Box<dyn ShortenProvider>>,
    threshold_chars: usize,
}

impl UrlShortener {
    pub fn new(providers: Vec<Box<dyn ShortenProvider>>, threshold_chars: usize) -> Self {
        Self { providers, threshold_chars }
    }

    pub fn from_config(config: &ShortenerConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let providers = config
            .providers
            .iter()
            .filter_map(|kind| build_provider(*kind, timeout))
            .collect();
        Self::new(providers, config.threshold_chars)
    }

    /// Shortens `url`, trying providers in order and accepting the first
    /// result that is strictly shorter than the input. Inputs already at
    /// or below the threshold are returned unchanged without any network
    /// call.
    pub async fn shorten(&self, url: &str) -> Result<String, ShortenError> {
        if url.len() <= self.threshold_chars {
            return Ok(url.to_string());
        }

        let mut last_error = "no providers configured".to_string();
        for provider in &self.providers {
            match provider.attempt(url).await {
                Ok(short) if short.len() < url.len() && short.starts_with("http") => {
                    return Ok(short);
                }
                Ok(short) => {
                    last_error = format!(
                        "provider {} returned a non-shortening result ({} chars)",
                        provider.name(),
                        short.len()
                    );
                    warn!(
                        event_name = "shortener.provider_rejected",
                        provider = provider.name(),
                        "provider answer was not shorter than the input"
                    );
                }
                Err(reason) => {
                    last_error = format!("provider {} failed: {reason}", provider.name());
                    warn!(
                        event_name = "shortener.provider_failed",
                        provider = provider.name(),
                        error = %reason,
                        "shortening provider failed; trying next"
                    );
                }
            }
        }

        Err(ShortenError::Unavailable { attempts: self.providers.len(), last_error })
    }
}

fn build_provider(kind: ShortenerKind, timeout: Duration) -> Option<Box<dyn ShortenProvider>> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(match kind {
        ShortenerKind::TinyUrl => Box::new(TinyUrlProvider { client }),
        ShortenerKind::IsGd => Box::new(IsGdProvider { client }),
        ShortenerKind::CleanUri => Box::new(CleanUriProvider { client }),
    })
}

struct TinyUrlProvider {
    client: reqwest::Client,
}

#[async_trait]
impl ShortenProvider for TinyUrlProvider {
    fn name(&self) -> &'static str {
        "tinyurl"
    }

    async fn attempt(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get("https://tinyurl.com/api-create.php")
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }

        let body = response.text().await.map_err(|error| error.to_string())?;
        let short = body.trim();
        if short.is_empty() || short.contains("Error") {
            return Err(format!("error body: {short}"));
        }
        Ok(short.to_string())
    }
}

struct IsGdProvider {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IsGdResponse {
    shorturl: Option<String>,
    errorcode: Option<i32>,
    errormessage: Option<String>,
}

#[async_trait]
impl ShortenProvider for IsGdProvider {
    fn name(&self) -> &'static str {
        "is_gd"
    }

    async fn attempt(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get("https://is.gd/create.php")
            .query(&[("format", "json"), ("url", url)])
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }

        let parsed: IsGdResponse = response.json().await.map_err(|error| error.to_string())?;
        if let Some(code) = parsed.errorcode {
            return Err(format!(
                "error code {code}: {}",
                parsed.errormessage.unwrap_or_default()
            ));
        }
        parsed.shorturl.ok_or_else(|| "response carried no shorturl".to_string())
    }
}

struct CleanUriProvider {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CleanUriResponse {
    result_url: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl ShortenProvider for CleanUriProvider {
    fn name(&self) -> &'static str {
        "cleanuri"
    }

    async fn attempt(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .post("https://cleanuri.com/api/v1/shorten")
            .form(&[("url", url)])
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }

        let parsed: CleanUriResponse = response.json().await.map_err(|error| error.to_string())?;
        if let Some(error) = parsed.error {
            return Err(format!("provider error: {error}"));
        }
        parsed.result_url.ok_or_else(|| "response carried no result_url".to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{ShortenError, ShortenProvider, UrlShortener};

    struct ScriptedProvider {
        name: &'static str,
        result: Result<String, String>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn boxed(
            name: &'static str,
            result: Result<&str, &str>,
            calls: Arc<AtomicUsize>,
        ) -> Box<dyn ShortenProvider> {
            Box::new(Self {
                name,
                result: result.map(str::to_string).map_err(str::to_string),
                calls,
            })
        }
    }

    #[async_trait]
    impl ShortenProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, _url: &str) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn long_url() -> String {
        format!("https://app.mudey.com.br/l/abc?origem={}", "x".repeat(200))
    }

    #[tokio::test]
    async fn short_input_skips_every_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shortener = UrlShortener::new(
            vec![ScriptedProvider::boxed("a", Ok("https://s.io/1"), calls.clone())],
            96,
        );

        let result = shortener.shorten("https://mudey.com.br/x").await.expect("unchanged");
        assert_eq!(result, "https://mudey.com.br/x");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_success_wins_and_stops_the_cascade() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let shortener = UrlShortener::new(
            vec![
                ScriptedProvider::boxed("a", Ok("https://s.io/ok"), first_calls.clone()),
                ScriptedProvider::boxed("b", Ok("https://s.io/never"), second_calls.clone()),
            ],
            96,
        );

        let result = shortener.shorten(&long_url()).await.expect("shortened");
        assert_eq!(result, "https://s.io/ok");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_provider_falls_through_to_the_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shortener = UrlShortener::new(
            vec![
                ScriptedProvider::boxed("a", Err("error code 1: blocked"), calls.clone()),
                ScriptedProvider::boxed("b", Ok("https://s.io/2"), calls.clone()),
            ],
            96,
        );

        let result = shortener.shorten(&long_url()).await.expect("second provider");
        assert_eq!(result, "https://s.io/2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_error_codes_under_http_200_fail_the_whole_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shortener = UrlShortener::new(
            vec![
                ScriptedProvider::boxed("a", Err("error code 2: banned"), calls.clone()),
                ScriptedProvider::boxed("b", Err("error code 2: banned"), calls.clone()),
                ScriptedProvider::boxed("c", Err("error code 2: banned"), calls.clone()),
            ],
            96,
        );

        let error = shortener.shorten(&long_url()).await.expect_err("must fail closed");
        assert!(matches!(error, ShortenError::Unavailable { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_result_longer_than_the_input_is_not_a_success() {
        let url = long_url();
        let padded = format!("https://s.io/{}", "y".repeat(url.len()));
        let calls = Arc::new(AtomicUsize::new(0));
        let shortener = UrlShortener::new(
            vec![ScriptedProvider::boxed("a", Ok(&padded), calls.clone())],
            96,
        );

        assert!(shortener.shorten(&url).await.is_err());
    }

    #[tokio::test]
    async fn empty_provider_list_fails_closed() {
        let shortener = UrlShortener::new(Vec::new(), 96);
        assert!(shortener.shorten(&long_url()).await.is_err());
    }
}
