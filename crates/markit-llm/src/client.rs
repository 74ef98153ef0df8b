//! HTTP client for the OpenAI Responses and Images APIs.
//!
//! Wraps `reqwest` with provider-specific status mapping, bearer auth and a
//! bounded request timeout. Transient failures are retried with back-off.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::ProviderError;
use crate::retry::retry_with_backoff;
use crate::types::{ImageProvider, InvokeOptions, Provider, ProviderResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ERROR_BODY_LIMIT: usize = 500;
const IMAGE_SIZE: &str = "1024x1024";

/// Client for the hosted model provider.
///
/// Use [`OpenAiClient::new`] for production or [`OpenAiClient::with_base_url`]
/// to point at a mock server in tests.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    image_model: String,
    timeout: Duration,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("image_model", &self.image_model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Misconfiguration`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        api_key: &str,
        model: &str,
        image_model: &str,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, image_model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Misconfiguration`] if the API key or base URL
    /// is blank, or the HTTP client cannot be constructed.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        image_model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Misconfiguration(
                "provider API key must not be empty".to_string(),
            ));
        }
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ProviderError::Misconfiguration(
                "provider base URL must not be empty".to_string(),
            ));
        }

        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("markit/0.1 (marketing-briefs)")
            .build()
            .map_err(|e| ProviderError::Misconfiguration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: base_url.to_owned(),
            model: model.to_owned(),
            image_model: image_model.to_owned(),
            timeout,
            max_retries: 0,
            backoff_base_ms: 1_000,
        })
    }

    /// Retry transport errors, 429s and 5xx up to `max_retries` extra times.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    fn responses_body(
        &self,
        instructions: &str,
        user_text: &str,
        options: &InvokeOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": [
                {"role": "developer", "content": [{"type": "input_text", "text": instructions}]},
                {"role": "user", "content": [{"type": "input_text", "text": user_text}]},
            ],
            "text": {
                "format": options.response_format.to_request_value(),
                "verbosity": "medium",
            },
            "reasoning": {"effort": options.reasoning_effort},
            "store": options.store,
        });
        if options.use_web_search {
            body["tools"] = serde_json::json!([{
                "type": "web_search_preview",
                "user_location": {"type": "approximate", "country": "US"},
                "search_context_size": "medium",
            }]);
        }
        body
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        if !status.is_success() {
            return Err(map_status(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
            context: url.to_string(),
            source: e,
        })
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                duration: self.timeout,
            }
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Provider for OpenAiClient {
    async fn invoke(
        &self,
        instructions: &str,
        user_text: &str,
        options: &InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        if instructions.trim().is_empty() {
            return Err(ProviderError::InvalidInput(
                "instructions must not be empty".to_string(),
            ));
        }
        if user_text.trim().is_empty() {
            return Err(ProviderError::InvalidInput(
                "user text must not be empty".to_string(),
            ));
        }

        let url = format!("{}/responses", self.base_url);
        let body = self.responses_body(instructions, user_text, options);
        let started = std::time::Instant::now();
        let raw = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.post_json(&url, &body)
        })
        .await?;

        let output_text = collect_output_text(&raw);
        tracing::debug!(
            model = %self.model,
            web_search = options.use_web_search,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            output_len = output_text.as_deref().map_or(0, str::len),
            "provider call complete"
        );
        Ok(ProviderResponse { output_text, raw })
    }
}

#[async_trait]
impl ImageProvider for OpenAiClient {
    async fn generate_image(&self, prompt: &str) -> Result<serde_json::Value, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::InvalidInput(
                "image prompt must not be empty".to_string(),
            ));
        }
        let url = format!("{}/images/generations", self.base_url);
        let body = serde_json::json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
        });
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.post_json(&url, &body)
        })
        .await
    }
}

/// The convenience `output_text` field, or the concatenated `output_text`
/// parts of every message in `output`.
pub(crate) fn collect_output_text(raw: &serde_json::Value) -> Option<String> {
    if let Some(text) = raw.get("output_text").and_then(serde_json::Value::as_str) {
        return Some(text.to_string());
    }

    let parts: Vec<&str> = raw
        .get("output")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(serde_json::Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(serde_json::Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(serde_json::Value::as_str))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.concat())
    }
}

fn map_status(status: StatusCode, body: &str) -> ProviderError {
    let body = truncate(body);
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(format!("HTTP {status}: {body}")),
        429 => ProviderError::RateLimited(body),
        code @ 500..=599 => ProviderError::Outage { status: code, body },
        code => ProviderError::UnexpectedStatus { status: code, body },
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        cut.push_str("...");
        cut
    }
}
