//! Provider traits and invocation options.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    /// Strict structured output against a JSON schema.
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

impl ResponseFormat {
    /// The `text.format` object of a Responses API request.
    #[must_use]
    pub fn to_request_value(&self) -> serde_json::Value {
        match self {
            ResponseFormat::Text => serde_json::json!({ "type": "text" }),
            ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
            ResponseFormat::JsonSchema { name, schema } => serde_json::json!({
                "type": "json_schema",
                "name": name,
                "schema": schema,
                "strict": true,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub use_web_search: bool,
    pub reasoning_effort: ReasoningEffort,
    pub response_format: ResponseFormat,
    /// Ask the provider to retain the response server-side.
    pub store: bool,
}

impl InvokeOptions {
    /// Web search on, high effort, stored. Used for briefs and fan-out tasks.
    #[must_use]
    pub fn research() -> Self {
        Self {
            use_web_search: true,
            reasoning_effort: ReasoningEffort::High,
            response_format: ResponseFormat::Text,
            store: true,
        }
    }

    /// No tools, minimal effort, not stored. Used by the chat fallback.
    #[must_use]
    pub fn quick_reply() -> Self {
        Self {
            use_web_search: false,
            reasoning_effort: ReasoningEffort::Minimal,
            response_format: ResponseFormat::Text,
            store: false,
        }
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = effort;
        self
    }
}

/// Provider output. `output_text` is not guaranteed to be JSON even when a
/// structured format was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub output_text: Option<String>,
    pub raw: serde_json::Value,
}

/// A hosted model endpoint taking developer instructions plus user text.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Issue one model call.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on invalid input, network, auth, rate-limit,
    /// timeout or decode failures.
    async fn invoke(
        &self,
        instructions: &str,
        user_text: &str,
        options: &InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Image generation endpoint. Returns the provider payload as-is; use
/// [`crate::image::extract_asset_reference`] to read it.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProviderError`] on any failed call.
    async fn generate_image(&self, prompt: &str) -> Result<serde_json::Value, ProviderError>;
}
