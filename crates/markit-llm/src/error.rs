use std::time::Duration;

use thiserror::Error;

/// Errors returned by hosted model calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Caller passed empty instructions or user text.
    #[error("invalid provider input: {0}")]
    InvalidInput(String),

    /// Network or TLS failure before a response was received.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The call did not finish within the configured bound.
    #[error("provider call timed out after {}s", duration.as_secs())]
    Timeout { duration: Duration },

    /// 401 / 403 from the provider.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// 429 from the provider.
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),

    /// 5xx from the provider.
    #[error("provider outage (HTTP {status}): {body}")]
    Outage { status: u16, body: String },

    /// Any other non-success status.
    #[error("unexpected provider status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response envelope was not valid JSON.
    #[error("provider response decode error for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The call succeeded but produced no text.
    #[error("agent '{agent}' returned no output")]
    EmptyOutput { agent: String },

    #[error("provider misconfigured: {0}")]
    Misconfiguration(String),
}
