use std::time::Duration;

use thiserror::Error;

/// Errors returned by the record store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Connection or TLS failure before a response was received.
    #[error("datastore transport error: {0}")]
    Transport(String),

    #[error("datastore call timed out after {}s", duration.as_secs())]
    Timeout { duration: Duration },

    /// Non-success HTTP status from the datastore.
    #[error("datastore returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("datastore decode error for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed response that lacked what the call promised.
    #[error("unexpected datastore response: {0}")]
    Unexpected(String),

    #[error("datastore misconfigured: {0}")]
    Misconfiguration(String),
}

impl PersistenceError {
    /// Timeouts, connection failures, 429s and 5xx are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::Transport(_) | PersistenceError::Timeout { .. } => true,
            PersistenceError::Status { status, .. } => *status == 429 || *status >= 500,
            PersistenceError::Decode { .. }
            | PersistenceError::Unexpected(_)
            | PersistenceError::Misconfiguration(_) => false,
        }
    }
}
