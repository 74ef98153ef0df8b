//! Tolerant JSON extraction for provider output.
//!
//! Models are asked for JSON but do not always comply. [`extract`] is the one
//! place where that non-determinism is absorbed: it never fails.

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// The text parsed as JSON.
    Structured(serde_json::Value),
    /// The text was absent or not JSON; kept verbatim.
    Raw(Option<String>),
}

/// Parse `text` strictly as JSON, falling back to [`ParsedOutput::Raw`].
#[must_use]
pub fn extract(text: Option<&str>) -> ParsedOutput {
    let Some(text) = text else {
        return ParsedOutput::Raw(None);
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => ParsedOutput::Structured(value),
        Err(e) => {
            tracing::debug!(error = %e, len = text.len(), "provider output is not JSON, keeping raw text");
            ParsedOutput::Raw(Some(text.to_string()))
        }
    }
}

impl ParsedOutput {
    #[must_use]
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            ParsedOutput::Structured(value) => Some(value),
            ParsedOutput::Raw(_) => None,
        }
    }

    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedOutput::Structured(_))
    }
}

impl Serialize for ParsedOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParsedOutput::Structured(value) => value.serialize(serializer),
            ParsedOutput::Raw(text) => serde_json::json!({ "raw": text }).serialize(serializer),
        }
    }
}
