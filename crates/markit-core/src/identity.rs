//! Requester identity: a validated email address.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("email must not be empty")]
    Empty,

    #[error("email exceeds {MAX_EMAIL_LEN} characters")]
    TooLong,

    #[error("invalid email address '{0}'")]
    Malformed(String),
}

/// A syntactically valid email address.
///
/// The original casing is preserved for display and storage. Datastore
/// lookups compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Validate and wrap an email address.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the address is empty, too long, or not of
    /// the form `local@domain.tld`.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        if trimmed.len() > MAX_EMAIL_LEN {
            return Err(IdentityError::TooLong);
        }

        let malformed = || IdentityError::Malformed(trimmed.to_string());

        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        let (local, domain) = trimmed.split_once('@').ok_or_else(malformed)?;
        if local.is_empty() || domain.contains('@') {
            return Err(malformed());
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2
            || labels.iter().any(|label| {
                label.is_empty()
                    || label.starts_with('-')
                    || label.ends_with('-')
                    || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
        {
            return Err(malformed());
        }

        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The company domain, i.e. everything after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}
