//! The record-store interface and the persisted record shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::fields::FieldMap;

/// One Airtable row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    /// First non-empty string among `keys`.
    #[must_use]
    pub fn string_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k).and_then(serde_json::Value::as_str))
            .find(|s| !s.is_empty())
    }
}

/// Find, create and update records keyed by a prospect identity (email).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up the record for `identity`, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Implementations may return [`PersistenceError`]; the Airtable client
    /// swallows per-formula failures and returns `Ok(None)` instead.
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Record>, PersistenceError>;

    /// Create a record holding only the identity field. Not idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] on any failed call.
    async fn create(&self, identity: &str) -> Result<Record, PersistenceError>;

    /// Overwrite `fields` on an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`]; check [`PersistenceError::is_retryable`].
    async fn update(
        &self,
        record_id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), PersistenceError>;

    fn field_map(&self) -> &FieldMap;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_airtable_shape() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "id": "recABC",
            "createdTime": "2025-08-01T12:00:00.000Z",
            "fields": {"Email": "a@b.io", "Full Response": ""}
        }))
        .expect("record");
        assert_eq!(record.id, "recABC");
        assert_eq!(record.created_time.as_deref(), Some("2025-08-01T12:00:00.000Z"));
        assert_eq!(record.string_field(&["Full Response", "Email"]), Some("a@b.io"));
    }

    #[test]
    fn record_without_fields_defaults_to_empty() {
        let record: Record =
            serde_json::from_value(serde_json::json!({"id": "recX"})).expect("record");
        assert!(record.fields.is_empty());
        assert_eq!(record.string_field(&["Email"]), None);
    }
}
