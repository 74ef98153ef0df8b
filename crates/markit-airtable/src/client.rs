//! HTTP client for the Airtable REST API.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::error::PersistenceError;
use crate::fields::FieldMap;
use crate::store::{Record, RecordStore};

const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<Record>,
}

/// Client for one Airtable table.
///
/// Use [`AirtableClient::new`] for production or
/// [`AirtableClient::with_base_url`] to point at a mock server in tests.
pub struct AirtableClient {
    client: Client,
    api_key: String,
    table_url: String,
    fields: FieldMap,
    timeout: Duration,
}

impl std::fmt::Debug for AirtableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableClient")
            .field("api_key", &"[redacted]")
            .field("table_url", &self.table_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AirtableClient {
    /// Creates a client for `table` in `base_id` on the production API.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Misconfiguration`] if any identifier is
    /// blank or the HTTP client cannot be constructed.
    pub fn new(
        api_key: &str,
        base_id: &str,
        table: &str,
        timeout_secs: u64,
    ) -> Result<Self, PersistenceError> {
        Self::with_base_url(api_key, base_id, table, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Misconfiguration`] if any identifier is
    /// blank or the HTTP client cannot be constructed.
    pub fn with_base_url(
        api_key: &str,
        base_id: &str,
        table: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, PersistenceError> {
        for (what, value) in [("API key", api_key), ("base id", base_id), ("table", table)] {
            if value.trim().is_empty() {
                return Err(PersistenceError::Misconfiguration(format!(
                    "Airtable {what} must not be empty"
                )));
            }
        }

        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("markit/0.1 (marketing-briefs)")
            .build()
            .map_err(|e| PersistenceError::Misconfiguration(format!("http client: {e}")))?;

        let table_url = format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            base_id.trim(),
            utf8_percent_encode(table.trim(), NON_ALPHANUMERIC)
        );

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            table_url,
            fields: FieldMap::default(),
            timeout,
        })
    }

    async fn send_json(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<serde_json::Value, PersistenceError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        if !status.is_success() {
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| PersistenceError::Decode {
            context: context.to_string(),
            source: e,
        })
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> PersistenceError {
        if err.is_timeout() {
            PersistenceError::Timeout {
                duration: self.timeout,
            }
        } else {
            PersistenceError::Transport(err.to_string())
        }
    }

    async fn find_with_formula(&self, formula: &str) -> Result<Option<Record>, PersistenceError> {
        let request = self
            .client
            .get(&self.table_url)
            .query(&[("maxRecords", "1"), ("filterByFormula", formula)]);
        let body = self.send_json(request, "list records").await?;
        let list: RecordList =
            serde_json::from_value(body).map_err(|e| PersistenceError::Decode {
                context: format!("list records ({formula})"),
                source: e,
            })?;
        Ok(list.records.into_iter().next())
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    /// Tries each identity formula in turn. `Ok(None)` only when at least one
    /// formula ran and none matched; if every formula failed, returns the last
    /// error.
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Record>, PersistenceError> {
        let mut last_error = None;
        let mut answered = false;
        for formula in self.fields.identity_formulas(identity) {
            match self.find_with_formula(&formula).await {
                Ok(Some(record)) => {
                    tracing::debug!(record_id = %record.id, %formula, "record found");
                    return Ok(Some(record));
                }
                Ok(None) => answered = true,
                Err(e) => {
                    tracing::warn!(%formula, error = %e, "record lookup formula failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }

    async fn create(&self, identity: &str) -> Result<Record, PersistenceError> {
        let mut fields = serde_json::Map::new();
        fields.insert(
            self.fields.identity_id.clone(),
            serde_json::Value::String(identity.to_string()),
        );
        let payload = serde_json::json!({ "records": [{ "fields": fields }] });
        let body = self
            .send_json(self.client.post(&self.table_url).json(&payload), "create record")
            .await?;
        let list: RecordList =
            serde_json::from_value(body).map_err(|e| PersistenceError::Decode {
                context: "create record".to_string(),
                source: e,
            })?;
        let record = list.records.into_iter().next().ok_or_else(|| {
            PersistenceError::Unexpected("create returned no records".to_string())
        })?;
        tracing::info!(record_id = %record.id, "record created");
        Ok(record)
    }

    async fn update(
        &self,
        record_id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        let field_count = fields.len();
        let payload = serde_json::json!({ "records": [{ "id": record_id, "fields": fields }] });
        self.send_json(self.client.patch(&self.table_url).json(&payload), "update record")
            .await?;
        tracing::info!(record_id, field_count, "record updated");
        Ok(())
    }

    fn field_map(&self) -> &FieldMap {
        &self.fields
    }
}
