//! The brief pipeline: find or create the prospect's record, generate the
//! brief, persist its fields, then run and persist the fan-out.

use std::sync::Arc;

use markit_airtable::{FieldMap, PersistenceError, Record, RecordStore};
use markit_core::{Email, PromptSet};
use markit_llm::{extract, InvokeOptions, ParsedOutput, Provider, ProviderError};
use serde::Serialize;
use thiserror::Error;

use crate::fanout::{run_all, FanOutResult, FanOutTask};

/// Failures on the primary brief path.
#[derive(Debug, Error)]
pub enum BriefError {
    #[error("brief generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("brief persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// What happened on the datastore side of a brief request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AirtableStatus {
    pub enabled: bool,
    pub checked: bool,
    pub existing_record_id: Option<String>,
    pub created_record_id: Option<String>,
    pub updated: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    /// The brief, when the model's output parsed as JSON.
    pub data: Option<serde_json::Value>,
    /// The model's output text as returned.
    pub raw: Option<String>,
    pub record_id: Option<String>,
    pub fanout: FanOutResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BriefOutcome {
    /// A record already existed; nothing was generated.
    Existing {
        record: Record,
        airtable: AirtableStatus,
    },
    /// Generated inline.
    Created {
        email: String,
        result: GenerationResult,
        airtable: AirtableStatus,
    },
    /// Generation scheduled on a background task.
    Queued {
        email: String,
        record_id: Option<String>,
        airtable: AirtableStatus,
    },
}

#[derive(Clone)]
pub struct BriefService {
    provider: Arc<dyn Provider>,
    store: Option<Arc<dyn RecordStore>>,
    prompts: Arc<PromptSet>,
}

impl BriefService {
    /// `store` is `None` when the datastore is not configured; briefs are
    /// then generated but not persisted.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Option<Arc<dyn RecordStore>>,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            provider,
            store,
            prompts,
        }
    }

    /// Handle one brief request.
    ///
    /// An existing record short-circuits. Otherwise a record is created and
    /// the brief is generated inline (`wait`) or on a detached task.
    /// Find/create failures are recorded in the returned status and
    /// generation continues without a record.
    ///
    /// # Errors
    ///
    /// Returns [`BriefError`] when inline generation or the brief update
    /// fails.
    pub async fn handle(&self, email: &Email, wait: bool) -> Result<BriefOutcome, BriefError> {
        let mut airtable = AirtableStatus {
            enabled: self.store.is_some(),
            ..AirtableStatus::default()
        };
        let mut record_id = None;

        if let Some(store) = &self.store {
            match store.find_by_identity(email.as_str()).await {
                Ok(Some(record)) => {
                    tracing::info!(email = %email, record_id = %record.id, "brief already exists");
                    airtable.checked = true;
                    airtable.existing_record_id = Some(record.id.clone());
                    return Ok(BriefOutcome::Existing { record, airtable });
                }
                Ok(None) => {
                    airtable.checked = true;
                    match store.create(email.as_str()).await {
                        Ok(record) => {
                            airtable.created_record_id = Some(record.id.clone());
                            record_id = Some(record.id);
                        }
                        Err(e) => {
                            tracing::warn!(email = %email, error = %e, "record create failed, continuing without record");
                            airtable.error = Some(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "record lookup failed, continuing without record");
                    airtable.error = Some(e.to_string());
                }
            }
        }

        if wait {
            let result = self
                .run_generation_and_update(email, record_id.as_deref())
                .await?;
            airtable.updated = result.record_id.is_some();
            return Ok(BriefOutcome::Created {
                email: email.to_string(),
                result,
                airtable,
            });
        }

        let service = self.clone();
        let background_email = email.clone();
        let background_record = record_id.clone();
        tokio::spawn(async move {
            if let Err(e) = service
                .run_generation_and_update(&background_email, background_record.as_deref())
                .await
            {
                tracing::error!(
                    email = %background_email,
                    record_id = ?background_record,
                    error = %e,
                    "background brief generation failed"
                );
            }
        });
        tracing::info!(email = %email, record_id = ?record_id, "brief generation queued");

        Ok(BriefOutcome::Queued {
            email: email.to_string(),
            record_id,
            airtable,
        })
    }

    /// Generate the brief for `email`, write its fields to `record_id`, then
    /// run the fan-out and store its aggregate (best-effort).
    ///
    /// # Errors
    ///
    /// Returns [`BriefError`] if generation or the brief update fails.
    pub async fn run_generation_and_update(
        &self,
        email: &Email,
        record_id: Option<&str>,
    ) -> Result<GenerationResult, BriefError> {
        let response = self
            .provider
            .invoke(
                &self.prompts.brief.instructions,
                email.as_str(),
                &InvokeOptions::research(),
            )
            .await?;
        let parsed = extract(response.output_text.as_deref());
        tracing::info!(
            email = %email,
            structured = parsed.is_structured(),
            "brief generated"
        );

        let store = self.store.as_ref().zip(record_id);
        if let Some((store, record_id)) = store {
            let fields = brief_fields(&parsed, store.field_map());
            store.update(record_id, fields).await?;
        }

        let tasks = FanOutTask::from_prompts(&self.prompts);
        let fanout = run_all(Arc::clone(&self.provider), email.as_str(), &tasks).await;

        if let Some((store, record_id)) = store {
            save_fanout(store.as_ref(), record_id, &fanout).await;
        }

        Ok(GenerationResult {
            data: parsed.as_structured().cloned(),
            raw: response.output_text,
            record_id: record_id.map(str::to_string),
            fanout,
        })
    }
}

async fn save_fanout(store: &dyn RecordStore, record_id: &str, fanout: &FanOutResult) {
    let serialized = match serde_json::to_string(fanout) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(record_id, error = %e, "fan-out serialization failed");
            return;
        }
    };
    let mut fields = serde_json::Map::new();
    fields.insert(
        store.field_map().orchestration.clone(),
        serde_json::Value::String(serialized),
    );
    if let Err(e) = store.update(record_id, fields).await {
        tracing::warn!(
            record_id,
            retryable = e.is_retryable(),
            error = %e,
            "fan-out save failed"
        );
    }
}

/// Datastore fields for a generated brief.
///
/// The full response is always written. Summary fields are written only when
/// the brief is a JSON object and the value is present and non-empty.
#[must_use]
pub fn brief_fields(
    parsed: &ParsedOutput,
    fields: &FieldMap,
) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    let full_response = match parsed {
        ParsedOutput::Structured(value) => value.to_string(),
        ParsedOutput::Raw(text) => text.clone().unwrap_or_default(),
    };
    out.insert(
        fields.full_response.clone(),
        serde_json::Value::String(full_response),
    );

    let Some(brief) = parsed.as_structured().and_then(serde_json::Value::as_object) else {
        return out;
    };

    let general_info = brief
        .get("general_info")
        .and_then(serde_json::Value::as_object);
    let mut put = |key: &str, value: Option<&serde_json::Value>| {
        if let Some(text) = value.and_then(field_text) {
            out.insert(key.to_string(), serde_json::Value::String(text));
        }
    };
    put(
        &fields.business_name,
        general_info.and_then(|gi| gi.get("business_name")),
    );
    put(
        &fields.one_liner,
        general_info.and_then(|gi| gi.get("one_liner")),
    );
    put(&fields.icp, brief.get("icp"));

    if let Some(keywords) = brief
        .get("topics_keywords")
        .and_then(serde_json::Value::as_array)
    {
        let joined = keywords
            .iter()
            .map(|k| k.as_str().map_or_else(|| k.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(fields.keywords.clone(), serde_json::Value::String(joined));
    }
    out
}

/// Text for a summary field; `None` for null, false, or empty values.
fn field_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(a) if a.is_empty() => None,
        serde_json::Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_brief_maps_summary_fields() {
        let parsed = ParsedOutput::Structured(json!({
            "general_info": {"business_name": "Acme", "one_liner": "Rockets for roadrunners", "website": "acme.io"},
            "icp": "Coyotes with budget",
            "topics_keywords": ["rockets", "desert", "speed"]
        }));
        let fields = brief_fields(&parsed, &FieldMap::default());

        assert_eq!(fields["fldsrAZbfzPGLP6F8"], "Acme");
        assert_eq!(fields["fldkI28kyg7gaiz2g"], "Rockets for roadrunners");
        assert_eq!(fields["flda7vhrHp4CuyxdC"], "Coyotes with budget");
        assert_eq!(fields["fldwRfzjs6xt5Vqit"], "rockets, desert, speed");
        let full: serde_json::Value =
            serde_json::from_str(fields["fldNLJlEqVwvOg100"].as_str().expect("string"))
                .expect("full response is JSON");
        assert_eq!(full["general_info"]["website"], "acme.io");
    }

    #[test]
    fn empty_or_null_summary_values_are_skipped() {
        let parsed = ParsedOutput::Structured(json!({
            "general_info": {"business_name": "", "one_liner": null},
            "icp": null
        }));
        let fields = brief_fields(&parsed, &FieldMap::default());
        assert_eq!(fields.len(), 1, "only the full response: {fields:?}");
    }

    #[test]
    fn raw_output_writes_only_full_response() {
        let parsed = ParsedOutput::Raw(Some("I could not find that company.".to_string()));
        let fields = brief_fields(&parsed, &FieldMap::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["fldNLJlEqVwvOg100"], "I could not find that company.");

        let fields = brief_fields(&ParsedOutput::Raw(None), &FieldMap::default());
        assert_eq!(fields["fldNLJlEqVwvOg100"], "");
    }

    #[test]
    fn literal_null_brief_is_stored_as_null_text() {
        let fields = brief_fields(&ParsedOutput::Structured(json!(null)), &FieldMap::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["fldNLJlEqVwvOg100"], "null");
    }

    #[test]
    fn non_string_keywords_are_stringified() {
        let parsed = ParsedOutput::Structured(json!({"topics_keywords": ["ai", 42]}));
        let fields = brief_fields(&parsed, &FieldMap::default());
        assert_eq!(fields["fldwRfzjs6xt5Vqit"], "ai, 42");
    }
}
