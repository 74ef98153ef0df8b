use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use markit_agents::{AirtableStatus, BriefError, BriefOutcome, FanOutResult};
use markit_core::Email;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct BriefQuery {
    pub wait: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BriefBody {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub(super) enum BriefResponse {
    Existing {
        record_id: String,
        fields: serde_json::Map<String, serde_json::Value>,
        airtable: AirtableStatus,
    },
    Created {
        email: String,
        record_id: Option<String>,
        data: Option<serde_json::Value>,
        raw: Option<String>,
        fanout: FanOutResult,
        airtable: AirtableStatus,
    },
    Queued {
        email: String,
        record_id: Option<String>,
        airtable: AirtableStatus,
    },
}

impl From<BriefOutcome> for BriefResponse {
    fn from(outcome: BriefOutcome) -> Self {
        match outcome {
            BriefOutcome::Existing { record, airtable } => Self::Existing {
                record_id: record.id,
                fields: record.fields,
                airtable,
            },
            BriefOutcome::Created {
                email,
                result,
                airtable,
            } => Self::Created {
                email,
                record_id: result.record_id,
                data: result.data,
                raw: result.raw,
                fanout: result.fanout,
                airtable,
            },
            BriefOutcome::Queued {
                email,
                record_id,
                airtable,
            } => Self::Queued {
                email,
                record_id,
                airtable,
            },
        }
    }
}

/// `POST /api/brief?wait=true|false`. `wait` defaults to true.
pub(super) async fn create_brief(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<BriefQuery>, QueryRejection>,
    body: Result<Json<BriefBody>, JsonRejection>,
) -> Result<Json<ApiResponse<BriefResponse>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_request(&req_id.0, e.body_text()))?;
    let Json(body) = body.map_err(|e| ApiError::invalid_request(&req_id.0, e.body_text()))?;
    let email =
        Email::parse(&body.email).map_err(|e| ApiError::invalid_request(&req_id.0, e.to_string()))?;

    let outcome = state
        .brief
        .handle(&email, query.wait.unwrap_or(true))
        .await
        .map_err(|e| map_brief_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(outcome.into())))
}

fn map_brief_error(request_id: String, error: &BriefError) -> ApiError {
    tracing::error!(error = %error, "brief request failed");
    ApiError::new(request_id, "upstream_error", error.to_string())
}
