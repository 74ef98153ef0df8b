use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};
use markit_agents::{ChatReply, ChatStart, ChatStatus, SessionNotFound};
use markit_core::Email;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ChatStartBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatSendBody {
    pub session_id: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatStatusQuery {
    pub session_id: String,
}

fn parse_email(request_id: &str, raw: &str) -> Result<Email, ApiError> {
    Email::parse(raw).map_err(|e| ApiError::invalid_request(request_id, e.to_string()))
}

fn session_not_found(request_id: &str, error: &SessionNotFound) -> ApiError {
    ApiError::new(request_id, "not_found", error.to_string())
}

pub(super) async fn start_chat(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<ChatStartBody>, JsonRejection>,
) -> Result<Json<ApiResponse<ChatStart>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid_request(&req_id.0, e.body_text()))?;
    let email = parse_email(&req_id.0, &body.email)?;

    let started = state.chat.start(&email).await;
    Ok(Json(ApiResponse::new(started)))
}

/// Unknown or expired sessions are a 404 and leave every transcript as is.
pub(super) async fn send_chat(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<ChatSendBody>, JsonRejection>,
) -> Result<Json<ApiResponse<ChatReply>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid_request(&req_id.0, e.body_text()))?;
    let email = parse_email(&req_id.0, &body.email)?;

    let reply = state
        .chat
        .send(&body.session_id, &email, &body.message)
        .await
        .map_err(|e| session_not_found(&req_id.0, &e))?;
    Ok(Json(ApiResponse::new(reply)))
}

pub(super) async fn chat_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<ChatStatusQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<ChatStatus>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_request(&req_id.0, e.body_text()))?;

    let status = state
        .chat
        .status(&query.session_id)
        .await
        .map_err(|e| session_not_found(&req_id.0, &e))?;
    Ok(Json(ApiResponse::new(status)))
}
