use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request};
use markit_agents::{ChatOrchestrator, InMemorySessionStore, SessionStore};
use markit_airtable::{FieldMap, PersistenceError, Record, RecordStore};
use markit_core::PromptSet;
use markit_llm::{InvokeOptions, Provider, ProviderError, ProviderResponse};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;

const BRIEF_JSON: &str = r#"{"general_info":{"business_name":"Acme","one_liner":"Rockets","website":"acme.io"},"icp":"Coyotes","topics_keywords":["rockets","desert"]}"#;
const GREETING: &str = "Hey! Mark here, ready to plan the Acme launch.";

type Fields = serde_json::Map<String, Value>;

fn prompts() -> Arc<PromptSet> {
    let yaml = std::fs::read_to_string(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../config/prompts.yaml"
    ))
    .expect("prompts file");
    Arc::new(PromptSet::from_yaml_str(&yaml).expect("valid prompts"))
}

/// Brief prompt → `brief`, fan-out prompts → small JSON, anything else (chat)
/// → a fixed greeting.
struct FakeProvider {
    prompts: Arc<PromptSet>,
    brief: Result<&'static str, &'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl Provider for FakeProvider {
    async fn invoke(
        &self,
        instructions: &str,
        _user_text: &str,
        _options: &InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = if instructions == self.prompts.brief.instructions {
            self.brief.map_err(|e| ProviderError::Outage {
                status: 503,
                body: e.to_string(),
            })?
        } else if self
            .prompts
            .fanout
            .iter()
            .any(|task| task.instructions == instructions)
        {
            r#"{"ok":true}"#
        } else {
            GREETING
        };
        Ok(ProviderResponse {
            output_text: Some(text.to_string()),
            raw: json!({}),
        })
    }
}

#[derive(Default)]
struct FakeStore {
    existing: Option<Record>,
    updates: Mutex<Vec<(String, Fields)>>,
    fields: FieldMap,
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn find_by_identity(&self, _identity: &str) -> Result<Option<Record>, PersistenceError> {
        Ok(self.existing.clone())
    }

    async fn create(&self, _identity: &str) -> Result<Record, PersistenceError> {
        Ok(Record {
            id: "recNew".to_string(),
            fields: Fields::new(),
            created_time: None,
        })
    }

    async fn update(&self, record_id: &str, fields: Fields) -> Result<(), PersistenceError> {
        self.updates
            .lock()
            .expect("lock")
            .push((record_id.to_string(), fields));
        Ok(())
    }

    fn field_map(&self) -> &FieldMap {
        &self.fields
    }
}

struct Harness {
    app: Router,
    provider: Arc<FakeProvider>,
    store: Arc<FakeStore>,
    sessions: Arc<InMemorySessionStore>,
}

fn harness_with(
    brief: Result<&'static str, &'static str>,
    store: FakeStore,
    auth: AuthState,
    rate_limit: RateLimitState,
) -> Harness {
    let prompts = prompts();
    let provider = Arc::new(FakeProvider {
        prompts: Arc::clone(&prompts),
        brief,
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(store);
    let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));

    let dyn_provider: Arc<dyn Provider> = provider.clone();
    let dyn_store: Arc<dyn RecordStore> = store.clone();
    let dyn_sessions: Arc<dyn SessionStore> = sessions.clone();
    let orchestrator = Arc::new(ChatOrchestrator::standard(
        Arc::clone(&dyn_provider),
        Arc::clone(&prompts),
        None,
    ));
    let state = AppState {
        brief: BriefService::new(dyn_provider, Some(Arc::clone(&dyn_store)), Arc::clone(&prompts)),
        chat: ChatService::new(orchestrator, dyn_sessions, Some(dyn_store), prompts),
    };

    Harness {
        app: build_app(state, auth, rate_limit),
        provider,
        store,
        sessions,
    }
}

fn harness() -> Harness {
    harness_with(
        Ok(BRIEF_JSON),
        FakeStore::default(),
        AuthState::disabled(),
        default_rate_limit_state(),
    )
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json parse")
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("invalid_request", StatusCode::BAD_REQUEST),
        ("unauthorized", StatusCode::UNAUTHORIZED),
        ("not_found", StatusCode::NOT_FOUND),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("upstream_error", StatusCode::BAD_GATEWAY),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "boom").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[tokio::test]
async fn health_is_ok_and_echoes_request_id() {
    let h = harness();
    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("x-request-id", "req-health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-health")
    );
    assert_eq!(body_json(response).await, json!({"ok": true, "status": "ok"}));
}

#[tokio::test]
async fn brief_for_new_prospect_is_created_and_persisted() {
    let h = harness();
    let response = h
        .app
        .oneshot(post_json("/api/brief", &json!({"email": "Founder@Acme.io"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["mode"], "created");
    assert_eq!(json["email"], "Founder@Acme.io");
    assert_eq!(json["record_id"], "recNew");
    assert_eq!(json["data"]["general_info"]["business_name"], "Acme");
    assert_eq!(json["raw"], BRIEF_JSON);
    assert_eq!(json["airtable"]["enabled"], true);
    assert_eq!(json["airtable"]["created_record_id"], "recNew");
    assert_eq!(json["airtable"]["updated"], true);
    assert_eq!(
        json["fanout"].as_object().map(|o| o.len()),
        Some(4),
        "every fan-out task is reported"
    );

    let updates = h.store.updates.lock().expect("lock").clone();
    assert_eq!(updates.len(), 2, "brief fields then fan-out aggregate");
    assert_eq!(updates[0].1["fldsrAZbfzPGLP6F8"], "Acme");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn brief_for_known_prospect_returns_existing_record() {
    let store = FakeStore {
        existing: Some(Record {
            id: "recOld".to_string(),
            fields: json!({"Email": "founder@acme.io", "Business Name": "Acme"})
                .as_object()
                .cloned()
                .expect("object"),
            created_time: Some("2024-05-01T00:00:00.000Z".to_string()),
        }),
        ..FakeStore::default()
    };
    let h = harness_with(
        Ok(BRIEF_JSON),
        store,
        AuthState::disabled(),
        default_rate_limit_state(),
    );

    let response = h
        .app
        .oneshot(post_json("/api/brief", &json!({"email": "founder@acme.io"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["mode"], "existing");
    assert_eq!(json["record_id"], "recOld");
    assert_eq!(json["fields"]["Business Name"], "Acme");
    assert_eq!(json["airtable"]["existing_record_id"], "recOld");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn brief_without_wait_is_queued() {
    let h = harness();
    let response = h
        .app
        .oneshot(post_json(
            "/api/brief?wait=false",
            &json!({"email": "founder@acme.io"}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["mode"], "queued");
    assert_eq!(json["record_id"], "recNew");
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn brief_with_invalid_email_is_rejected() {
    let h = harness();
    let response = h
        .app
        .oneshot(post_json("/api/brief", &json!({"email": "not-an-email"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "invalid_request");
    assert!(json["meta"]["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(json["meta"]["timestamp"].is_string());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn brief_with_malformed_body_is_rejected() {
    let h = harness();
    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/brief")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{\"email\":"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn brief_provider_failure_is_upstream_error() {
    let h = harness_with(
        Err("overloaded"),
        FakeStore::default(),
        AuthState::disabled(),
        default_rate_limit_state(),
    );
    let response = h
        .app
        .oneshot(post_json("/api/brief", &json!({"email": "founder@acme.io"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn chat_start_send_and_status() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(post_json("/api/chat/start", &json!({"email": "founder@acme.io"})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let started = body_json(response).await;
    assert_eq!(started["ok"], true);
    assert_eq!(started["agent_ready"], true);
    assert_eq!(started["first_reply"], GREETING);
    let session_id = started["session_id"].as_str().expect("session id").to_string();
    assert_eq!(session_id.len(), 32);

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/api/chat/send",
            &json!({"session_id": session_id, "email": "founder@acme.io", "message": "Find me PR leads"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let sent = body_json(response).await;
    assert_eq!(sent["reply"], GREETING);
    assert_eq!(sent["meta"]["_debug"]["email"], "founder@acme.io");
    assert_eq!(
        sent["meta"]["_debug"]["history"]
            .as_array()
            .and_then(|h| h.last())
            .map(|t| t["content"].clone()),
        Some(json!("Find me PR leads"))
    );

    let response = h
        .app
        .oneshot(get_request(&format!("/api/chat/status?session_id={session_id}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["session_id"], session_id.as_str());
    assert_eq!(status["last_assistant"], GREETING);
    let roles: Vec<&str> = status["history"]
        .as_array()
        .expect("history")
        .iter()
        .filter_map(|t| t["role"].as_str())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
}

#[tokio::test]
async fn chat_send_to_unknown_session_is_not_found() {
    let h = harness();
    let response = h
        .app
        .oneshot(post_json(
            "/api/chat/send",
            &json!({"session_id": "deadbeef", "email": "founder@acme.io", "message": "hi"}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "not_found");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    assert!(h.sessions.is_empty().await);
}

#[tokio::test]
async fn chat_status_requires_session_id() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/chat/status"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .app
        .oneshot(get_request("/api/chat/status?session_id=missing"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bearer_auth_guards_api_routes_but_not_health() {
    let h = harness_with(
        Ok(BRIEF_JSON),
        FakeStore::default(),
        AuthState::from_keys("secret-token", false).expect("auth"),
        default_rate_limit_state(),
    );

    let response = h
        .app
        .clone()
        .oneshot(get_request("/api/chat/status?session_id=x"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "unauthorized");

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/chat/status?session_id=x")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h.app.oneshot(get_request("/api/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_requests_over_the_window() {
    let h = harness_with(
        Ok(BRIEF_JSON),
        FakeStore::default(),
        AuthState::disabled(),
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let first = h
        .app
        .clone()
        .oneshot(get_request("/api/chat/status?session_id=x"))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = h
        .app
        .oneshot(get_request("/api/chat/status?session_id=x"))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(second).await["error"]["code"], "rate_limited");
}
