//! Integration tests for `AirtableClient` using wiremock HTTP mocks.

use markit_airtable::{AirtableClient, PersistenceError, RecordStore};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE_PATH: &str = "/appXYZ/OAI%20Hackathon";

fn test_client(base_url: &str) -> AirtableClient {
    AirtableClient::with_base_url("pat-test", "appXYZ", "OAI Hackathon", 30, base_url)
        .expect("client construction should not fail")
}

#[tokio::test]
async fn find_by_identity_uses_name_formula_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("authorization", "Bearer pat-test"))
        .and(query_param("maxRecords", "1"))
        .and(query_param("filterByFormula", "LOWER({Email})='founder@acme.io'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{
                "id": "recA1",
                "createdTime": "2025-08-01T00:00:00.000Z",
                "fields": {"Email": "founder@acme.io", "Full Response": "{}"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = test_client(&server.uri())
        .find_by_identity("Founder@Acme.io")
        .await
        .expect("find")
        .expect("record present");
    assert_eq!(record.id, "recA1");
    assert_eq!(record.fields["Email"], "founder@acme.io");
}

#[tokio::test]
async fn find_by_identity_falls_back_to_field_id_formula() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("filterByFormula", "LOWER({Email})='founder@acme.io'"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "error": {"type": "INVALID_FILTER_BY_FORMULA", "message": "Unknown field names: email"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("filterByFormula", "LOWER({fldXhVuckpHBhWJOX})='founder@acme.io'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{"id": "recB2", "fields": {}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = test_client(&server.uri())
        .find_by_identity("founder@acme.io")
        .await
        .expect("find");
    assert_eq!(record.map(|r| r.id).as_deref(), Some("recB2"));
}

#[tokio::test]
async fn find_by_identity_returns_none_when_nothing_matches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": []})))
        .expect(2)
        .mount(&server)
        .await;

    let found = test_client(&server.uri())
        .find_by_identity("nobody@acme.io")
        .await
        .expect("find");
    assert!(found.is_none());
}

#[tokio::test]
async fn find_by_identity_surfaces_error_when_every_formula_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(2)
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .find_by_identity("founder@acme.io")
        .await
        .expect_err("lookup outage must not read as no match");
    assert!(matches!(err, PersistenceError::Status { status: 429, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn find_by_identity_is_none_when_one_formula_answers_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("filterByFormula", "LOWER({Email})='founder@acme.io'"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown field"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("filterByFormula", "LOWER({fldXhVuckpHBhWJOX})='founder@acme.io'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": []})))
        .expect(1)
        .mount(&server)
        .await;

    let found = test_client(&server.uri())
        .find_by_identity("founder@acme.io")
        .await
        .expect("second formula answered");
    assert!(found.is_none());
}

#[tokio::test]
async fn create_posts_identity_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .and(body_json(serde_json::json!({
            "records": [{"fields": {"fldXhVuckpHBhWJOX": "founder@acme.io"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{"id": "recNew", "createdTime": "2025-08-01T00:00:00.000Z",
                         "fields": {"Email": "founder@acme.io"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = test_client(&server.uri())
        .create("founder@acme.io")
        .await
        .expect("create");
    assert_eq!(record.id, "recNew");
}

#[tokio::test]
async fn create_with_empty_response_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": []})))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .create("founder@acme.io")
        .await
        .expect_err("no records");
    assert!(matches!(err, PersistenceError::Unexpected(_)));
}

#[tokio::test]
async fn update_patches_record_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .and(body_json(serde_json::json!({
            "records": [{"id": "recA1", "fields": {"fldsrAZbfzPGLP6F8": "Acme"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{"id": "recA1", "fields": {"fldsrAZbfzPGLP6F8": "Acme"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut fields = serde_json::Map::new();
    fields.insert("fldsrAZbfzPGLP6F8".to_string(), serde_json::json!("Acme"));
    test_client(&server.uri())
        .update("recA1", fields)
        .await
        .expect("update");
}

#[tokio::test]
async fn update_rate_limit_is_retryable_status() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("RATE_LIMIT_REACHED"))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .update("recA1", serde_json::Map::new())
        .await
        .expect_err("429");
    assert!(matches!(err, PersistenceError::Status { status: 429, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn update_validation_error_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "error": {"type": "INVALID_VALUE_FOR_COLUMN"}
        })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .update("recA1", serde_json::Map::new())
        .await
        .expect_err("422");
    assert!(!err.is_retryable());
}
