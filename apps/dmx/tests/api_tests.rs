//! Integration tests for the DMX HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use dmx::api::{AppState, ErrorResponse, HealthResponse, StatusResponse, create_router};
use dmx_core::{CoreService, StorageBackend};
use serde_json::{Value, json};

const NAME: &str = "dmx.contacts.name";
const PHONE: &str = "dmx.contacts.phone";
const PERSON: &str = "dmx.contacts.person";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a test server over a fresh in-memory core.
fn create_test_server() -> TestServer {
    let core = CoreService::new(StorageBackend::default()).unwrap();
    let router = create_router(AppState::new(core), &[]);
    TestServer::new(router).unwrap()
}

/// Create a test server with the contacts types installed.
async fn create_contacts_server() -> TestServer {
    let server = create_test_server();
    for body in [
        json!({ "uri": NAME, "value": "Name", "dataTypeUri": "dmx.core.value" }),
        json!({ "uri": PHONE, "value": "Phone", "dataTypeUri": "dmx.core.value" }),
        json!({
            "uri": PERSON,
            "value": "Person",
            "dataTypeUri": "dmx.core.identity",
            "compDefs": [
                { "childTypeUri": NAME, "childCardinalityUri": "dmx.core.one", "includeInLabel": true },
                { "childTypeUri": PHONE, "childCardinalityUri": "dmx.core.many", "includeInLabel": true }
            ]
        }),
    ] {
        server.post("/core/type").json(&body).await.assert_status(StatusCode::CREATED);
    }
    server
}

async fn create_alice(server: &TestServer) -> u64 {
    let response = server
        .post("/core/topic")
        .json(&json!({
            "typeUri": PERSON,
            "childs": { NAME: "Alice", PHONE: ["123", "456"] }
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let topic: Value = response.json();
    assert_eq!(topic["value"], "Alice 123, 456");
    topic["id"].as_u64().unwrap()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_counts_bootstrap_types() {
    let server = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert!(status.topic_count > 0, "type topics are topics");
    assert!(status.topic_type_count >= 3);
    assert!(status.assoc_type_count >= 5);
    assert_eq!(status.connections, 0);
}

// =============================================================================
// ERRORS
// =============================================================================

#[tokio::test]
async fn test_missing_topic_is_404() {
    let server = create_test_server();

    let response = server.get("/core/topic/999999").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "NotFound");
    assert!(!error.message.is_empty());
}

#[tokio::test]
async fn test_type_without_uri_is_422() {
    let server = create_test_server();

    let response = server.post("/core/type").json(&json!({ "value": "Nameless" })).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_type_topic_cannot_be_created_directly() {
    let server = create_test_server();

    let response = server
        .post("/core/topic")
        .json(&json!({ "typeUri": "dmx.core.topic_type", "value": "Sneaky" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_wrong_kind_type_lookup_is_400() {
    let server = create_contacts_server().await;

    server.get(&format!("/core/assoc_type/{}", PERSON)).await.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// TYPES
// =============================================================================

#[tokio::test]
async fn test_topic_type_lists_comp_defs_in_order() {
    let server = create_contacts_server().await;

    let response = server.get(&format!("/core/topic_type/{}", PERSON)).await;

    response.assert_status_ok();
    let person: Value = response.json();
    assert_eq!(person["uri"], PERSON);
    assert_eq!(person["dataTypeUri"], "dmx.core.identity");
    let children: Vec<&str> = person["compDefs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|cd| cd["childTypeUri"].as_str().unwrap())
        .collect();
    assert_eq!(children, [NAME, PHONE]);
}

// =============================================================================
// TOPICS
// =============================================================================

#[tokio::test]
async fn test_create_and_fetch_composite() {
    let server = create_contacts_server().await;
    let id = create_alice(&server).await;

    let shallow: Value = server.get(&format!("/core/topic/{}", id)).await.json();
    assert_eq!(shallow["value"], "Alice 123, 456");
    assert!(shallow["childs"].as_object().unwrap().is_empty());

    let deep: Value = server.get(&format!("/core/topic/{}?children=true", id)).await.json();
    assert_eq!(deep["childs"][NAME]["value"], "Alice");
    assert_eq!(deep["childs"][NAME]["assoc"]["typeUri"], "dmx.core.composition");
    let phones: Vec<&str> = deep["childs"][PHONE]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].as_str().unwrap())
        .collect();
    assert_eq!(phones, ["123", "456"]);
}

#[tokio::test]
async fn test_update_replaces_child_and_relabels() {
    let server = create_contacts_server().await;
    let id = create_alice(&server).await;

    let response = server
        .put(&format!("/core/topic/{}", id))
        .json(&json!({ "typeUri": PERSON, "childs": { NAME: "Bob" } }))
        .await;

    response.assert_status_ok();
    let stored: Value = server.get(&format!("/core/topic/{}", id)).await.json();
    assert_eq!(stored["value"], "Bob 123, 456");
}

#[tokio::test]
async fn test_update_with_mismatched_id_is_409() {
    let server = create_contacts_server().await;
    let id = create_alice(&server).await;

    let response = server
        .put(&format!("/core/topic/{}", id))
        .json(&json!({ "id": id + 1000, "typeUri": PERSON, "childs": { NAME: "Bob" } }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_topic() {
    let server = create_contacts_server().await;
    let id = create_alice(&server).await;

    server.delete(&format!("/core/topic/{}", id)).await.assert_status_ok();

    server.get(&format!("/core/topic/{}", id)).await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_topics_by_type() {
    let server = create_contacts_server().await;
    create_alice(&server).await;

    let phones: Value = server.get(&format!("/core/topics/type/{}", PHONE)).await.json();

    assert_eq!(phones.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_related_topics_with_filter() {
    let server = create_contacts_server().await;
    let id = create_alice(&server).await;

    let response = server
        .get(&format!(
            "/core/topic/{}/related_topics?assoc_type=dmx.core.composition&my_role=dmx.core.parent&others_role=dmx.core.child",
            id
        ))
        .await;

    response.assert_status_ok();
    let related: Value = response.json();
    let values: Vec<&str> = related
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, ["Alice", "123", "456"]);
    assert!(related[0]["assoc"]["id"].as_i64().unwrap() >= 0);
}
