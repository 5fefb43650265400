use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::util::ServiceExt;

use manual_hub::api;
use manual_hub_core::auth::{Hs256Verifier, TokenVerifier};
use manual_hub_core::events::EventBus;
use manual_hub_core::storage::HubStore;

struct TestApp {
    app: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RwLock::new(HubStore::new(dir.path()).unwrap()));
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(Hs256Verifier::new("test-secret".to_string()));
        let app = api::router(store, EventBus::new(), verifier);
        Self { app, _dir: dir }
    }

    async fn request(
        &self,
        user: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        let request = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Create workspace → category → document as `owner`, returning their ids.
    async fn seed_document(&self, owner: &str) -> (String, String, String) {
        let (status, ws) = self
            .request(
                Some(owner),
                Method::POST,
                "/workspaces",
                Some(json!({"name": "Handbook"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let ws_id = ws["id"].as_str().unwrap().to_string();

        let (status, cat) = self
            .request(
                Some(owner),
                Method::POST,
                &format!("/workspaces/{ws_id}/categories"),
                Some(json!({"name": "Guides"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let cat_id = cat["id"].as_str().unwrap().to_string();

        let (status, doc) = self
            .request(
                Some(owner),
                Method::POST,
                &format!("/categories/{cat_id}/documents"),
                Some(json!({"title": "Intro"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let doc_id = doc["id"].as_str().unwrap().to_string();

        (ws_id, cat_id, doc_id)
    }
}

fn text_block(content: &str) -> Value {
    json!({"block_type": "text", "content": content})
}

#[tokio::test]
async fn save_version_and_restore_round_trip() {
    let app = TestApp::new();
    let (_ws, _cat, doc) = app.seed_document("alice").await;

    let (status, _) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({"blocks": [text_block("A")]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, saved) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({
                "blocks": [text_block("A"), text_block("B")],
                "create_version": true
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(saved["blocks"][0]["sort_order"], 1);
    assert_eq!(saved["blocks"][1]["sort_order"], 2);

    let (status, saved) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({"blocks": [text_block("C")], "create_version": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["blocks"].as_array().unwrap().len(), 1);

    let (status, versions) = app
        .request(
            Some("alice"),
            Method::GET,
            &format!("/documents/{doc}/versions"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let versions = versions.as_array().unwrap().clone();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["number"], 2);
    assert_eq!(versions[1]["number"], 1);
    let v1 = versions[1]["id"].as_str().unwrap().to_string();

    let (status, resp) = app
        .request(
            Some("alice"),
            Method::POST,
            &format!("/documents/{doc}/restore/{v1}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["message"], "restored version 1");

    let (status, doc_resp) = app
        .request(Some("alice"), Method::GET, &format!("/documents/{doc}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let blocks = doc_resp["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["content"], "A");
    assert_eq!(blocks[0]["sort_order"], 1);
}

#[tokio::test]
async fn role_thresholds_are_enforced() {
    let app = TestApp::new();
    let (ws, _cat, doc) = app.seed_document("alice").await;

    for (user, role) in [("wendy", "writer"), ("vera", "viewer")] {
        let (status, _) = app
            .request(
                Some("alice"),
                Method::PUT,
                &format!("/workspaces/{ws}/members"),
                Some(json!({"user": user, "role": role})),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    // Viewers can read but not write.
    let (status, _) = app
        .request(Some("vera"), Method::GET, &format!("/documents/{doc}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .request(
            Some("vera"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({"blocks": [text_block("x")]})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Writers can write blocks but not manage members.
    let (status, _) = app
        .request(
            Some("wendy"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({"blocks": [text_block("x")]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .request(
            Some("wendy"),
            Method::PUT,
            &format!("/workspaces/{ws}/members"),
            Some(json!({"user": "eve", "role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Strangers see 403, not content.
    let (status, _) = app
        .request(Some("mallory"), Method::GET, &format!("/documents/{doc}"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Owner role is implicit and cannot be granted.
    let (status, _) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/workspaces/{ws}/members"),
            Some(json!({"user": "eve", "role": "owner"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/workspaces/{ws}/members"),
            Some(json!({"user": "eve", "role": "superuser"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Requests without any identity are rejected outright.
    let (status, _) = app
        .request(None, Method::GET, &format!("/documents/{doc}"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_and_not_found_failures() {
    let app = TestApp::new();
    let (_ws, cat, doc) = app.seed_document("alice").await;

    let (status, _) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/documents/{doc}/blocks"),
            Some(json!({"blocks": [{"block_type": "hologram", "content": "x"}]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = app
        .request(Some("alice"), Method::GET, &format!("/documents/{missing}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A version belonging to another document reads as not-found.
    let (status, other) = app
        .request(
            Some("alice"),
            Method::POST,
            &format!("/categories/{cat}/documents"),
            Some(json!({"title": "Other"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let other_id = other["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .request(
            Some("alice"),
            Method::PUT,
            &format!("/documents/{other_id}/blocks"),
            Some(json!({"blocks": [text_block("z")], "create_version": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, versions) = app
        .request(
            Some("alice"),
            Method::GET,
            &format!("/documents/{other_id}/versions"),
            None,
        )
        .await;
    let foreign = versions[0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Some("alice"),
            Method::POST,
            &format!("/documents/{doc}/restore/{foreign}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
