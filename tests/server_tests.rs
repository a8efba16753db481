use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use keyword_scan::fetcher::{FetchError, PageSource};
use keyword_scan::registry::ScanRegistry;
use keyword_scan::scanner::{ScanService, ScanWorker};
use keyword_scan::server::{create_app, AppState, ScanAccepted};
use keyword_scan::store::MemoryStore;
use keyword_scan::types::{ScanRecord, ScanStatus, ScanSummary};
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot`

struct StaticPages(HashMap<&'static str, &'static str>);

#[async_trait]
impl PageSource for StaticPages {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.0
            .get(url)
            .map(|page| page.to_string())
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                strategy: "polite".into(),
                status: 503,
            })
    }
}

fn test_app(store: MemoryStore) -> Router {
    let pages = StaticPages(HashMap::from([
        ("example.onion", "<h1>Admin Login Portal</h1>"),
        ("stored.test", "<p>password reset</p>"),
    ]));
    let worker = ScanWorker::new(Arc::new(pages), Duration::ZERO);
    let service = ScanService::new(ScanRegistry::new(), worker, Arc::new(store));
    create_app(AppState::new(service))
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn poll_until_complete(app: &Router, id: &str) -> ScanRecord {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/scan-status/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: ScanRecord = body_json(response).await;
        if record.status == ScanStatus::Complete {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {id} did not complete");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app(MemoryStore::default());
    let response = app.oneshot(get_request("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn trigger_then_poll_to_completion() {
    let app = test_app(MemoryStore::default());
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/scan",
            r#"{"keywords": ["login", "admin"], "urls": ["example.onion", {"url": "down.test"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: ScanAccepted = body_json(response).await;
    assert!(!accepted.scan_id.is_empty());
    assert_ne!(accepted.status, ScanStatus::Complete);

    let record = poll_until_complete(&app, &accepted.scan_id).await;
    let found: Vec<_> = record
        .matches
        .iter()
        .map(|m| (m.keyword.as_str(), m.url.as_str()))
        .collect();
    assert_eq!(found, vec![("login", "example.onion"), ("admin", "example.onion")]);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].url, "down.test");
    assert!(record.errors[0].error.contains("503"));
}

#[tokio::test]
async fn status_uses_camel_case_fields() {
    let app = test_app(MemoryStore::default());
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/scan",
            r#"{"keywords": "admin", "urls": ["example.onion"]}"#,
        ))
        .await
        .unwrap();
    let accepted: ScanAccepted = body_json(response).await;
    poll_until_complete(&app, &accepted.scan_id).await;

    let response = app
        .oneshot(get_request(&format!("/api/scan-status/{}", accepted.scan_id)))
        .await
        .unwrap();
    let raw: Value = body_json(response).await;
    assert_eq!(raw["status"], "complete");
    assert!(raw["startedAt"].is_string());
    assert!(raw["completedAt"].is_string());
    assert_eq!(raw["progress"]["current"], 1);
    assert_eq!(raw["progress"]["total"], 1);
    assert_eq!(raw["progress"]["url"], "example.onion");
}

#[tokio::test]
async fn comma_separated_keywords_and_stored_urls() {
    let app = test_app(MemoryStore::with_urls(["stored.test"]));
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/scan",
            r#"{"keywords": " Password , , reset "}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: ScanAccepted = body_json(response).await;

    let record = poll_until_complete(&app, &accepted.scan_id).await;
    assert_eq!(record.keywords, vec!["Password", "reset"]);
    assert_eq!(record.matches.len(), 2);

    let response = app.clone().oneshot(get_request("/api/history")).await.unwrap();
    let history: Vec<ScanSummary> = body_json(response).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, accepted.scan_id);

    let response = app.oneshot(get_request("/api/scans")).await.unwrap();
    let scans: Vec<ScanRecord> = body_json(response).await;
    assert_eq!(scans.len(), 1);
}

#[tokio::test]
async fn empty_keywords_are_a_client_error() {
    let app = test_app(MemoryStore::default());
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/scan",
            r#"{"keywords": [], "urls": ["example.onion"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "no keywords provided");
}

#[tokio::test]
async fn no_urls_anywhere_is_a_client_error() {
    let app = test_app(MemoryStore::default());
    let response = app
        .oneshot(json_request(Method::POST, "/api/scan", r#"{"keywords": ["admin"]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_scan_is_404() {
    let app = test_app(MemoryStore::default());
    let response = app
        .oneshot(get_request("/api/scan-status/0123456789abcdef"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not found"));
}
