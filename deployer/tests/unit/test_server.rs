//! Control API tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use homefleet::app::options::AppOptions;
use homefleet::app::state::AppState;
use homefleet::health::query::HealthQuery;
use homefleet::models::host::Service;
use homefleet::server::serve::router;
use homefleet::server::state::ServerState;
use homefleet::storage::inventory::HostStore;
use homefleet::storage::layout::StorageLayout;

use crate::support::{fast_poll, Fixture, MockHealthQuery, MockTransport};

fn app(store: HostStore, transport: MockTransport, health: MockHealthQuery) -> Router {
    let base = std::env::temp_dir().join(format!("homefleet-api-{}", uuid::Uuid::new_v4()));
    let options = AppOptions {
        layout: StorageLayout::new(base),
        poller: fast_poll(),
        ..AppOptions::default()
    };
    let health: Arc<dyn HealthQuery> = Arc::new(health);
    let state = AppState::new(
        options,
        store,
        Arc::new(transport),
        Fixture::default().registry(),
        health.clone(),
        health,
    );
    router(Arc::new(ServerState::new(Arc::new(state))))
}

fn fleet() -> HostStore {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "hunter2", Some(Service::Dashy)).unwrap();
    store.add("10.0.0.2", "pi", "hunter2", Some(Service::N8n)).unwrap();
    store
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_health_and_version() {
    let app = app(HostStore::new(), MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "healthy");

    let (status, body) = send(&app, "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_hosts_never_expose_secrets() {
    let app = app(fleet(), MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(&app, "GET", "/hosts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("hunter2"));
    let hosts = json(&body);
    assert_eq!(hosts.as_array().map(Vec::len), Some(2));
    assert_eq!(hosts[0]["has_secret"], true);
    assert_eq!(hosts[1]["service"], "n8n");
}

#[tokio::test]
async fn test_add_and_remove_host() {
    let app = app(HostStore::new(), MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(
        &app,
        "POST",
        "/hosts",
        Some(serde_json::json!({"address": "nas.lan", "user": "admin", "secret": "pw", "service": "portainer"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json(&body)["id"], 1);

    let (status, _) = send(&app, "DELETE", "/hosts/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/hosts/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deployment_lifecycle() {
    let transport = MockTransport::new().with_delay(Duration::from_millis(100));
    let app = app(fleet(), transport, MockHealthQuery::new());

    let (status, _) = send(&app, "GET", "/deployments/current", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", "/deployments", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = json(&body)["run_id"].clone();

    let (status, _) = send(&app, "POST", "/deployments", Some(serde_json::json!({"ids": [1]}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut cursor = 0;
    let mut events = 0;
    let status = loop {
        let (_, body) = send(&app, "GET", &format!("/deployments/current?cursor={}", cursor), None).await;
        let status = json(&body);
        events += status["events"].as_array().map(Vec::len).unwrap_or(0);
        cursor = status["next_cursor"].as_u64().unwrap() as usize;
        if status["complete"] == true {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(status["run_id"], run_id);
    assert_eq!(status["summary"]["succeeded"], 2);
    assert_eq!(status["summary"]["failed"], 0);
    assert_eq!(events, cursor);
    assert!(events > 0);
}

#[tokio::test]
async fn test_invalid_hosts_are_rejected_with_issues() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "", None).unwrap();
    let app = app(store, MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(&app, "POST", "/deployments", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let issues = json(&body)["issues"].as_array().cloned().unwrap_or_default();
    assert_eq!(issues.len(), 2);

    let (status, _) = send(&app, "POST", "/deployments", Some(serde_json::json!({"ids": [7]}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_refresh_and_export() {
    let health = MockHealthQuery::new().with_delay(Duration::from_millis(100));
    let app = app(fleet(), MockTransport::new(), health);

    let (status, body) = send(&app, "POST", "/health/refresh", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json(&body)["started"], true);

    let (status, body) = send(&app, "POST", "/health/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["started"], false);

    let snapshots = loop {
        let (_, body) = send(&app, "GET", "/health/snapshots", None).await;
        let snapshots = json(&body);
        if snapshots.as_array().map(Vec::len) == Some(2) {
            break snapshots;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(snapshots[0]["status"], "healthy");

    let (status, _) = send(&app, "GET", "/health/snapshots/2", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/health/snapshots/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, report) = send(&app, "GET", "/health/export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report.starts_with("Host #1 10.0.0.1"));
}

#[tokio::test]
async fn test_auto_refresh_routes() {
    let app = app(fleet(), MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(
        &app,
        "PUT",
        "/health/auto-refresh",
        Some(serde_json::json!({"interval": "5m"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["interval"], "5m");

    let (status, _) = send(
        &app,
        "PUT",
        "/health/auto-refresh",
        Some(serde_json::json!({"interval": "7m"})),
    )
    .await;
    assert!(status.is_client_error());

    let (status, _) = send(&app, "DELETE", "/health/auto-refresh", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/health/auto-refresh", None).await;
    assert_eq!(json(&body)["interval"], Value::Null);
}

#[tokio::test]
async fn test_bad_host_entries_are_rejected() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "", None).unwrap();
    let app = app(store, MockTransport::new(), MockHealthQuery::new());

    let (status, body) = send(
        &app,
        "POST",
        "/hosts",
        Some(serde_json::json!({"address": "-oProxyCommand=touch /tmp/x", "user": "pi", "secret": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(&body)["issues"][0]["field"], "address");

    let (_, body) = send(&app, "GET", "/hosts", None).await;
    assert_eq!(json(&body).as_array().map(Vec::len), Some(1));

    // host #1 has no secret, so no health run may start
    let (status, body) = send(&app, "POST", "/health/refresh", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(&body)["issues"][0]["field"], "secret");
}
