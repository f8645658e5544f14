//! Server integration tests
//!
//! Tests for the HTTP endpoints, driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use burp_exporter::burp::parse;
use burp_exporter::server::{router, AppState};
use burp_exporter::snapshot::{HealthState, SnapshotStore};
use tower::ServiceExt;

fn test_state(up: bool) -> AppState {
    let store = SnapshotStore::new();
    let clients = parse("client\tburp\tteam=cs\nclient\tasdf\nbackup\tburp\t7\t1567000007\tlogs\n")
        .unwrap()
        .clients;
    store.publish(
        clients,
        HealthState {
            up,
            contact_attempts: 1,
            ..HealthState::default()
        },
        None,
    );
    AppState {
        store,
        server_name: "burpserver".to_string(),
        group_by_label: None,
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    // Given: A store with one published poll
    let state = test_state(true);

    // When: Scraping /metrics
    let (status, body) = get(state, "/metrics").await;

    // Then: Output should be valid Prometheus format
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# HELP"), "Missing HELP comment");
    assert!(body.contains("# TYPE"), "Missing TYPE comment");
    assert!(
        body.contains("burp_up{server=\"burpserver\"} 1"),
        "Missing up metric"
    );
    assert!(body.contains("burp_client_backup_num{name=\"burp\",server=\"burpserver\"} 7"));
}

#[tokio::test]
async fn test_filter_route_selects_clients() {
    let (status, body) = get(test_state(true), "/filter?label_name=team&label_value=cs").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"burp\""));
    assert!(!body.contains("name=\"asdf\""));
}

#[tokio::test]
async fn test_filter_without_params_is_bad_request() {
    let (status, _) = get(test_state(true), "/filter").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(test_state(true), "/filter?label_name=team").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_follows_up_state() {
    let (status, _) = get(test_state(true), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(test_state(false), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_before_first_poll_is_unavailable() {
    let state = AppState {
        store: SnapshotStore::new(),
        server_name: "burpserver".to_string(),
        group_by_label: None,
    };

    let (status, _) = get(state, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_landing_page_links_metrics() {
    let (status, body) = get(test_state(true), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/metrics"));
}

#[tokio::test]
async fn test_metrics_rendering_is_stable() {
    // Given: The same snapshot scraped twice
    let state = test_state(true);

    // When: Rendering both
    let (_, first) = get(state.clone(), "/metrics").await;
    let (_, second) = get(state, "/metrics").await;

    // Then: Counters are not double counted across scrapes
    assert_eq!(first, second);
    assert!(first.contains("burp_contact_attempts_total{server=\"burpserver\"} 1"));
}
