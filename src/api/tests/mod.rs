use super::*;
use crate::poller::PollStatus;
use crate::publish::FeedPublisher;
use crate::rebuild::OutputFeed;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::watch;
use tower::ServiceExt;

/// Relay handle over a temp cache dir, plus the publisher feeding it
fn test_relay() -> (RelayHandle, FeedPublisher, TempDir) {
    let temp_dir = tempdir().unwrap();
    let publisher = FeedPublisher::new();
    let (_tx, status) = watch::channel(PollStatus::default());
    let relay = RelayHandle::new(publisher.clone(), status, temp_dir.path().to_path_buf());
    (relay, publisher, temp_dir)
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_feed_unavailable_before_first_cycle() {
    let (relay, _publisher, _temp_dir) = test_relay();
    let app = create_router(relay, &ApiConfig::default());

    let response = get(app, "/feeds.rss").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_feed_serves_published_xml() {
    let (relay, publisher, _temp_dir) = test_relay();
    publisher.publish(&OutputFeed {
        xml: "<rss version=\"2.0\"><channel/></rss>".to_string(),
        item_count: 0,
        built_at: Utc::now(),
    });
    let app = create_router(relay, &ApiConfig::default());

    let response = get(app, "/feeds.rss").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        routes::FEED_CONTENT_TYPE
    );
    assert_eq!(
        body_text(response).await,
        "<rss version=\"2.0\"><channel/></rss>"
    );
}

#[tokio::test]
async fn test_cached_artifact_is_served() {
    let (relay, _publisher, temp_dir) = test_relay();
    std::fs::write(temp_dir.path().join("12.torrent"), b"d4:infoe").unwrap();
    let app = create_router(relay, &ApiConfig::default());

    let response = get(app.clone(), "/torrent/12.torrent").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "d4:infoe");

    let missing = get(app, "/torrent/13.torrent").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unfinished_artifact_is_not_served() {
    let (relay, _publisher, temp_dir) = test_relay();
    std::fs::write(temp_dir.path().join("5.torrent.part"), b"d8:annou").unwrap();
    std::fs::write(temp_dir.path().join("notes.txt"), b"private").unwrap();
    let app = create_router(relay, &ApiConfig::default());

    let partial = get(app.clone(), "/torrent/5.torrent.part").await;
    assert_eq!(partial.status(), StatusCode::NOT_FOUND);

    let unfinished = get(app.clone(), "/torrent/5.torrent").await;
    assert_eq!(unfinished.status(), StatusCode::NOT_FOUND);

    let other = get(app, "/torrent/notes.txt").await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_poll_status() {
    let (relay, _publisher, _temp_dir) = test_relay();
    let app = create_router(relay, &ApiConfig::default());

    let response = get(app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["feed_ready"], false);
    assert_eq!(json["poll"]["state"], "idle");
    assert_eq!(json["poll"]["consecutive_failures"], 0);
}

#[tokio::test]
async fn test_cors_headers_when_enabled() {
    let (relay, _publisher, _temp_dir) = test_relay();
    let config = ApiConfig {
        cors_enabled: true,
        ..Default::default()
    };
    let app = create_router(relay, &config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_api_server_stops_on_shutdown() {
    let (relay, _publisher, _temp_dir) = test_relay();
    let config = ApiConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let shutdown = CancellationToken::new();

    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { start_api_server(relay, &config, shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
