#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mockito::Matcher;
use nadhi_common::{EvaluatedRecord, LogItem, Tier};
use nadhi_delivery::{FallbackTransport, PrimaryTransport, Transport};
use serde_json::json;

fn item(message: &str) -> LogItem {
    LogItem::new(EvaluatedRecord::new(
        json!({"message": message, "trace_id": "t-1"}),
        ["alerts", "audit"],
    ))
}

fn primary(url: &str) -> PrimaryTransport {
    PrimaryTransport::new(url, "secret", Duration::from_secs(2), Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn primary_posts_json_with_api_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/log")
        .match_header("datanadhi_api_key", "secret")
        .match_body(Matcher::Json(json!({
            "pipelines": ["alerts", "audit"],
            "log_data": {"message": "hello", "trace_id": "t-1"},
        })))
        .with_status(200)
        .create_async()
        .await;

    primary(&server.url()).deliver(&[item("hello")]).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn primary_status_classification() {
    let mut server = mockito::Server::new_async().await;
    let transport = primary(&server.url());

    let refused = server
        .mock("POST", "/log")
        .with_status(400)
        .create_async()
        .await;
    let err = transport.deliver(&[item("a")]).await.unwrap_err();
    assert!(err.is_application());
    assert_eq!(err.tier(), Tier::Primary);
    refused.remove_async().await;

    server
        .mock("POST", "/log")
        .with_status(503)
        .create_async()
        .await;
    let err = transport.deliver(&[item("b")]).await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn unreachable_server_is_a_connection_failure() {
    let transport = primary("http://127.0.0.1:1");

    let err = transport.deliver(&[item("x")]).await.unwrap_err();
    assert!(err.is_connection());
    assert!(!transport.probe().await);
}

#[tokio::test]
async fn fallback_uploads_compressed_batch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .match_header("datanadhi_api_key", "secret")
        .match_header("content-type", "application/octet-stream")
        .with_status(200)
        .create_async()
        .await;

    let transport = FallbackTransport::new(
        &server.url(),
        "secret",
        Duration::from_secs(2),
        Duration::from_secs(1),
        50,
    )
    .unwrap();
    assert_eq!(transport.max_batch(), 50);

    transport
        .deliver(&[item("one"), item("two")])
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn probe_checks_root() {
    let mut server = mockito::Server::new_async().await;
    let up = server
        .mock("GET", "/")
        .with_status(200)
        .create_async()
        .await;

    let transport = primary(&server.url());
    assert!(transport.probe().await);
    up.assert_async().await;
    up.remove_async().await;

    server
        .mock("GET", "/")
        .with_status(500)
        .create_async()
        .await;
    assert!(!transport.probe().await);
}
