use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use pricefeed_core::{FeedError, HttpClient, RateLimiter};
use pricefeed_types::SourceName;

fn client_for(server: &MockServer, max_retries: u32) -> HttpClient {
    HttpClient::builder(SourceName::Binance)
        .base_url(server.base_url())
        .timeout(Duration::from_secs(2))
        .limiter(Arc::new(RateLimiter::new("test", None, 4)))
        .max_retries(max_retries)
        .build()
        .unwrap()
}

#[tokio::test]
async fn returns_parsed_json_on_success() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/ticker/price")
                .query_param("symbol", "BTCUSDT");
            then.status(200)
                .body(r#"{"symbol":"BTCUSDT","price":"67890.12"}"#);
        })
        .await;

    let client = client_for(&server, 0);
    let body = client
        .get_json("/api/v3/ticker/price", &[("symbol", "BTCUSDT")])
        .await
        .unwrap();
    assert_eq!(body["price"], serde_json::json!("67890.12"));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn default_params_ride_along() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/q").query_param("apikey", "k1");
            then.status(200).body("{}");
        })
        .await;

    let client = HttpClient::builder(SourceName::Finnhub)
        .base_url(server.base_url())
        .default_param("apikey", "k1")
        .limiter(Arc::new(RateLimiter::new("test", None, 4)))
        .build()
        .unwrap();
    client.get_json("/q", &[]).await.unwrap();
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn server_errors_are_retried_then_surfaced() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(500).body("upstream exploded");
        })
        .await;

    let client = client_for(&server, 2);
    let err = client.get("/flaky", &[]).await.unwrap_err();
    assert!(matches!(err, FeedError::UpstreamStatus { status: 500, .. }));
    // One attempt plus two retries.
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/bad");
            then.status(400).body("nope");
        })
        .await;

    let client = client_for(&server, 5);
    let err = client.get("/bad", &[]).await.unwrap_err();
    assert!(matches!(err, FeedError::UpstreamStatus { status: 400, .. }));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn upstream_401_maps_to_unauthorized() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/auth");
            then.status(401).body("bad key");
        })
        .await;

    let client = client_for(&server, 3);
    let err = client.get("/auth", &[]).await.unwrap_err();
    assert!(matches!(err, FeedError::Unauthorized { .. }));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let client = client_for(&server, 0);
    let err = client.get_json("/html", &[]).await.unwrap_err();
    assert!(matches!(err, FeedError::Malformed { .. }));
}
