use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pricefeed::orchestrator::QuoteOrchestrator;
use pricefeed::server::{AppState, router};
use pricefeed_mock::MockAdapter;
use pricefeed_types::{Pair, SourceConfig, SourceName};
use rust_decimal::Decimal;
use tower::ServiceExt;

fn pair(base: &str, quote: &str) -> Pair {
    Pair::new(base, quote).unwrap()
}

fn enabled_cfg() -> SourceConfig {
    SourceConfig {
        enabled: true,
        ..SourceConfig::default()
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn quote_endpoint_serves_and_caches() {
    let mock = MockAdapter::new(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), "67890.12".parse().unwrap());
    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .build();
    let app = router(AppState::new(orchestrator));

    let response = app
        .clone()
        .oneshot(
            Request::get("/quote/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pair"], serde_json::json!(["BTC", "USD"]));
    assert_eq!(body["price"], serde_json::json!("67890.12"));
    let first_received = body["receivedAt"].as_i64().unwrap();

    // A second call within the TTL answers from cache with the same
    // observation instant.
    let response = app
        .oneshot(
            Request::get("/quote/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["receivedAt"].as_i64().unwrap(), first_received);
    assert_eq!(body["price"], serde_json::json!("67890.12"));
}

#[tokio::test]
async fn error_taxonomy_maps_to_statuses() {
    let missing = MockAdapter::new(SourceName::Kraken);
    let unauthorized = MockAdapter::new(SourceName::AlphaVantage);
    unauthorized.fail_with(Some(pricefeed_core::FeedError::unauthorized(
        SourceName::AlphaVantage,
        "no api key configured",
    )));
    let disabled = MockAdapter::disabled(SourceName::Coinbase);

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(missing, enabled_cfg())
        .with_adapter(unauthorized, enabled_cfg())
        .with_adapter(
            disabled,
            SourceConfig {
                enabled: false,
                ..SourceConfig::default()
            },
        )
        .build();
    let app = router(AppState::new(orchestrator));

    let cases = [
        ("/quote/kraken/DOGE/MADEUP", StatusCode::NOT_FOUND),
        ("/quote/alphavantage/USD/EUR", StatusCode::UNAUTHORIZED),
        ("/quote/coinbase/BTC/USD", StatusCode::BAD_REQUEST),
        ("/quote/not-a-source/BTC/USD", StatusCode::BAD_REQUEST),
    ];
    for (uri, expected) in cases {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "{uri}");
        let body = body_json(response).await;
        assert!(body["error"].is_string(), "{uri} should carry an error");
    }
}

#[tokio::test]
async fn slow_adapters_yield_request_timeout() {
    let mock = MockAdapter::new(SourceName::Okx);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(1));
    mock.set_delay(Duration::from_millis(200));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .request_timeout(Duration::from_millis(50))
        .build();
    let app = router(AppState::new(orchestrator));

    let response = app
        .oneshot(
            Request::get("/quote/okx/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn batch_endpoint_answers_every_position() {
    let mock = MockAdapter::with_batch(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(100));
    mock.set_price(&pair("ETH", "USD"), Decimal::from(200));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .build();
    let app = router(AppState::new(orchestrator));

    let response = app
        .oneshot(
            Request::post("/quotes/binance")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"pairs":[["BTC","USD"],["ETH","USD"],["BTC","USD"],["NOPE","USD"]]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let quotes = body["quotes"].as_array().unwrap();
    assert_eq!(quotes.len(), 4);
    assert_eq!(quotes[0]["price"], serde_json::json!("100"));
    assert_eq!(quotes[1]["price"], serde_json::json!("200"));
    assert_eq!(quotes[2]["price"], serde_json::json!("100"));
    assert_eq!(quotes[3]["status"], serde_json::json!(404));
}

#[tokio::test]
async fn pairs_endpoints_expose_the_registry() {
    let mock = MockAdapter::new(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), "67890.12".parse().unwrap());
    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .build();
    let app = router(AppState::new(orchestrator));

    // Track explicitly, then fetch so a cached price is available.
    let response = app
        .clone()
        .oneshot(
            Request::put("/pairs/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // A second PUT is idempotent.
    let response = app
        .clone()
        .oneshot(
            Request::put("/pairs/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.clone()
        .oneshot(
            Request::get("/quote/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(Request::get("/pairs/binance").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let rows = body["pairs"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["pair"], serde_json::json!(["BTC", "USD"]));
    assert_eq!(rows[0]["price"], serde_json::json!("67890.12"));
    assert!(rows[0]["registeredAt"].is_i64());

    let response = app
        .clone()
        .oneshot(
            Request::delete("/pairs/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::delete("/pairs/binance/BTC/USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn healthz_is_always_up() {
    let orchestrator = QuoteOrchestrator::builder().build();
    let app = router(AppState::new(orchestrator));
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
