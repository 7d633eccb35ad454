use std::sync::Arc;
use std::time::Duration;

use pricefeed::orchestrator::QuoteOrchestrator;
use pricefeed_core::FeedError;
use pricefeed_mock::MockAdapter;
use pricefeed_types::{Pair, SourceConfig, SourceName};
use rust_decimal::Decimal;

fn pair(base: &str, quote: &str) -> Pair {
    Pair::new(base, quote).unwrap()
}

fn enabled_cfg() -> SourceConfig {
    SourceConfig {
        enabled: true,
        ..SourceConfig::default()
    }
}

#[tokio::test]
async fn concurrent_requests_deduplicate_to_one_fetch() {
    let mock = MockAdapter::new(SourceName::Coingecko);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(67890));
    mock.set_delay(Duration::from_millis(50));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .build();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .get_quote(SourceName::Coingecko, &pair("BTC", "USD"))
                .await
        }));
    }
    let mut quotes = Vec::new();
    for handle in handles {
        quotes.push(handle.await.unwrap().unwrap());
    }

    // One adapter call; everyone saw the same reading.
    assert_eq!(mock.fetch_calls(), 1);
    let first = &quotes[0];
    assert!(quotes.iter().all(|q| q.received_at == first.received_at));
    assert!(quotes.iter().all(|q| q.price == first.price));
}

#[tokio::test]
async fn fresh_cache_entries_short_circuit_the_adapter() {
    let mock = MockAdapter::new(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(100));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .build();

    let first = orchestrator
        .get_quote(SourceName::Binance, &pair("BTC", "USD"))
        .await
        .unwrap();
    let second = orchestrator
        .get_quote(SourceName::Binance, &pair("BTC", "USD"))
        .await
        .unwrap();

    assert_eq!(mock.fetch_calls(), 1);
    assert_eq!(second.received_at, first.received_at);
    assert_eq!(second.price, first.price);
    // The cache stamped its copy.
    assert!(second.cached_at.is_some());
}

#[tokio::test]
async fn unknown_and_disabled_sources_are_rejected() {
    let disabled = MockAdapter::disabled(SourceName::Kraken);
    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(
            disabled,
            SourceConfig {
                enabled: false,
                ..SourceConfig::default()
            },
        )
        .build();

    let err = orchestrator
        .get_quote(SourceName::Kraken, &pair("BTC", "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::SourceDisabled { .. }));

    let err = orchestrator
        .get_quote(SourceName::Binance, &pair("BTC", "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::UnknownSource { .. }));
}

#[tokio::test]
async fn request_deadline_surfaces_while_the_fetch_continues() {
    let mock = MockAdapter::new(SourceName::Okx);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(42));
    mock.set_delay(Duration::from_millis(200));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .request_timeout(Duration::from_millis(50))
        .build();

    let err = orchestrator
        .get_quote(SourceName::Okx, &pair("BTC", "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::RequestTimeout { .. }));

    // The background fetch still lands in the cache; the next identical
    // request hits without another adapter call.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let quote = orchestrator
        .get_quote(SourceName::Okx, &pair("BTC", "USD"))
        .await
        .unwrap();
    assert_eq!(quote.price, Decimal::from(42));
    assert_eq!(mock.fetch_calls(), 1);
}

#[tokio::test]
async fn price_not_found_is_not_cached() {
    let mock = MockAdapter::new(SourceName::Kraken);
    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .build();

    for _ in 0..2 {
        let err = orchestrator
            .get_quote(SourceName::Kraken, &pair("DOGE", "MADEUP"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::PriceNotFound { .. }));
    }
    // Both misses reached the adapter: failures never warm the cache.
    assert_eq!(mock.fetch_calls(), 2);
}

#[tokio::test]
async fn batch_path_deduplicates_but_answers_every_position() {
    let mock = MockAdapter::with_batch(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(100));
    mock.set_price(&pair("ETH", "USD"), Decimal::from(200));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .build();

    let pairs = vec![pair("BTC", "USD"), pair("ETH", "USD"), pair("BTC", "USD")];
    let results = orchestrator.get_quotes(SourceName::Binance, &pairs).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().price, Decimal::from(100));
    assert_eq!(results[1].as_ref().unwrap().price, Decimal::from(200));
    assert_eq!(results[2].as_ref().unwrap().price, Decimal::from(100));
    assert_eq!(mock.batch_calls(), 1);
    assert_eq!(mock.fetch_calls(), 0);
}

#[tokio::test]
async fn batch_deadline_surfaces_while_the_batch_continues() {
    let mock = MockAdapter::with_batch(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(100));
    mock.set_price(&pair("ETH", "USD"), Decimal::from(200));
    mock.set_delay(Duration::from_millis(200));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .request_timeout(Duration::from_millis(50))
        .build();

    let pairs = vec![pair("BTC", "USD"), pair("ETH", "USD")];
    let results = orchestrator.get_quotes(SourceName::Binance, &pairs).await;
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(FeedError::RequestTimeout { .. })))
    );

    // The spawned batch call keeps running and lands in the cache; a later
    // identical request answers from cache without another upstream call.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let results = orchestrator.get_quotes(SourceName::Binance, &pairs).await;
    assert_eq!(results[0].as_ref().unwrap().price, Decimal::from(100));
    assert_eq!(results[1].as_ref().unwrap().price, Decimal::from(200));
    assert_eq!(mock.batch_calls(), 1);
    assert_eq!(mock.fetch_calls(), 0);
}

#[tokio::test]
async fn batch_collects_per_pair_errors() {
    let mock = MockAdapter::with_batch(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(100));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .build();

    let pairs = vec![pair("BTC", "USD"), pair("NOPE", "USD")];
    let results = orchestrator.get_quotes(SourceName::Binance, &pairs).await;
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FeedError::PriceNotFound { .. })));
}

#[tokio::test]
async fn non_batch_adapters_fan_out_per_pair() {
    let mock = MockAdapter::new(SourceName::Frankfurter);
    mock.set_price(&pair("USD", "EUR"), Decimal::new(9215, 4));
    mock.set_price(&pair("USD", "GBP"), Decimal::new(7901, 4));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock.clone(), enabled_cfg())
        .build();

    let pairs = vec![pair("USD", "EUR"), pair("USD", "GBP")];
    let results = orchestrator.get_quotes(SourceName::Frankfurter, &pairs).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(mock.fetch_calls(), 2);
}

#[tokio::test]
async fn requests_track_the_registry() {
    let mock = MockAdapter::new(SourceName::Binance);
    mock.set_price(&pair("BTC", "USD"), Decimal::from(1));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(mock, enabled_cfg())
        .build();
    orchestrator
        .get_quote(SourceName::Binance, &pair("BTC", "USD"))
        .await
        .unwrap();

    let rows = orchestrator.registry().snapshot_for(SourceName::Binance);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pair, pair("BTC", "USD"));
    assert!(rows[0].last_response_at.is_some());
    assert!(rows[0].last_fetch_at.is_some());
}
