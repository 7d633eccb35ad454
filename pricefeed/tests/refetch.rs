use std::time::Duration;

use pricefeed::orchestrator::QuoteOrchestrator;
use pricefeed::refetch;
use pricefeed_mock::MockAdapter;
use pricefeed_types::{Pair, SourceConfig, SourceName};
use rust_decimal::Decimal;
use tokio::sync::watch;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn marked_sources_revalidate_before_expiry() {
    let mock = MockAdapter::new(SourceName::Binance);
    let pair = Pair::new("BTC", "USD").unwrap();
    mock.set_price(&pair, Decimal::from(100));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(
            mock.clone(),
            SourceConfig {
                enabled: true,
                refetch: true,
                ttl_ms: 1_000,
                ..SourceConfig::default()
            },
        )
        .build();

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = refetch::spawn(orchestrator.clone(), stop_rx);

    // First fetch tracks the pair and warms the cache.
    orchestrator.get_quote(SourceName::Binance, &pair).await.unwrap();
    assert_eq!(mock.fetch_calls(), 1);

    // Within two TTL windows the loop must have revalidated at least once,
    // without any further caller requests.
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert!(
        mock.fetch_calls() >= 2,
        "expected a background revalidation, saw {} calls",
        mock.fetch_calls()
    );

    let _ = stop_tx.send(true);
    task.await.unwrap();
}

#[tokio::test]
async fn sources_without_refetch_are_left_alone() {
    let mock = MockAdapter::new(SourceName::Kraken);
    let pair = Pair::new("BTC", "USD").unwrap();
    mock.set_price(&pair, Decimal::from(100));

    let orchestrator = QuoteOrchestrator::builder()
        .with_adapter(
            mock.clone(),
            SourceConfig {
                enabled: true,
                refetch: false,
                ttl_ms: 1_000,
                ..SourceConfig::default()
            },
        )
        .build();

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = refetch::spawn(orchestrator.clone(), stop_rx);

    orchestrator.get_quote(SourceName::Kraken, &pair).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(mock.fetch_calls(), 1);

    let _ = stop_tx.send(true);
    task.await.unwrap();
}
