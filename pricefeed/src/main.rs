use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pricefeed::orchestrator::QuoteOrchestrator;
use pricefeed::server::AppState;
use pricefeed::{config, refetch, server};
use pricefeed_core::LimiterPool;
use pricefeed_sources::build_adapter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_tracing(environment: &str) {
    let default_level = if environment == "development" {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let (app_cfg, sources) = match config::load() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(&app_cfg.environment);

    let pool = Arc::new(LimiterPool::new());
    let mut builder = QuoteOrchestrator::builder().request_timeout(app_cfg.request_timeout());
    for (name, cfg) in &sources {
        if cfg.enabled {
            match build_adapter(*name, cfg, &pool) {
                Ok(adapter) => {
                    info!(source = %name, "registered source");
                    builder = builder.with_adapter(adapter, cfg.clone());
                }
                Err(err) => {
                    eprintln!("cannot build adapter for {name}: {err}");
                    std::process::exit(1);
                }
            }
        } else {
            builder = builder.with_disabled(*name, cfg.clone());
        }
    }
    let orchestrator = builder.build();

    let (stop_tx, stop_rx) = watch::channel(false);
    let refetch_task = refetch::spawn(orchestrator.clone(), stop_rx.clone());
    let streaming_task = pricefeed::streaming::StreamingQuotesService::new(
        orchestrator.adapters().clone(),
        orchestrator
            .configs()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect::<HashMap<_, _>>(),
        Arc::clone(orchestrator.cache()),
        Arc::clone(orchestrator.registry()),
    )
    .spawn(stop_rx);

    let state = AppState::new(orchestrator);
    let app = server::router(state);
    let addr = app_cfg
        .listen_addr
        .clone()
        .unwrap_or_else(|| "0.0.0.0:8080".to_owned());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, %err, "cannot bind listen address");
            std::process::exit(1);
        }
    };
    info!(%addr, "serving quotes");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    if let Err(err) = serve.await {
        error!(%err, "server error");
    }

    // Leaves-first shutdown: stop timers and streams, flush the quote
    // batch, then drain the limiters.
    info!("shutting down");
    let _ = stop_tx.send(true);
    let _ = refetch_task.await;
    let _ = streaming_task.await;
    pool.shutdown(SHUTDOWN_GRACE).await;
    info!("bye");
}
