//! The served HTTP surface.
//!
//! Thin handlers over the orchestrator and registry; every `FeedError`
//! kind has a fixed status mapping, and batched responses answer each
//! position independently.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use pricefeed_core::{FeedError, PairRegistry, QuoteCache};
use pricefeed_types::{Pair, Registration, SourceName};

use crate::orchestrator::QuoteOrchestrator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The quote entry point.
    pub orchestrator: QuoteOrchestrator,
    /// Tracked pairs, for the registry endpoints.
    pub registry: Arc<PairRegistry>,
    /// The quote cache, for snapshot prices.
    pub cache: Arc<QuoteCache>,
}

impl AppState {
    /// Build handler state sharing the orchestrator's cache and registry.
    #[must_use]
    pub fn new(orchestrator: QuoteOrchestrator) -> Self {
        let registry = Arc::clone(orchestrator.registry());
        let cache = Arc::clone(orchestrator.cache());
        Self {
            orchestrator,
            registry,
            cache,
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/quote/:source/:base/:quote", get(get_quote))
        .route("/quotes/:source", post(post_quotes))
        .route("/pairs", get(all_pairs))
        .route("/pairs/:source", get(source_pairs))
        .route(
            "/pairs/:source/:base/:quote",
            put(add_pair).delete(remove_pair),
        )
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// HTTP status for each error kind.
#[must_use]
pub fn status_for(err: &FeedError) -> StatusCode {
    match err {
        FeedError::PriceNotFound { .. } => StatusCode::NOT_FOUND,
        FeedError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        FeedError::SourceDisabled { .. }
        | FeedError::UnknownSource { .. }
        | FeedError::InvalidArg(_) => StatusCode::BAD_REQUEST,
        FeedError::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
        FeedError::UpstreamStatus { status: 429, .. } | FeedError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        FeedError::UpstreamStatus { .. }
        | FeedError::Transport { .. }
        | FeedError::Api { .. }
        | FeedError::Malformed { .. }
        | FeedError::Stream { .. } => StatusCode::BAD_GATEWAY,
    }
}

struct ApiError(FeedError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        Self(err)
    }
}

fn parse_source(raw: &str) -> Result<SourceName, ApiError> {
    SourceName::from_str(raw).map_err(|()| {
        ApiError(FeedError::UnknownSource {
            name: raw.to_owned(),
        })
    })
}

fn parse_pair(base: String, quote: String) -> Result<Pair, ApiError> {
    Pair::new(base, quote).map_err(|e| ApiError(FeedError::InvalidArg(e.to_string())))
}

async fn get_quote(
    State(state): State<AppState>,
    Path((source, base, quote)): Path<(String, String, String)>,
) -> Result<Json<pricefeed_types::PriceQuote>, ApiError> {
    let source = parse_source(&source)?;
    let pair = parse_pair(base, quote)?;
    let quote = state.orchestrator.get_quote(source, &pair).await?;
    Ok(Json(quote))
}

#[derive(Deserialize)]
struct QuotesRequest {
    pairs: Vec<Pair>,
}

async fn post_quotes(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(req): Json<QuotesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = parse_source(&source)?;
    let outcomes = state.orchestrator.get_quotes(source, &req.pairs).await;
    let quotes: Vec<serde_json::Value> = req
        .pairs
        .iter()
        .zip(outcomes)
        .map(|(pair, outcome)| match outcome {
            Ok(quote) => serde_json::to_value(quote).unwrap_or_default(),
            Err(err) => json!({
                "pair": pair,
                "error": err.to_string(),
                "status": status_for(&err).as_u16(),
            }),
        })
        .collect();
    Ok(Json(json!({ "quotes": quotes })))
}

fn registry_rows(state: &AppState, rows: Vec<Registration>) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|reg| {
            let mut row = serde_json::to_value(&reg).unwrap_or_default();
            if let Some(cached) = state.cache.get(reg.source, &reg.pair) {
                row["price"] = json!(cached.price.to_string());
                row["receivedAt"] = json!(cached.received_at);
            }
            row
        })
        .collect();
    json!({ "pairs": rows })
}

async fn all_pairs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rows = state.registry.snapshot();
    Json(registry_rows(&state, rows))
}

async fn source_pairs(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = parse_source(&source)?;
    let rows = state.registry.snapshot_for(source);
    Ok(Json(registry_rows(&state, rows)))
}

async fn add_pair(
    State(state): State<AppState>,
    Path((source, base, quote)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let source = parse_source(&source)?;
    let pair = parse_pair(base, quote)?;
    if state.registry.add_pair(source, &pair) {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

async fn remove_pair(
    State(state): State<AppState>,
    Path((source, base, quote)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let source = parse_source(&source)?;
    let pair = parse_pair(base, quote)?;
    if state.registry.remove_pair(source, &pair) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(FeedError::price_not_found(format!(
            "no tracked pair {pair} for {source}"
        ))))
    }
}

async fn healthz() -> &'static str {
    "ok"
}
