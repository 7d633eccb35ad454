//! pricefeed
//!
//! The aggregator service: wires the adapter fleet to the cache, registry,
//! refetch loop and streaming pipeline, and serves per-source quotes over
//! HTTP.
//!
//! - `config`: YAML configuration loading and validation.
//! - `orchestrator`: the public quote entry point (deadline, dedup, cache).
//! - `refetch`: background revalidation of hot pairs.
//! - `streaming`: registry-driven WebSocket subscriptions with batched
//!   cache write-back.
//! - `server`: the served HTTP surface.
#![warn(missing_docs)]

pub mod config;
pub mod orchestrator;
pub mod refetch;
pub mod server;
pub mod streaming;

pub use orchestrator::{OrchestratorBuilder, QuoteOrchestrator};
pub use server::{AppState, router};
