//! Configuration consumed by the aggregator core.
//!
//! The service loads these from a YAML file; everything carries a `Default`
//! so a source can be enabled with a one-line entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SourceName;

/// Error raised while validating loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The config names a source the aggregator does not know.
    #[error("unknown source in config: {name}")]
    UnknownSource {
        /// The offending key.
        name: String,
    },
    /// A field holds a value outside its documented range.
    #[error("invalid value for {source}.{field}: {reason}")]
    InvalidField {
        /// Source the field belongs to.
        source: SourceName,
        /// Field name as written in the config file.
        field: &'static str,
        /// Human-readable constraint that was violated.
        reason: String,
    },
}

/// Proxy selection for a source's HTTP client.
///
/// In YAML this is either a bool (`use_proxy: true` reads the standard
/// `HTTPS_PROXY`/`HTTP_PROXY` environment) or an explicit proxy URL string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxySetting {
    /// Connect directly.
    #[default]
    Off,
    /// `true` routes through the proxy named by the environment; `false` is
    /// the same as [`ProxySetting::Off`].
    Env(bool),
    /// Tunnel through this proxy URL.
    Url(String),
}

impl ProxySetting {
    /// Whether any proxying is requested.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Off => false,
            Self::Env(on) => *on,
            Self::Url(_) => true,
        }
    }
}

/// WebSocket behavior knobs for a streaming-capable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamOptions {
    /// Reconnect automatically when the socket drops.
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts, milliseconds.
    pub reconnect_interval_ms: u64,
    /// Give up after this many consecutive failed reconnects.
    pub max_reconnect_attempts: u32,
    /// Ping cadence, milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Split subscribe/unsubscribe wire messages into chunks of this size.
    pub batch_size: Option<usize>,
    /// Outbound frame budget per interval; unset means unlimited.
    pub rate_limit_per_interval: Option<u32>,
    /// Window for the outbound frame budget, milliseconds.
    pub rate_limit_interval_ms: Option<u64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_interval_ms: 5_000,
            max_reconnect_attempts: 10,
            heartbeat_interval_ms: 30_000,
            batch_size: None,
            rate_limit_per_interval: None,
            rate_limit_interval_ms: None,
        }
    }
}

/// Per-source behavior knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Whether the source serves requests at all.
    pub enabled: bool,
    /// Cache freshness window, milliseconds. Minimum 1000.
    pub ttl_ms: u64,
    /// Per-request timeout against the upstream, milliseconds. Minimum 1000.
    pub timeout_ms: u64,
    /// Requests per second admitted to the upstream; unset or non-positive
    /// disables throttling.
    pub rps: Option<f64>,
    /// Maximum in-flight requests against the upstream.
    pub max_concurrent: usize,
    /// Retries for retryable failures, 0..=10.
    pub max_retries: u32,
    /// Proxy selection.
    pub use_proxy: ProxySetting,
    /// Revalidate cached entries shortly before they expire.
    pub refetch: bool,
    /// Credential for sources that need one.
    pub api_key: Option<String>,
    /// Upper bound on pairs per batched fetch.
    pub max_batch_size: Option<usize>,
    /// Streaming knobs; unset leaves streaming at defaults.
    pub stream: Option<StreamOptions>,
    /// Override the REST endpoint, mostly for tests and self-hosted mirrors.
    pub api_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: 10_000,
            timeout_ms: 5_000,
            rps: None,
            max_concurrent: 4,
            max_retries: 2,
            use_proxy: ProxySetting::Off,
            refetch: false,
            api_key: None,
            max_batch_size: None,
            stream: None,
            api_url: None,
        }
    }
}

impl SourceConfig {
    /// Check the documented value ranges.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidField`] naming the first offending field.
    pub fn validate(&self, source: SourceName) -> Result<(), ConfigError> {
        if self.ttl_ms < 1_000 {
            return Err(ConfigError::InvalidField {
                source,
                field: "ttl_ms",
                reason: format!("{} is below the 1000 ms minimum", self.ttl_ms),
            });
        }
        if self.timeout_ms < 1_000 {
            return Err(ConfigError::InvalidField {
                source,
                field: "timeout_ms",
                reason: format!("{} is below the 1000 ms minimum", self.timeout_ms),
            });
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidField {
                source,
                field: "max_concurrent",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_retries > 10 {
            return Err(ConfigError::InvalidField {
                source,
                field: "max_retries",
                reason: format!("{} exceeds the maximum of 10", self.max_retries),
            });
        }
        Ok(())
    }

    /// Upstream timeout as a [`std::time::Duration`].
    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// Cache TTL as a [`std::time::Duration`].
    #[must_use]
    pub const fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ttl_ms)
    }
}

/// Top-level application configuration.
///
/// `sources` is keyed by the raw config string so that unknown names can be
/// rejected at startup instead of being silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment label; `development` turns on debug logging.
    pub environment: String,
    /// Bind address for the served HTTP surface.
    pub listen_addr: Option<String>,
    /// Deadline for a caller-visible quote request, milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Per-source settings.
    pub sources: BTreeMap<String, SourceConfig>,
}

impl AppConfig {
    /// Resolve and validate the per-source table.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownSource`] for keys that do not name a
    /// supported source, or the first per-source range violation.
    pub fn resolve_sources(&self) -> Result<BTreeMap<SourceName, SourceConfig>, ConfigError> {
        let mut out = BTreeMap::new();
        for (key, cfg) in &self.sources {
            let name: SourceName = key.parse().map_err(|()| ConfigError::UnknownSource {
                name: key.clone(),
            })?;
            cfg.validate(name)?;
            out.insert(name, cfg.clone());
        }
        Ok(out)
    }

    /// The request deadline applied by the orchestrator.
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms.unwrap_or(10_000))
    }
}
