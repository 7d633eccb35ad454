//! Configured HTTP client used by every REST adapter.
//!
//! Each client is built once per source with its base URL, default query
//! params, headers, timeout and proxy, and submits every request through a
//! shared per-host rate limiter. Logged URLs have secret query params
//! replaced by `REDACTED`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::ratelimit::RateLimiter;
use crate::FeedError;
use pricefeed_types::SourceName;

/// Query parameter names whose values never reach the logs.
const SECRET_PARAMS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "access_token",
    "key",
    "secret",
    "signature",
    "sig",
];

/// Replace secret query parameter values with `REDACTED`.
#[must_use]
pub fn sanitize_url(url: &Url) -> String {
    let has_secret = url
        .query_pairs()
        .any(|(k, _)| SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str()));
    if !has_secret {
        return url.to_string();
    }
    let mut clean = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str()) {
                (k.into_owned(), "REDACTED".to_owned())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    clean
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    clean.to_string()
}

/// Raw response handed back to adapters: status, headers and body text.
/// Body parsing is the adapter's responsibility.
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code (always 2xx; other statuses surface as errors).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body as text.
    pub body: String,
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    source: SourceName,
    base_url: Option<String>,
    default_params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    timeout: Duration,
    proxy_url: Option<String>,
    use_env_proxy: bool,
    limiter: Option<Arc<RateLimiter>>,
    max_retries: u32,
}

impl HttpClientBuilder {
    /// Set the base URL requests are joined against.
    #[must_use]
    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    /// Add a default query parameter sent on every request. Caller-supplied
    /// params with the same name win.
    #[must_use]
    pub fn default_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_params.push((name.into(), value.into()));
        self
    }

    /// Add a header sent on every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tunnel through an explicit proxy URL.
    #[must_use]
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Honor `HTTPS_PROXY`/`HTTP_PROXY` from the environment.
    #[must_use]
    pub const fn env_proxy(mut self, yes: bool) -> Self {
        self.use_env_proxy = yes;
        self
    }

    /// Submit requests through this limiter.
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Retry budget for retryable failures.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an unparsable base or proxy URL, or a
    /// header value reqwest rejects.
    pub fn build(self) -> Result<HttpClient, FeedError> {
        let base_url = self
            .base_url
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|e| FeedError::InvalidArg(format!("bad base url {raw}: {e}")))
            })
            .transpose()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedError::InvalidArg(format!("bad header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FeedError::InvalidArg(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers);
        if let Some(proxy) = &self.proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FeedError::InvalidArg(format!("bad proxy url {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        } else if !self.use_env_proxy {
            builder = builder.no_proxy();
        }
        let inner = builder
            .build()
            .map_err(|e| FeedError::InvalidArg(format!("http client build failed: {e}")))?;

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(RateLimiter::new(
                format!("{}-unlimited", self.source),
                None,
                usize::MAX >> 3,
            ))
        });

        Ok(HttpClient {
            inner,
            source: self.source,
            base_url,
            default_params: self.default_params,
            limiter,
            max_retries: self.max_retries,
        })
    }
}

/// HTTP client configured for one source.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    source: SourceName,
    base_url: Option<Url>,
    default_params: Vec<(String, String)>,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
}

impl HttpClient {
    /// Start a builder for `source` with a 5 s timeout and no retries.
    #[must_use]
    pub fn builder(source: SourceName) -> HttpClientBuilder {
        HttpClientBuilder {
            source,
            base_url: None,
            default_params: Vec::new(),
            headers: Vec::new(),
            timeout: Duration::from_secs(5),
            proxy_url: None,
            use_env_proxy: false,
            limiter: None,
            max_retries: 0,
        }
    }

    /// The source this client is configured for.
    #[must_use]
    pub const fn source(&self) -> SourceName {
        self.source
    }

    /// Compose the final request URL: absolute-URL join against the base,
    /// then default params merged under caller params (caller wins).
    ///
    /// # Errors
    /// Returns `InvalidArg` when the path is not resolvable to a URL.
    pub fn compose_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, FeedError> {
        let mut url = match &self.base_url {
            Some(base) => base
                .join(path)
                .map_err(|e| FeedError::InvalidArg(format!("bad request path {path}: {e}")))?,
            None => Url::parse(path)
                .map_err(|e| FeedError::InvalidArg(format!("bad request url {path}: {e}")))?,
        };

        let mut merged: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for (name, value) in &self.default_params {
            if !merged.iter().any(|(k, _)| k == name) {
                merged.push((name.clone(), value.clone()));
            }
        }
        for (name, value) in params {
            merged.retain(|(k, _)| k.as_str() != *name);
            merged.push(((*name).to_owned(), (*value).to_owned()));
        }

        url.set_query(None);
        if !merged.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(merged.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// Issue a GET through the limiter, with the retry policy applied.
    ///
    /// # Errors
    /// - `Unauthorized` on upstream 401.
    /// - `UpstreamStatus` on any other non-2xx.
    /// - `Transport` on network-level failures (retried by the limiter).
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<HttpResponse, FeedError> {
        let url = self.compose_url(path, params)?;
        debug!(
            target = "pricefeed::http",
            source = %self.source,
            url = %sanitize_url(&url),
            "GET"
        );
        self.limiter
            .run_with_retry(self.max_retries, || self.send_once(url.clone()))
            .await
    }

    /// Issue a GET and parse the body as JSON.
    ///
    /// # Errors
    /// As [`get`](Self::get), plus `Malformed` when the body is not JSON.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, FeedError> {
        let resp = self.get(path, params).await?;
        serde_json::from_str(&resp.body)
            .map_err(|e| FeedError::malformed(self.source, format!("invalid json: {e}")))
    }

    async fn send_once(&self, url: Url) -> Result<HttpResponse, FeedError> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify_send_error(&e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::transport(self.source, format!("body read failed: {e}")))?;

        if status.as_u16() == 401 {
            return Err(FeedError::unauthorized(self.source, "upstream returned 401"));
        }
        if !status.is_success() {
            return Err(FeedError::UpstreamStatus {
                source: self.source,
                status: status.as_u16(),
            });
        }
        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    fn classify_send_error(&self, err: &reqwest::Error) -> FeedError {
        if err.is_timeout() {
            FeedError::transport(self.source, "request timed out")
        } else if err.is_connect() {
            FeedError::transport(self.source, format!("connect failed: {err}"))
        } else {
            FeedError::transport(self.source, err.to_string())
        }
    }
}
