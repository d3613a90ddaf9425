// src/common/errors.rs
use thiserror::Error;

use crate::markets::types::SourceTag;

/// Everything that can go wrong on the proxy side of a request.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream proxy provider rejected the configured credentials")]
    Authentication,

    #[error("proxy {endpoint} unreachable: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("no proxies available{}", region.as_deref().map(|r| format!(" for region {r}")).unwrap_or_default())]
    NoProxiesAvailable { region: Option<String> },
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing API key for {platform} (set {env_var})")]
    MissingApiKey { platform: SourceTag, env_var: String },

    #[error("{platform} API error{} at {url}: {body}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api {
        platform: SourceTag,
        status: Option<u16>,
        url: String,
        body: String,
    },

    #[error("{platform} rate limited{}", retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        platform: SourceTag,
        retry_after: Option<u64>,
    },

    #[error("{platform} network error for {url}: {reason}")]
    Network {
        platform: SourceTag,
        url: String,
        reason: String,
    },

    #[error("{platform} returned malformed {what}: {reason}")]
    Parse {
        platform: SourceTag,
        what: &'static str,
        reason: String,
    },

    #[error("invalid listing: {reason}")]
    Validation { reason: String },

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("cache I/O failed: {0}")]
    Cache(String),

    #[error("operation cancelled by shutdown")]
    Cancelled,
}

impl ScrapeError {
    /// Retryable errors are handled inside the HTTP client; the rest bubble
    /// up to the adapter.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::RateLimited { .. } | ScrapeError::Network { .. }
        )
    }

    pub fn api(platform: SourceTag, status: Option<u16>, url: impl Into<String>, body: &str) -> Self {
        ScrapeError::Api {
            platform,
            status,
            url: url.into(),
            body: truncate_body(body),
        }
    }
}

/// Keep only the head of an upstream body so error logs stay readable.
pub fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... ({} bytes total)", &body[..end], body.len())
    }
}
