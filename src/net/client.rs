//! Shared HTTP fetch path used by every adapter: rate-limit wait, optional
//! proxy binding, retries with exponential back-off, response caching and
//! per-source metrics.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::common::config::ConfigManager;
use crate::common::errors::{truncate_body, ScrapeError};
use crate::common::shutdown::Shutdown;
use crate::markets::types::SourceTag;
use crate::net::metrics::MetricsRegistry;
use crate::net::proxy_pool::ProxyPool;
use crate::net::rate_limiter::RateLimiter;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const PROXIED_CLIENT_CAP: usize = 64;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// One outgoing request, described declaratively so the client owns the
/// retry/proxy/cache plumbing.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub method: reqwest::Method,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body_json: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        RequestSpec {
            url: url.into(),
            method: reqwest::Method::GET,
            query: Vec::new(),
            headers: Vec::new(),
            body_json: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Stable cache key: source-scoped hash over URL plus sorted query.
    pub fn cache_key(&self, source: SourceTag) -> String {
        let mut query = self.query.clone();
        query.sort();
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        for (k, v) in &query {
            hasher.update(b"&");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
        format!("{source}:{:x}", hasher.finalize())
    }
}

pub struct HttpClient {
    direct: reqwest::Client,
    proxied: DashMap<String, reqwest::Client>,
    limiters: DashMap<SourceTag, Arc<RateLimiter>>,
    caches: DashMap<SourceTag, Arc<CacheService>>,
    proxy_pool: Option<Arc<ProxyPool>>,
    config: Arc<ConfigManager>,
    pub metrics: Arc<MetricsRegistry>,
    shutdown: Shutdown,
}

impl HttpClient {
    pub fn new(
        config: Arc<ConfigManager>,
        proxy_pool: Option<Arc<ProxyPool>>,
        metrics: Arc<MetricsRegistry>,
        shutdown: Shutdown,
    ) -> Result<Self, ScrapeError> {
        let direct = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(30)
            .build()
            .map_err(|e| ScrapeError::Config(format!("building HTTP client: {e}")))?;

        Ok(HttpClient {
            direct,
            proxied: DashMap::new(),
            limiters: DashMap::new(),
            caches: DashMap::new(),
            proxy_pool,
            config,
            metrics,
            shutdown,
        })
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn proxy_pool(&self) -> Option<Arc<ProxyPool>> {
        self.proxy_pool.clone()
    }

    /// Fetch and JSON-decode through the per-source cache.
    pub async fn fetch_json_cached(
        &self,
        source: SourceTag,
        spec: RequestSpec,
    ) -> Result<serde_json::Value, ScrapeError> {
        let source_metrics = self.metrics.for_source(source);
        let key = spec.cache_key(source);

        if let Some(cache) = self.cache_for(source) {
            if let Some(value) = cache.get_value(&key).await {
                source_metrics.cache_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!("{source}: cache hit for {}", spec.url);
                return Ok(value);
            }
            source_metrics.cache_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        let value = self.fetch_json(source, spec).await?;
        if let Some(cache) = self.cache_for(source) {
            let ttl = self.config.scraper(source).cache_ttl_seconds;
            cache.set(&key, &value, Some(ttl)).await;
        }
        Ok(value)
    }

    /// Fetch and JSON-decode, bypassing the cache.
    pub async fn fetch_json(
        &self,
        source: SourceTag,
        spec: RequestSpec,
    ) -> Result<serde_json::Value, ScrapeError> {
        let url = spec.url.clone();
        let body = self.fetch_text(source, spec).await?;
        serde_json::from_str(&body).map_err(|e| ScrapeError::Parse {
            platform: source,
            what: "JSON",
            reason: format!("{e} (from {url})"),
        })
    }

    /// Fetch a response body with rate limiting, proxying and retries.
    pub async fn fetch_text(
        &self,
        source: SourceTag,
        spec: RequestSpec,
    ) -> Result<String, ScrapeError> {
        let cfg = self.config.scraper(source);
        let source_metrics = self.metrics.for_source(source);
        let limiter = self.limiter_for(source, &cfg);
        let use_proxy = self.proxy_pool.is_some() && self.config.use_proxy_for(source);

        let mut last_error = ScrapeError::Network {
            platform: source,
            url: spec.url.clone(),
            reason: "no attempts made".to_string(),
        };

        for attempt in 0..=cfg.max_retries {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }

            limiter.acquire().await;

            let proxy = if use_proxy {
                self.proxy_pool.as_ref().and_then(|p| p.get())
            } else {
                None
            };
            let client = match &proxy {
                Some(endpoint) => self.proxied_client(endpoint)?,
                None => self.direct.clone(),
            };

            source_metrics
                .requests_made
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let started = Instant::now();
            let outcome = self.issue(&client, &cfg.timeout_seconds, &cfg.headers, &spec).await;
            let elapsed = started.elapsed().as_secs_f64();
            source_metrics.record_response_time(elapsed);

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if let Some(pool) = self.proxy_pool.as_ref().filter(|_| proxy.is_some()) {
                        pool.report(status.is_success(), elapsed).await;
                    }

                    if status.as_u16() == 429 {
                        source_metrics
                            .rate_limit_hits
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        let retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok());
                        last_error = ScrapeError::RateLimited {
                            platform: source,
                            retry_after,
                        };
                        if attempt < cfg.max_retries {
                            let backoff = RETRY_BASE_DELAY * 2u32.pow(attempt);
                            let wait = retry_after
                                .map(Duration::from_secs)
                                .unwrap_or(backoff)
                                .max(backoff);
                            warn!("{source}: HTTP 429, backing off {wait:?}");
                            tokio::time::sleep(wait).await;
                        }
                        continue;
                    }

                    if status.is_client_error() || status.is_server_error() {
                        source_metrics
                            .requests_failed
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        let body = response.text().await.unwrap_or_default();
                        return Err(ScrapeError::Api {
                            platform: source,
                            status: Some(status.as_u16()),
                            url: spec.url.clone(),
                            body: truncate_body(&body),
                        });
                    }

                    let body = match response.text().await {
                        Ok(b) => b,
                        Err(e) => {
                            source_metrics
                                .requests_failed
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            last_error = ScrapeError::Network {
                                platform: source,
                                url: spec.url.clone(),
                                reason: format!("reading body: {e}"),
                            };
                            self.backoff_and_rotate(source, proxy.as_deref(), attempt, &cfg).await;
                            continue;
                        }
                    };

                    source_metrics
                        .requests_successful
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(body);
                }
                Err(e) => {
                    source_metrics
                        .requests_failed
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    if let Some(pool) = self.proxy_pool.as_ref().filter(|_| proxy.is_some()) {
                        pool.report(false, elapsed).await;
                    }
                    last_error = ScrapeError::Network {
                        platform: source,
                        url: spec.url.clone(),
                        reason: e.to_string(),
                    };
                    self.backoff_and_rotate(source, proxy.as_deref(), attempt, &cfg).await;
                }
            }
        }

        Err(last_error)
    }

    async fn issue(
        &self,
        client: &reqwest::Client,
        timeout_seconds: &u64,
        config_headers: &std::collections::HashMap<String, String>,
        spec: &RequestSpec,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = client
            .request(spec.method.clone(), &spec.url)
            .timeout(Duration::from_secs(*timeout_seconds))
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9");

        for (k, v) in config_headers {
            request = request.header(k, v);
        }
        for (k, v) in &spec.headers {
            request = request.header(k, v);
        }
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body_json {
            request = request.json(body);
        }
        request.send().await
    }

    async fn backoff_and_rotate(
        &self,
        source: SourceTag,
        proxy: Option<&str>,
        attempt: u32,
        cfg: &crate::common::config::ScraperConfig,
    ) {
        if proxy.is_some() {
            self.metrics
                .for_source(source)
                .proxy_rotations
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        if attempt < cfg.max_retries {
            let wait = RETRY_BASE_DELAY * 2u32.pow(attempt);
            debug!(
                "{source}: attempt {} failed, retrying in {wait:?}",
                attempt + 1
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn limiter_for(
        &self,
        source: SourceTag,
        cfg: &crate::common::config::ScraperConfig,
    ) -> Arc<RateLimiter> {
        self.limiters
            .entry(source)
            .or_insert_with(|| Arc::new(RateLimiter::new(cfg.rate_limit, cfg.burst_size)))
            .clone()
    }

    /// Per-source cache namespace, created on first use with its sweeper.
    pub fn cache_for(&self, source: SourceTag) -> Option<Arc<CacheService>> {
        let settings = self.config.settings();
        if !settings.cache.enabled {
            return None;
        }
        let cache = self
            .caches
            .entry(source)
            .or_insert_with(|| {
                let cache = Arc::new(CacheService::new(
                    &settings.cache,
                    &settings.cache_dir,
                    &source.to_string(),
                ));
                let _sweeper = cache.spawn_sweeper(self.shutdown.clone());
                cache
            })
            .clone();
        Some(cache)
    }

    /// reqwest binds proxies per client, so each endpoint gets its own
    /// pooled client, capped to keep the map bounded.
    fn proxied_client(&self, endpoint: &str) -> Result<reqwest::Client, ScrapeError> {
        if let Some(existing) = self.proxied.get(endpoint) {
            return Ok(existing.clone());
        }
        if self.proxied.len() >= PROXIED_CLIENT_CAP {
            if let Some(stale) = self.proxied.iter().next().map(|e| e.key().clone()) {
                self.proxied.remove(&stale);
            }
        }
        let proxy = reqwest::Proxy::all(endpoint)
            .map_err(|e| ScrapeError::Config(format!("invalid proxy {endpoint}: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .proxy(proxy)
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ScrapeError::Config(format!("building proxied client: {e}")))?;
        self.proxied.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Settings;

    #[test]
    fn cache_key_ignores_query_order() {
        let a = RequestSpec::get("https://x/api").query("b", 2).query("a", 1);
        let b = RequestSpec::get("https://x/api").query("a", 1).query("b", 2);
        assert_eq!(
            a.cache_key(SourceTag::Waxpeer),
            b.cache_key(SourceTag::Waxpeer)
        );
    }

    #[test]
    fn cache_key_is_source_scoped() {
        let spec = RequestSpec::get("https://x/api");
        assert_ne!(
            spec.cache_key(SourceTag::Waxpeer),
            spec.cache_key(SourceTag::Skinport)
        );
        assert!(spec.cache_key(SourceTag::Waxpeer).starts_with("waxpeer:"));
    }

    #[test]
    fn bearer_header_is_attached() {
        let spec = RequestSpec::get("https://x/api").bearer("tok");
        assert!(spec
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer tok"));
    }

    #[tokio::test]
    async fn cache_disabled_yields_no_namespace() {
        let mut settings = Settings::default();
        settings.cache.enabled = false;
        let config = Arc::new(ConfigManager::from_settings(settings));
        let client = HttpClient::new(
            config,
            None,
            Arc::new(MetricsRegistry::new()),
            Shutdown::never(),
        )
        .unwrap();
        assert!(client.cache_for(SourceTag::Waxpeer).is_none());
    }
}
