//! src/common/config.rs
//!
//! Layered configuration: environment variables override the on-disk JSON
//! files (`config/settings.json`, `config/scrapers.json`), which override
//! built-in defaults. Secrets (API keys, proxy tokens) are only ever read
//! from the environment; secret-looking fields found on disk are dropped
//! with a warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::common::errors::ScrapeError;
use crate::markets::types::SourceTag;

pub const ENV_USE_PROXY: &str = "BOT_USE_PROXY";
pub const ENV_LOG_LEVEL: &str = "BOT_LOG_LEVEL";
pub const ENV_CACHE_ENABLED: &str = "BOT_CACHE_ENABLED";
pub const ENV_PROXY_AUTH_TOKEN: &str = "BOT_PROXY_AUTH_TOKEN";
pub const ENV_PROXY_ORDER_TOKEN: &str = "BOT_PROXY_ORDER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl_seconds: f64,
    pub compression_threshold: usize,
    pub disk_enabled: bool,
    pub policy: String, // "lru" | "lfu" | "ttl" | "adaptive"
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            max_entries: 1000,
            max_bytes: 100 * 1024 * 1024,
            default_ttl_seconds: 300.0,
            compression_threshold: 10 * 1024,
            disk_enabled: true,
            policy: "adaptive".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub num_pools: usize,
    pub proxies_per_pool: usize,
    pub rotation_pool_size: usize,
    pub error_threshold: u32,
    pub provider_url: String,
    /// Optional newline-delimited static list; bypasses the provider.
    pub proxy_file: Option<PathBuf>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        ProxySettings {
            num_pools: 3,
            proxies_per_pool: 1000,
            rotation_pool_size: 100,
            error_threshold: 4,
            provider_url: "https://api.oculusproxies.com/v1/configure/proxy/getProxies"
                .to_string(),
            proxy_file: None,
        }
    }
}

/// Provider credentials, environment-only.
#[derive(Debug, Clone)]
pub struct ProxyCredentials {
    pub auth_token: String,
    pub order_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub mode: String, // "fast" | "complete"
    pub min_profit_ratio: f64,
    pub min_price: f64,
    pub max_results: usize,
    pub interval_seconds: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            mode: "complete".to_string(),
            min_profit_ratio: 0.05,
            min_price: 1.0,
            max_results: 100,
            interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub use_proxy: bool,
    pub max_concurrent_scrapers: usize,
    pub shutdown_grace_seconds: u64,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache: CacheSettings,
    pub proxy: ProxySettings,
    pub engine: EngineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "info".to_string(),
            use_proxy: false,
            max_concurrent_scrapers: 5,
            shutdown_grace_seconds: 30,
            data_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("cache"),
            cache: CacheSettings::default(),
            proxy: ProxySettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

/// Per-scraper knobs. A source's block in `scrapers.json` overrides
/// `global_settings`, which overrides the built-in profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Requests per minute fed to the token bucket.
    pub rate_limit: f64,
    pub burst_size: u32,
    pub cache_ttl_seconds: f64,
    pub use_proxy: Option<bool>,
    /// Internal fan-out bound for paged / reference-driven adapters.
    pub max_concurrent: usize,
    pub max_pages: usize,
    pub consecutive_empty_limit: u32,
    pub headers: HashMap<String, String>,
    /// Empire coins -> USD. The upstream feed prices in site coins.
    pub coin_usd_rate: Option<f64>,
    /// CS.Trade advertises prices inflated by a bonus percentage.
    pub bonus_rate_percent: Option<f64>,
    /// Max staleness accepted from the external browser feed.
    pub feed_max_age_seconds: Option<u64>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            enabled: true,
            interval_seconds: 60,
            timeout_seconds: 30,
            max_retries: 3,
            rate_limit: 60.0,
            burst_size: 10,
            cache_ttl_seconds: 300.0,
            use_proxy: None,
            max_concurrent: 1,
            max_pages: 100,
            consecutive_empty_limit: 3,
            headers: HashMap::new(),
            coin_usd_rate: None,
            bonus_rate_percent: None,
            feed_max_age_seconds: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScrapersFile {
    #[serde(default)]
    global_settings: Value,
    #[serde(flatten)]
    sources: HashMap<String, Value>,
}

#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    scrapers: ScrapersFile,
}

impl ConfigManager {
    pub fn load(config_dir: &Path) -> Result<Self, ScrapeError> {
        let settings_value = read_json_file(&config_dir.join("settings.json"))?;
        let scrapers_value = read_json_file(&config_dir.join("scrapers.json"))?;

        let mut settings: Settings = match settings_value {
            Some(mut v) => {
                strip_secret_fields(&mut v, "settings.json");
                serde_json::from_value(v)
                    .map_err(|e| ScrapeError::Config(format!("settings.json: {e}")))?
            }
            None => Settings::default(),
        };

        let scrapers: ScrapersFile = match scrapers_value {
            Some(mut v) => {
                strip_secret_fields(&mut v, "scrapers.json");
                serde_json::from_value(v)
                    .map_err(|e| ScrapeError::Config(format!("scrapers.json: {e}")))?
            }
            None => ScrapersFile::default(),
        };

        apply_env_overrides(&mut settings);

        Ok(ConfigManager { settings, scrapers })
    }

    /// Build from in-memory settings; used by tests and embedding.
    pub fn from_settings(settings: Settings) -> Self {
        ConfigManager {
            settings,
            scrapers: ScrapersFile::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Merged config for one scraper: built-in profile <- global_settings
    /// <- source block.
    pub fn scraper(&self, tag: SourceTag) -> ScraperConfig {
        let mut value = match serde_json::to_value(builtin_profile(tag)) {
            Ok(v) => v,
            Err(_) => Value::Object(Default::default()),
        };
        merge_json(&mut value, &self.scrapers.global_settings);
        if let Some(block) = self.scrapers.sources.get(&tag.to_string()) {
            merge_json(&mut value, block);
        }
        match serde_json::from_value(value) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("invalid scraper config for {tag}, using built-in profile: {e}");
                builtin_profile(tag)
            }
        }
    }

    /// API keys are accepted from the environment only.
    pub fn api_key(&self, tag: SourceTag) -> Option<String> {
        std::env::var(tag.api_key_var())
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require_api_key(&self, tag: SourceTag) -> Result<String, ScrapeError> {
        self.api_key(tag).ok_or(ScrapeError::MissingApiKey {
            platform: tag,
            env_var: tag.api_key_var(),
        })
    }

    pub fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        let auth_token = std::env::var(ENV_PROXY_AUTH_TOKEN).ok()?;
        let order_token = std::env::var(ENV_PROXY_ORDER_TOKEN).ok()?;
        if auth_token.trim().is_empty() || order_token.trim().is_empty() {
            return None;
        }
        Some(ProxyCredentials {
            auth_token,
            order_token,
        })
    }

    /// Effective proxy decision for one scraper.
    pub fn use_proxy_for(&self, tag: SourceTag) -> bool {
        self.scraper(tag)
            .use_proxy
            .unwrap_or(self.settings.use_proxy)
    }
}

/// Built-in per-source tuning, mirroring how aggressively each upstream can
/// be polled.
fn builtin_profile(tag: SourceTag) -> ScraperConfig {
    let mut cfg = ScraperConfig::default();
    match tag {
        SourceTag::Cstrade => {
            cfg.rate_limit = 20.0;
            cfg.bonus_rate_percent = Some(50.0);
        }
        SourceTag::Empire => {
            cfg.coin_usd_rate = Some(0.6154);
            cfg.max_concurrent = 2;
        }
        SourceTag::Rapidskins => {
            cfg.rate_limit = 3.0;
            cfg.burst_size = 1;
            cfg.feed_max_age_seconds = Some(3600);
        }
        SourceTag::Tradeit | SourceTag::Skinout | SourceTag::Manncostore => {
            cfg.max_concurrent = 3;
        }
        SourceTag::Skindeck => {
            cfg.max_pages = 10;
        }
        SourceTag::SteamMarket => {
            cfg.max_concurrent = 100;
            cfg.rate_limit = 600.0;
            cfg.burst_size = 20;
            cfg.interval_seconds = 300;
        }
        SourceTag::SteamListing => {
            cfg.max_concurrent = 50;
            cfg.rate_limit = 600.0;
            cfg.burst_size = 20;
            cfg.max_pages = 1000;
            cfg.interval_seconds = 600;
        }
        SourceTag::SteamNameids => {
            cfg.max_concurrent = 10;
            cfg.interval_seconds = 3600;
        }
        _ => {}
    }
    cfg
}

fn read_json_file(path: &Path) -> Result<Option<Value>, ScrapeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ScrapeError::Config(format!("reading {}: {e}", path.display())))?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| ScrapeError::Config(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(value))
}

/// Secrets must not live on disk. Any field that looks like one is removed
/// before the file is interpreted.
fn strip_secret_fields(value: &mut Value, origin: &str) {
    const SECRET_MARKERS: &[&str] = &["api_key", "auth_token", "order_token", "password", "secret"];
    if let Value::Object(map) = value {
        let flagged: Vec<String> = map
            .keys()
            .filter(|k| {
                let lowered = k.to_lowercase();
                SECRET_MARKERS.iter().any(|m| lowered.contains(m))
            })
            .cloned()
            .collect();
        for key in flagged {
            warn!(
                "ignoring secret-looking field '{key}' in {origin}: secrets are only read from \
                 environment variables"
            );
            map.remove(&key);
        }
        for child in map.values_mut() {
            strip_secret_fields(child, origin);
        }
    }
}

/// Shallow-merge `src` object keys over `dst`; nested objects are replaced
/// wholesale, matching how the original layered its scraper config.
fn merge_json(dst: &mut Value, src: &Value) {
    if let (Value::Object(dst_map), Value::Object(src_map)) = (dst, src) {
        for (k, v) in src_map {
            dst_map.insert(k.clone(), v.clone());
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var(ENV_USE_PROXY) {
        if let Some(b) = parse_bool(&v) {
            settings.use_proxy = b;
        }
    }
    if let Ok(v) = std::env::var(ENV_CACHE_ENABLED) {
        if let Some(b) = parse_bool(&v) {
            settings.cache.enabled = b;
        }
    }
    if let Ok(v) = std::env::var(ENV_LOG_LEVEL) {
        if !v.trim().is_empty() {
            settings.log_level = v;
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(cfg.settings().max_concurrent_scrapers, 5);
        let waxpeer = cfg.scraper(SourceTag::Waxpeer);
        assert_eq!(waxpeer.max_retries, 3);
        assert_eq!(waxpeer.max_concurrent, 1);
    }

    #[test]
    fn source_block_overrides_global_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scrapers.json"),
            r#"{
                "global_settings": {"timeout_seconds": 15, "max_retries": 5},
                "waxpeer": {"max_retries": 2, "rate_limit": 20}
            }"#,
        )
        .unwrap();
        let cfg = ConfigManager::load(dir.path()).unwrap();

        let waxpeer = cfg.scraper(SourceTag::Waxpeer);
        assert_eq!(waxpeer.timeout_seconds, 15); // global
        assert_eq!(waxpeer.max_retries, 2); // source wins
        assert_eq!(waxpeer.rate_limit, 20.0);

        let skinport = cfg.scraper(SourceTag::Skinport);
        assert_eq!(skinport.max_retries, 5); // global only
    }

    #[test]
    fn builtin_profiles_survive_when_not_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(
            cfg.scraper(SourceTag::Cstrade).bonus_rate_percent,
            Some(50.0)
        );
        assert_eq!(cfg.scraper(SourceTag::Empire).coin_usd_rate, Some(0.6154));
        assert_eq!(cfg.scraper(SourceTag::SteamMarket).max_concurrent, 100);
    }

    #[test]
    fn secret_fields_on_disk_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scrapers.json"),
            r#"{"empire": {"api_key": "leaked", "rate_limit": 30}}"#,
        )
        .unwrap();
        let cfg = ConfigManager::load(dir.path()).unwrap();
        let empire = cfg.scraper(SourceTag::Empire);
        assert_eq!(empire.rate_limit, 30.0);
        // The on-disk key never becomes an API key.
        std::env::remove_var(SourceTag::Empire.api_key_var());
        assert!(cfg.api_key(SourceTag::Empire).is_none());
    }

    #[test]
    fn env_overrides_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"use_proxy": false, "log_level": "debug"}"#,
        )
        .unwrap();
        std::env::set_var(ENV_USE_PROXY, "true");
        let cfg = ConfigManager::load(dir.path()).unwrap();
        std::env::remove_var(ENV_USE_PROXY);
        assert!(cfg.settings().use_proxy);
        assert_eq!(cfg.settings().log_level, "debug");
    }

    #[test]
    fn missing_api_key_is_a_hard_error() {
        let cfg = ConfigManager::from_settings(Settings::default());
        std::env::remove_var(SourceTag::Shadowpay.api_key_var());
        let err = cfg.require_api_key(SourceTag::Shadowpay).unwrap_err();
        assert!(matches!(err, ScrapeError::MissingApiKey { .. }));
    }
}
