//! Two-tier TTL cache: a bounded in-memory map with selectable eviction,
//! backed by an optional write-through disk tier (one hashed file per key).
//! A background sweep expires stale entries every five minutes and, under
//! the adaptive policy, retunes per-entry TTLs from observed access rates.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::common::config::CacheSettings;
use crate::common::shutdown::Shutdown;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Ttl,
    Adaptive,
}

impl EvictionPolicy {
    pub fn parse(raw: &str) -> EvictionPolicy {
        match raw.to_lowercase().as_str() {
            "lru" => EvictionPolicy::Lru,
            "lfu" => EvictionPolicy::Lfu,
            "ttl" => EvictionPolicy::Ttl,
            _ => EvictionPolicy::Adaptive,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    /// Serialized JSON, zlib-deflated when `compressed`.
    payload: Vec<u8>,
    size: usize,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    ttl_secs: f64,
    compressed: bool,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at).as_secs_f64() > self.ttl_secs
    }

    fn age_secs(&self, now: Instant) -> f64 {
        now.duration_since(self.created_at).as_secs_f64()
    }

    /// Hot entries keep their data longer, cold entries shorter.
    fn adaptive_ttl(&self, now: Instant) -> f64 {
        let age = self.age_secs(now);
        if age == 0.0 {
            return self.ttl_secs;
        }
        let per_hour = self.access_count as f64 / age * 3600.0;
        if per_hour > 10.0 {
            self.ttl_secs * 2.0
        } else if per_hour > 5.0 {
            self.ttl_secs * 1.5
        } else if per_hour < 1.0 {
            self.ttl_secs * 0.5
        } else {
            self.ttl_secs
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub total_bytes: usize,
    pub compression_saved_bytes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    compression_saved: u64,
    disk_warned: bool,
}

#[derive(Debug)]
pub struct CacheService {
    namespace: String,
    policy: EvictionPolicy,
    max_entries: usize,
    max_bytes: usize,
    default_ttl_secs: f64,
    compression_threshold: usize,
    disk_dir: Option<PathBuf>,
    inner: Mutex<CacheInner>,
}

/// On-disk entry format (one JSON file per key).
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DiskEntry {
    key: String,
    value: serde_json::Value,
    created_at: f64,
    ttl: f64,
}

impl CacheService {
    pub fn new(settings: &CacheSettings, cache_dir: &Path, namespace: &str) -> Self {
        let disk_dir = if settings.disk_enabled {
            let dir = cache_dir.join("data").join(namespace);
            match std::fs::create_dir_all(&dir) {
                Ok(()) => Some(dir),
                Err(e) => {
                    warn!("cache: cannot create {}, disk tier disabled: {e}", dir.display());
                    None
                }
            }
        } else {
            None
        };

        CacheService {
            namespace: namespace.to_string(),
            policy: EvictionPolicy::parse(&settings.policy),
            max_entries: settings.max_entries.max(1),
            max_bytes: settings.max_bytes.max(1),
            default_ttl_secs: settings.default_ttl_seconds,
            compression_threshold: settings.compression_threshold,
            disk_dir,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let mut drop_entry = false;
        let mut hit = None;
        if let Some(entry) = inner.map.get_mut(key) {
            if entry.is_expired(now) {
                drop_entry = true;
            } else {
                entry.last_accessed = now;
                entry.access_count += 1;
                match decode_payload(entry.payload.clone(), entry.compressed) {
                    Some(v) => hit = Some(v),
                    // Undecodable payload is as good as absent.
                    None => drop_entry = true,
                }
            }
        }
        if drop_entry {
            if let Some(entry) = inner.map.remove(key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
            }
        }
        if let Some(v) = hit {
            inner.hits += 1;
            return Some(v);
        }

        // Disk tier, promoting hits back into memory.
        if let Some(value) = self.disk_get(&mut inner, key) {
            inner.hits += 1;
            self.insert_locked(&mut inner, key, &value, self.default_ttl_secs, false);
            return Some(value);
        }

        inner.misses += 1;
        None
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<f64>) {
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("cache {}: unserializable value for {key}: {e}", self.namespace);
                return;
            }
        };
        let mut inner = self.inner.lock().await;
        self.insert_locked(&mut inner, key, &json, ttl, true);
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let existed = match inner.map.remove(key) {
            Some(entry) => {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
                true
            }
            None => false,
        };
        if let Some(dir) = &self.disk_dir {
            let _ = std::fs::remove_file(dir.join(hashed_file_name(key)));
        }
        existed
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.map.clear();
        inner.total_bytes = 0;
        if let Some(dir) = &self.disk_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        info!("cache {} cleared", self.namespace);
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.map.len(),
            total_bytes: inner.total_bytes,
            compression_saved_bytes: inner.compression_saved,
        }
    }

    /// Periodic maintenance: drop expired entries, retune adaptive TTLs.
    /// Runs until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        cache.sweep().await;
                    }
                    _ = shutdown.cancelled() => {
                        debug!("cache {} sweeper stopping", cache.namespace);
                        break;
                    }
                }
            }
        })
    }

    pub async fn sweep(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = inner.map.remove(key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
            }
            if let Some(dir) = &self.disk_dir {
                let _ = std::fs::remove_file(dir.join(hashed_file_name(key)));
            }
        }
        if !expired.is_empty() {
            debug!("cache {}: swept {} expired entries", self.namespace, expired.len());
        }

        if self.policy == EvictionPolicy::Adaptive {
            for entry in inner.map.values_mut() {
                entry.ttl_secs = entry.adaptive_ttl(now);
            }
        }
    }

    fn insert_locked(
        &self,
        inner: &mut CacheInner,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: f64,
        write_disk: bool,
    ) {
        let serialized = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                warn!("cache {}: serialization failed for {key}: {e}", self.namespace);
                return;
            }
        };
        let raw_size = serialized.len();

        let (payload, compressed) = if raw_size > self.compression_threshold {
            match compress(&serialized) {
                Some(packed) if packed.len() < raw_size => {
                    inner.compression_saved += (raw_size - packed.len()) as u64;
                    (packed, true)
                }
                _ => (serialized, false),
            }
        } else {
            (serialized, false)
        };
        let size = payload.len();

        // Replacing an entry releases its budget before the space check.
        if let Some(old) = inner.map.remove(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.size);
        }
        self.ensure_space(inner, size);

        let now = Instant::now();
        inner.map.insert(
            key.to_string(),
            CacheEntry {
                payload,
                size,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                ttl_secs,
                compressed,
            },
        );
        inner.total_bytes += size;

        if write_disk {
            self.disk_set(inner, key, value, ttl_secs);
        }
    }

    fn ensure_space(&self, inner: &mut CacheInner, incoming: usize) {
        while inner.map.len() >= self.max_entries {
            if !self.evict_one(inner) {
                break;
            }
        }
        while inner.total_bytes + incoming > self.max_bytes {
            if !self.evict_one(inner) {
                break;
            }
        }
    }

    fn evict_one(&self, inner: &mut CacheInner) -> bool {
        let now = Instant::now();
        let victim = match self.policy {
            EvictionPolicy::Lru => inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.access_count)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Ttl => inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Adaptive => inner
                .map
                .iter()
                .min_by(|(_, a), (_, b)| {
                    adaptive_score(a, now)
                        .partial_cmp(&adaptive_score(b, now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(k, _)| k.clone()),
        };
        match victim {
            Some(key) => {
                if let Some(entry) = inner.map.remove(&key) {
                    inner.total_bytes = inner.total_bytes.saturating_sub(entry.size);
                }
                inner.evictions += 1;
                true
            }
            None => false,
        }
    }

    fn disk_set(&self, inner: &mut CacheInner, key: &str, value: &serde_json::Value, ttl: f64) {
        let Some(dir) = &self.disk_dir else {
            return;
        };
        let entry = DiskEntry {
            key: key.to_string(),
            value: value.clone(),
            created_at: unix_now(),
            ttl,
        };
        let path = dir.join(hashed_file_name(key));
        let result = serde_json::to_vec(&entry)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| e.to_string()));
        if let Err(e) = result {
            if !inner.disk_warned {
                warn!(
                    "cache {}: disk write failed, continuing memory-only: {e}",
                    self.namespace
                );
                inner.disk_warned = true;
            }
        }
    }

    fn disk_get(&self, inner: &mut CacheInner, key: &str) -> Option<serde_json::Value> {
        let dir = self.disk_dir.as_ref()?;
        let path = dir.join(hashed_file_name(key));
        if !path.exists() {
            return None;
        }
        let raw = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                if !inner.disk_warned {
                    warn!("cache {}: disk read failed: {e}", self.namespace);
                    inner.disk_warned = true;
                }
                return None;
            }
        };
        let entry: DiskEntry = serde_json::from_slice(&raw).ok()?;
        if unix_now() - entry.created_at > entry.ttl {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        Some(entry.value)
    }
}

fn adaptive_score(entry: &CacheEntry, now: Instant) -> f64 {
    let age = entry.age_secs(now);
    if age == 0.0 {
        return f64::INFINITY;
    }
    entry.access_count as f64 / age
}

fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(6));
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

fn decompress(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn decode_payload(payload: Vec<u8>, compressed: bool) -> Option<serde_json::Value> {
    let bytes = if compressed {
        decompress(&payload)?
    } else {
        payload
    };
    serde_json::from_slice(&bytes).ok()
}

fn hashed_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}.cache", hasher.finalize())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> CacheSettings {
        CacheSettings {
            disk_enabled: false,
            ..CacheSettings::default()
        }
    }

    fn memory_cache(settings: CacheSettings) -> CacheService {
        let dir = std::env::temp_dir();
        CacheService::new(&settings, &dir, "test")
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = memory_cache(settings());
        cache.set("k", &json!({"a": 1}), None).await;
        let got: serde_json::Value = cache.get("k").await.unwrap();
        assert_eq!(got, json!({"a": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = memory_cache(settings());
        cache.set("k", &json!(42), Some(10.0)).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get::<i64>("k").await, Some(42));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get::<i64>("k").await, None);
    }

    #[tokio::test]
    async fn entry_budget_is_enforced() {
        let mut s = settings();
        s.max_entries = 3;
        let cache = memory_cache(s);
        for i in 0..10 {
            cache.set(&format!("k{i}"), &json!(i), None).await;
        }
        let stats = cache.stats().await;
        assert!(stats.entries <= 3, "entries = {}", stats.entries);
        assert!(stats.evictions >= 7);
    }

    #[tokio::test]
    async fn byte_budget_is_enforced() {
        let mut s = settings();
        s.max_bytes = 2000;
        let cache = memory_cache(s);
        let blob = "x".repeat(400);
        for i in 0..20 {
            cache.set(&format!("k{i}"), &json!(blob.clone()), None).await;
        }
        let stats = cache.stats().await;
        assert!(stats.total_bytes <= 2000, "bytes = {}", stats.total_bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn lru_evicts_least_recently_used() {
        let mut s = settings();
        s.max_entries = 2;
        s.policy = "lru".to_string();
        let cache = memory_cache(s);
        cache.set("a", &json!(1), None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("b", &json!(2), None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touch "a" so "b" becomes the LRU victim.
        cache.get::<i64>("a").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("c", &json!(3), None).await;
        assert_eq!(cache.get::<i64>("a").await, Some(1));
        assert_eq!(cache.get::<i64>("b").await, None);
        assert_eq!(cache.get::<i64>("c").await, Some(3));
    }

    #[tokio::test]
    async fn lfu_evicts_least_frequently_used() {
        let mut s = settings();
        s.max_entries = 2;
        s.policy = "lfu".to_string();
        let cache = memory_cache(s);
        cache.set("hot", &json!(1), None).await;
        cache.set("cold", &json!(2), None).await;
        for _ in 0..5 {
            cache.get::<i64>("hot").await;
        }
        cache.set("new", &json!(3), None).await;
        assert_eq!(cache.get::<i64>("hot").await, Some(1));
        assert_eq!(cache.get::<i64>("cold").await, None);
    }

    #[tokio::test]
    async fn large_values_are_compressed() {
        let cache = memory_cache(settings());
        // Highly repetitive 50 KiB payload, far over the 10 KiB threshold.
        let blob = "abcdefgh".repeat(50 * 1024 / 8);
        cache.set("big", &json!(blob.clone()), None).await;
        let stats = cache.stats().await;
        assert!(stats.compression_saved_bytes > 0);
        assert!(stats.total_bytes < blob.len());
        let got: String = cache.get("big").await.unwrap();
        assert_eq!(got, blob);
    }

    #[tokio::test]
    async fn disk_tier_survives_memory_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings();
        s.disk_enabled = true;
        s.max_entries = 1;
        let cache = CacheService::new(&s, dir.path(), "waxpeer");
        cache.set("a", &json!("first"), Some(300.0)).await;
        cache.set("b", &json!("second"), Some(300.0)).await; // evicts "a" from memory
        let got: String = cache.get("a").await.unwrap(); // promoted from disk
        assert_eq!(got, "first");
        // The hashed file lives under cache/data/<namespace>/.
        let files: Vec<_> = std::fs::read_dir(dir.path().join("data").join("waxpeer"))
            .unwrap()
            .collect();
        assert!(!files.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings();
        s.disk_enabled = true;
        let cache = CacheService::new(&s, dir.path(), "t");
        cache.set("k", &json!(1), None).await;
        assert!(cache.delete("k").await);
        assert_eq!(cache.get::<i64>("k").await, None);
        assert!(!cache.delete("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_expires_and_retunes_adaptive_ttl() {
        let cache = memory_cache(settings());
        cache.set("stale", &json!(1), Some(10.0)).await;
        cache.set("cold", &json!(2), Some(1000.0)).await;
        tokio::time::advance(Duration::from_secs(600)).await;
        cache.sweep().await;
        // "stale" expired; "cold" saw no accesses over 10 minutes, so the
        // adaptive pass halves its TTL.
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        let inner = cache.inner.lock().await;
        let cold = inner.map.get("cold").unwrap();
        assert!((cold.ttl_secs - 500.0).abs() < 1e-6);
    }
}
