//! Per-source scrape metrics: request counters plus a rolling window of
//! response times. Counters are lock-free; the window sits behind a short
//! mutex.

use bounded_vec_deque::BoundedVecDeque;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::markets::types::SourceTag;

const RESPONSE_TIME_WINDOW: usize = 100;

#[derive(Debug)]
pub struct SourceMetrics {
    pub requests_made: AtomicU64,
    pub requests_successful: AtomicU64,
    pub requests_failed: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    pub proxy_rotations: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    response_times: Mutex<BoundedVecDeque<f64>>,
}

impl Default for SourceMetrics {
    fn default() -> Self {
        SourceMetrics {
            requests_made: AtomicU64::new(0),
            requests_successful: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            proxy_rotations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            response_times: Mutex::new(BoundedVecDeque::new(RESPONSE_TIME_WINDOW)),
        }
    }
}

impl SourceMetrics {
    pub fn record_response_time(&self, seconds: f64) {
        if let Ok(mut window) = self.response_times.lock() {
            window.push_back(seconds);
        }
    }

    pub fn avg_response_time(&self) -> f64 {
        match self.response_times.lock() {
            Ok(window) if !window.is_empty() => {
                window.iter().sum::<f64>() / window.len() as f64
            }
            _ => 0.0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        let made = self.requests_made.load(Ordering::Relaxed);
        if made == 0 {
            return 0.0;
        }
        self.requests_successful.load(Ordering::Relaxed) as f64 / made as f64 * 100.0
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64 * 100.0
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_successful: self.requests_successful.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            success_rate_pct: self.success_rate(),
            avg_response_time_secs: self.avg_response_time(),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            proxy_rotations: self.proxy_rotations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_hit_rate_pct: self.cache_hit_rate(),
        }
    }
}

/// Snapshot written into catalog metadata and run reports.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub requests_made: u64,
    pub requests_successful: u64,
    pub requests_failed: u64,
    pub success_rate_pct: f64,
    pub avg_response_time_secs: f64,
    pub rate_limit_hits: u64,
    pub proxy_rotations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate_pct: f64,
}

/// Process-wide registry, one `SourceMetrics` per source tag.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    by_source: DashMap<SourceTag, Arc<SourceMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_source(&self, tag: SourceTag) -> Arc<SourceMetrics> {
        self.by_source.entry(tag).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_start_at_zero() {
        let m = SourceMetrics::default();
        assert_eq!(m.success_rate(), 0.0);
        assert_eq!(m.avg_response_time(), 0.0);
        assert_eq!(m.cache_hit_rate(), 0.0);
    }

    #[test]
    fn response_window_is_bounded() {
        let m = SourceMetrics::default();
        for i in 0..250 {
            m.record_response_time(i as f64);
        }
        // Window keeps the last 100 samples: 150..=249.
        let avg = m.avg_response_time();
        assert!((avg - 199.5).abs() < 1e-9, "avg was {avg}");
    }

    #[test]
    fn registry_returns_same_instance() {
        let reg = MetricsRegistry::new();
        let a = reg.for_source(SourceTag::Waxpeer);
        a.requests_made.fetch_add(3, Ordering::Relaxed);
        let b = reg.for_source(SourceTag::Waxpeer);
        assert_eq!(b.requests_made.load(Ordering::Relaxed), 3);
    }
}
