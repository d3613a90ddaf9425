//! src/telemetry.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Process-wide counters, updated lock-free from every component.
#[derive(Clone, Debug)]
pub struct Metrics {
    pub scraper_runs_completed: Arc<AtomicU64>,
    pub scraper_runs_failed: Arc<AtomicU64>,
    pub items_scraped: Arc<AtomicU64>,
    pub snapshots_written: Arc<AtomicU64>,
    pub opportunities_found: Arc<AtomicU64>,
    pub engine_runs: Arc<AtomicU64>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scraper_runs_completed: Arc::new(AtomicU64::new(0)),
            scraper_runs_failed: Arc::new(AtomicU64::new(0)),
            items_scraped: Arc::new(AtomicU64::new(0)),
            snapshots_written: Arc::new(AtomicU64::new(0)),
            opportunities_found: Arc::new(AtomicU64::new(0)),
            engine_runs: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn inc_runs_completed(&self) {
        self.scraper_runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.scraper_runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_scraped(&self, count: u64) {
        self.items_scraped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_snapshots_written(&self) {
        self.snapshots_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_opportunities_found(&self, count: u64) {
        self.opportunities_found.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_engine_runs(&self) {
        self.engine_runs.fetch_add(1, Ordering::Relaxed);
    }
}

/// Install the tracing subscriber and hand back the global counters.
/// `default_level` comes from config; `RUST_LOG` still wins when set.
pub fn init_telemetry(default_level: &str) -> Arc<Metrics> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let formatting_layer = fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .init();

    Metrics::new()
}
