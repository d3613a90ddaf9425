//! Orchestration of adapter runs: a global concurrency cap, explicit
//! dependency phases for the Steam artifact chain, per-adapter interval
//! loops in forever mode, and graceful drain on shutdown.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::common::errors::ScrapeError;
use crate::markets::types::{Snapshot, SourceTag};
use crate::markets::{build_scraper, dedup_cheapest, ScraperDeps};
use crate::telemetry::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: SourceTag,
    pub status: RunStatus,
    pub items: usize,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ScraperRunner {
    deps: ScraperDeps,
    metrics: Arc<Metrics>,
    semaphore: Arc<Semaphore>,
    grace: Duration,
}

/// The Steam artifact chain imposes ordering in one-shot runs: the listing
/// crawl feeds the name-id resolver, which feeds the histogram crawl.
/// Everything else is independent.
fn phase(tag: SourceTag) -> u8 {
    match tag {
        SourceTag::SteamNameids => 1,
        SourceTag::SteamMarket => 2,
        _ => 0,
    }
}

impl ScraperRunner {
    pub fn new(deps: ScraperDeps, metrics: Arc<Metrics>) -> Self {
        let settings = deps.config.settings();
        let slots = settings.max_concurrent_scrapers.max(1);
        let grace = Duration::from_secs(settings.shutdown_grace_seconds);
        ScraperRunner {
            deps,
            metrics,
            semaphore: Arc::new(Semaphore::new(slots)),
            grace,
        }
    }

    /// Run each selected adapter once, dependency phases in order,
    /// concurrent within a phase under the global cap.
    pub async fn run_once(&self, tags: &[SourceTag]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(tags.len());
        for current_phase in 0u8..=2 {
            let phase_tags: Vec<SourceTag> = tags
                .iter()
                .copied()
                .filter(|t| phase(*t) == current_phase)
                .collect();
            if phase_tags.is_empty() {
                continue;
            }
            let runs = phase_tags.into_iter().map(|tag| self.run_one(tag));
            reports.extend(futures::future::join_all(runs).await);
            if self.deps.shutdown.is_cancelled() {
                break;
            }
        }
        reports
    }

    /// Independent interval loops per adapter until shutdown, then a
    /// bounded grace period for in-flight runs.
    pub async fn run_forever(&self, tags: &[SourceTag]) {
        let loops = tags.iter().copied().map(|tag| {
            let interval = Duration::from_secs(self.deps.config.scraper(tag).interval_seconds);
            async move {
                loop {
                    let report = self.run_one(tag).await;
                    if let Some(err) = &report.error {
                        warn!("{tag}: run ended with error: {err}");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = self.deps.shutdown.cancelled() => break,
                    }
                    if self.deps.shutdown.is_cancelled() {
                        break;
                    }
                }
            }
        });

        let drained = futures::future::join_all(loops);
        tokio::pin!(drained);

        tokio::select! {
            _ = &mut drained => {}
            _ = self.deps.shutdown.cancelled() => {
                info!("shutdown requested, draining in-flight scrapers ({:?} grace)", self.grace);
                if tokio::time::timeout(self.grace, &mut drained).await.is_err() {
                    warn!("grace period elapsed, abandoning in-flight scrapers");
                }
            }
        }
    }

    async fn run_one(&self, tag: SourceTag) -> RunReport {
        let started = Instant::now();

        if !self.deps.config.scraper(tag).enabled {
            return RunReport {
                source: tag,
                status: RunStatus::Error,
                items: 0,
                duration_secs: 0.0,
                error: Some("disabled by config".to_string()),
            };
        }

        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return self.error_report(tag, started, ScrapeError::Cancelled),
            },
            _ = self.deps.shutdown.cancelled() => {
                return self.error_report(tag, started, ScrapeError::Cancelled);
            }
        };

        let scraper = match build_scraper(tag, &self.deps) {
            Ok(s) => s,
            Err(e) => {
                drop(permit);
                return self.error_report(tag, started, e);
            }
        };

        info!("{tag}: scrape starting");
        let result = scraper.scrape().await;
        drop(permit);

        match result {
            Ok(items) => {
                let items = dedup_cheapest(items);
                let count = items.len();
                self.metrics.inc_runs_completed();
                self.metrics.add_items_scraped(count as u64);
                crate::markets::log_price_stats(tag, &items);

                if scraper.persists_catalog() {
                    let summary = self.deps.http.metrics.for_source(tag).summary();
                    let snapshot = Snapshot::new(tag, items);
                    if let Err(e) = self.deps.catalog.save_snapshot(&snapshot, Some(&summary)) {
                        error!("{tag}: snapshot write failed: {e}");
                        return RunReport {
                            source: tag,
                            status: RunStatus::Error,
                            items: count,
                            duration_secs: started.elapsed().as_secs_f64(),
                            error: Some(e.to_string()),
                        };
                    }
                    self.metrics.inc_snapshots_written();
                }

                let status = if count > 0 || !scraper.persists_catalog() {
                    RunStatus::Success
                } else {
                    RunStatus::Partial
                };
                info!(
                    "{tag}: scrape finished with {count} items in {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                RunReport {
                    source: tag,
                    status,
                    items: count,
                    duration_secs: started.elapsed().as_secs_f64(),
                    error: None,
                }
            }
            Err(e) => self.error_report(tag, started, e),
        }
    }

    fn error_report(&self, tag: SourceTag, started: Instant, error: ScrapeError) -> RunReport {
        if !matches!(error, ScrapeError::Cancelled) {
            error!("{tag}: scrape failed: {error}");
        }
        self.metrics.inc_runs_failed();
        RunReport {
            source: tag,
            status: RunStatus::Error,
            items: 0,
            duration_secs: started.elapsed().as_secs_f64(),
            error: Some(error.to_string()),
        }
    }
}
