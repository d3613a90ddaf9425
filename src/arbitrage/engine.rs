//! Cross-marketplace comparison against the Steam reference table.

use chrono::Utc;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{ComputeMode, Opportunity, OpportunityBatch, OpportunitySnapshot};
use crate::catalog::{CatalogStore, OPPORTUNITIES_FILE};
use crate::common::config::EngineSettings;
use crate::common::constants::{search_url_base, STEAM_LISTING_URL_BASE};
use crate::common::errors::ScrapeError;
use crate::fees;
use crate::markets::encode_name;
use crate::markets::types::SourceTag;
use crate::telemetry::Metrics;

#[derive(Debug, Clone)]
pub struct EngineParams {
    pub mode: ComputeMode,
    pub min_ratio: f64,
    pub min_price: f64,
    pub max_results: usize,
}

impl EngineParams {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        EngineParams {
            mode: settings.mode.parse().unwrap_or(ComputeMode::Complete),
            min_ratio: settings.min_profit_ratio,
            min_price: settings.min_price,
            max_results: settings.max_results,
        }
    }
}

pub struct ArbitrageEngine {
    catalog: Arc<CatalogStore>,
    metrics: Arc<Metrics>,
}

impl ArbitrageEngine {
    pub fn new(catalog: Arc<CatalogStore>, metrics: Arc<Metrics>) -> Self {
        ArbitrageEngine { catalog, metrics }
    }

    /// One full pass: compute, persist the rotated snapshot, return the
    /// ranked opportunities.
    pub fn run(&self, params: &EngineParams) -> Result<Vec<Opportunity>, ScrapeError> {
        let opportunities = self.compute(params);
        self.save_snapshot(params.mode, &opportunities)?;
        self.metrics.inc_engine_runs();
        self.metrics
            .add_opportunities_found(opportunities.len() as u64);
        Ok(opportunities)
    }

    pub fn compute(&self, params: &EngineParams) -> Vec<Opportunity> {
        let started = std::time::Instant::now();
        let reference = self.catalog.load_reference_table();
        if reference.is_empty() {
            info!("arbitrage: no reference prices available, nothing to compare");
            return Vec::new();
        }

        let mut opportunities = Vec::new();
        let mut analyzed = 0usize;
        let mut sources_seen = 0usize;

        for source in SourceTag::marketplaces() {
            let items = self.catalog.load_items(source);
            if items.is_empty() {
                continue;
            }
            sources_seen += 1;
            let mut found_here = 0usize;

            for item in &items {
                analyzed += 1;
                if item.name.is_empty() || item.price < params.min_price {
                    continue;
                }
                let Some(&gross) = reference.get(&item.name) else {
                    continue;
                };
                if gross <= item.price {
                    continue;
                }

                let (net, profit_abs, profit_ratio) = match params.mode {
                    ComputeMode::Complete => {
                        let net = fees::net_price_f64(gross);
                        let (abs, ratio) = fees::profit_f64(gross, item.price);
                        (net, abs, ratio)
                    }
                    ComputeMode::Fast => {
                        let abs = gross - item.price;
                        (gross, abs, abs / item.price)
                    }
                };
                if profit_ratio < params.min_ratio {
                    continue;
                }

                let buy_url = item.url.clone().unwrap_or_else(|| {
                    search_url_base(source)
                        .map(|base| format!("{base}{}", encode_name(&item.name)))
                        .unwrap_or_default()
                });
                opportunities.push(Opportunity {
                    name: item.name.clone(),
                    buy_source: source,
                    buy_price: item.price,
                    buy_url,
                    reference_gross_price: gross,
                    reference_net_price: net,
                    profit_absolute: profit_abs,
                    profit_ratio,
                    reference_url: format!(
                        "{STEAM_LISTING_URL_BASE}{}",
                        encode_name(&item.name)
                    ),
                    computed_at: Utc::now(),
                });
                found_here += 1;
            }
            debug!("arbitrage: {source}: {found_here} of {} items qualified", items.len());
        }

        let ranked: Vec<Opportunity> = opportunities
            .into_iter()
            .sorted_by(|a, b| {
                b.profit_ratio
                    .partial_cmp(&a.profit_ratio)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .take(params.max_results)
            .collect();

        info!(
            "arbitrage: {} opportunities from {sources_seen} sources ({analyzed} items) in {:?}",
            ranked.len(),
            started.elapsed()
        );
        ranked
    }

    /// Rotate the persisted snapshot: old `current` joins the history,
    /// history is trimmed, the file is replaced atomically.
    pub fn save_snapshot(
        &self,
        mode: ComputeMode,
        opportunities: &[Opportunity],
    ) -> Result<(), ScrapeError> {
        let mut snapshot: OpportunitySnapshot = self
            .catalog
            .read_json(OPPORTUNITIES_FILE)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        snapshot.rotate(OpportunityBatch {
            timestamp: Utc::now().to_rfc3339(),
            total_opportunities: opportunities.len(),
            mode,
            opportunities: opportunities.to_vec(),
        });

        let value = serde_json::to_value(&snapshot)
            .map_err(|e| ScrapeError::Cache(format!("serializing snapshot: {e}")))?;
        self.catalog.write_json(OPPORTUNITIES_FILE, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::types::{Listing, Snapshot};

    fn engine_with_catalog() -> (tempfile::TempDir, ArbitrageEngine, Arc<CatalogStore>) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(CatalogStore::new(dir.path()).unwrap());
        let engine = ArbitrageEngine::new(catalog.clone(), Metrics::new());
        (dir, engine, catalog)
    }

    fn seed(catalog: &CatalogStore, source: SourceTag, items: &[(&str, f64)]) {
        let listings = items
            .iter()
            .map(|(n, p)| Listing::new(source, *n, *p))
            .collect();
        catalog
            .save_snapshot(&Snapshot::new(source, listings), None)
            .unwrap();
    }

    fn params(mode: ComputeMode, min_ratio: f64, min_price: f64) -> EngineParams {
        EngineParams {
            mode,
            min_ratio,
            min_price,
            max_results: 100,
        }
    }

    #[test]
    fn complete_mode_end_to_end() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(&catalog, SourceTag::SteamMarket, &[("A", 1.00), ("B", 2.00)]);
        seed(&catalog, SourceTag::Waxpeer, &[("A", 0.50), ("B", 1.90)]);

        let opps = engine.compute(&params(ComputeMode::Complete, 0.05, 0.10));
        // net(1.00)=0.87 -> A profits 0.37 (74%); net(2.00)=1.73 < 1.90 so
        // B is not profitable at all.
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].name, "A");
        assert_eq!(opps[0].reference_net_price, 0.87);
        assert!((opps[0].profit_ratio - 0.74).abs() < 1e-9);
        assert!(opps[0].buy_url.contains("waxpeer.com"));
        assert!(opps[0].reference_url.contains("steamcommunity.com"));
    }

    #[test]
    fn fast_mode_uses_gross_spread() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(&catalog, SourceTag::SteamMarket, &[("A", 1.00)]);
        seed(&catalog, SourceTag::Waxpeer, &[("A", 0.50)]);

        let opps = engine.compute(&params(ComputeMode::Fast, 0.05, 0.10));
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].profit_absolute, 0.50);
        assert_eq!(opps[0].reference_net_price, 1.00);
    }

    #[test]
    fn filters_min_price_and_min_ratio() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(&catalog, SourceTag::SteamMarket, &[("Cheap", 0.50), ("Thin", 100.0)]);
        seed(&catalog, SourceTag::Waxpeer, &[("Cheap", 0.10), ("Thin", 99.0)]);

        // "Cheap" fails the price floor, "Thin" fails the ratio floor.
        let opps = engine.compute(&params(ComputeMode::Fast, 0.05, 1.0));
        assert!(opps.is_empty());
    }

    #[test]
    fn output_is_sorted_by_ratio_descending() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(
            &catalog,
            SourceTag::SteamMarket,
            &[("Small Edge", 10.0), ("Big Edge", 10.0)],
        );
        seed(
            &catalog,
            SourceTag::Waxpeer,
            &[("Small Edge", 9.0), ("Big Edge", 5.0)],
        );

        let opps = engine.compute(&params(ComputeMode::Fast, 0.01, 1.0));
        assert_eq!(opps.len(), 2);
        assert_eq!(opps[0].name, "Big Edge");
        assert!(opps[0].profit_ratio >= opps[1].profit_ratio);
    }

    #[test]
    fn max_results_truncates() {
        let (_dir, engine, catalog) = engine_with_catalog();
        let names: Vec<String> = (0..20).map(|i| format!("Item {i}")).collect();
        let reference: Vec<(&str, f64)> = names.iter().map(|n| (n.as_str(), 10.0)).collect();
        let buys: Vec<(&str, f64)> = names.iter().map(|n| (n.as_str(), 5.0)).collect();
        seed(&catalog, SourceTag::SteamMarket, &reference);
        seed(&catalog, SourceTag::Waxpeer, &buys);

        let mut p = params(ComputeMode::Fast, 0.01, 1.0);
        p.max_results = 5;
        assert_eq!(engine.compute(&p).len(), 5);
    }

    #[test]
    fn snapshot_history_is_bounded() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(&catalog, SourceTag::SteamMarket, &[("A", 10.0)]);
        seed(&catalog, SourceTag::Waxpeer, &[("A", 5.0)]);

        let p = params(ComputeMode::Fast, 0.01, 1.0);
        for _ in 0..13 {
            engine.run(&p).unwrap();
        }
        let value = catalog.read_json(OPPORTUNITIES_FILE).unwrap();
        let snapshot: OpportunitySnapshot = serde_json::from_value(value).unwrap();
        assert!(snapshot.current.is_some());
        assert_eq!(snapshot.history.len(), 10);
        assert!(snapshot.last_updated.is_some());
    }

    #[test]
    fn missing_reference_table_yields_nothing() {
        let (_dir, engine, catalog) = engine_with_catalog();
        seed(&catalog, SourceTag::Waxpeer, &[("A", 5.0)]);
        assert!(engine.compute(&params(ComputeMode::Fast, 0.01, 1.0)).is_empty());
    }
}
