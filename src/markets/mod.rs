//! One adapter per marketplace. All adapters speak the same contract
//! (`MarketScraper`) against the shared HTTP client; `build_scraper` is the
//! explicit compile-time registry mapping a source tag to its adapter.

pub mod bitskins;
pub mod csdeals;
pub mod cstrade;
pub mod empire;
pub mod lisskins;
pub mod manncostore;
pub mod marketcsgo;
pub mod rapidskins;
pub mod shadowpay;
pub mod skindeck;
pub mod skinout;
pub mod skinport;
pub mod steam_listing;
pub mod steam_market;
pub mod steam_nameids;
pub mod tradeit;
pub mod types;
pub mod waxpeer;
pub mod white;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::common::config::ConfigManager;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::HttpClient;
use types::{Listing, SourceTag};

/// Shared collaborators handed to every adapter.
#[derive(Clone)]
pub struct ScraperDeps {
    pub http: Arc<HttpClient>,
    pub config: Arc<ConfigManager>,
    pub catalog: Arc<CatalogStore>,
    pub shutdown: Shutdown,
}

#[async_trait]
pub trait MarketScraper: Send + Sync {
    fn source(&self) -> SourceTag;

    /// One complete catalog pass. Partial results are acceptable when an
    /// upstream page fails mid-run.
    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError>;

    /// Whether the runtime should persist this adapter's output as a
    /// catalog snapshot. Sub-adapters that maintain sibling artifacts
    /// (name-ids) opt out.
    fn persists_catalog(&self) -> bool {
        true
    }
}

/// Compile-time adapter registry.
pub fn build_scraper(
    tag: SourceTag,
    deps: &ScraperDeps,
) -> Result<Box<dyn MarketScraper>, ScrapeError> {
    let scraper: Box<dyn MarketScraper> = match tag {
        SourceTag::Waxpeer => Box::new(waxpeer::WaxpeerScraper::new(deps)),
        SourceTag::Skinport => Box::new(skinport::SkinportScraper::new(deps)),
        SourceTag::Csdeals => Box::new(csdeals::CsDealsScraper::new(deps)),
        SourceTag::Marketcsgo => Box::new(marketcsgo::MarketCsgoScraper::new(deps)),
        SourceTag::White => Box::new(white::WhiteScraper::new(deps)),
        SourceTag::Lisskins => Box::new(lisskins::LisSkinsScraper::new(deps)),
        SourceTag::Cstrade => Box::new(cstrade::CsTradeScraper::new(deps)),
        SourceTag::Bitskins => Box::new(bitskins::BitskinsScraper::new(deps)),
        SourceTag::Shadowpay => Box::new(shadowpay::ShadowpayScraper::new(deps)?),
        SourceTag::Skindeck => Box::new(skindeck::SkindeckScraper::new(deps)?),
        SourceTag::Tradeit => Box::new(tradeit::TradeitScraper::new(deps)),
        SourceTag::Skinout => Box::new(skinout::SkinoutScraper::new(deps)),
        SourceTag::Manncostore => Box::new(manncostore::ManncoStoreScraper::new(deps)),
        SourceTag::Empire => Box::new(empire::EmpireScraper::new(deps)?),
        SourceTag::Rapidskins => Box::new(rapidskins::RapidskinsScraper::new(deps)),
        SourceTag::SteamListing => Box::new(steam_listing::SteamListingScraper::new(deps)),
        SourceTag::SteamMarket => Box::new(steam_market::SteamMarketScraper::new(deps)),
        SourceTag::SteamNameids => Box::new(steam_nameids::SteamNameIdsScraper::new(deps)),
    };
    Ok(scraper)
}

/// Shared normalization: trim and keep names slash-free so they are safe in
/// file paths and deep links.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().replace('/', "-")
}

/// Minimal percent-encoding matching the deep-link templates the sites
/// themselves use.
pub fn encode_name(name: &str) -> String {
    name.replace(' ', "%20").replace('|', "%7C")
}

pub fn valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Upstream feeds are inconsistent about numeric types; accept numbers and
/// numeric strings alike.
pub fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn valid_name(name: &str) -> bool {
    let len = name.chars().count();
    (2..=300).contains(&len)
}

/// Log the price distribution of a finished snapshot, matching what the
/// per-source runs report.
pub fn log_price_stats(tag: SourceTag, items: &[Listing]) {
    if items.is_empty() {
        return;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for item in items {
        min = min.min(item.price);
        max = max.max(item.price);
        sum += item.price;
    }
    tracing::info!(
        "{tag}: {} items, avg ${:.2}, range ${:.2}-${:.2}",
        items.len(),
        sum / items.len() as f64,
        min,
        max
    );
}

/// Enforce the snapshot invariant: one listing per name, cheapest wins,
/// first-seen order preserved.
pub fn dedup_cheapest(items: Vec<Listing>) -> Vec<Listing> {
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Listing> = Vec::with_capacity(items.len());
    for item in items {
        match by_name.get(&item.name) {
            Some(&idx) => {
                if item.price < out[idx].price {
                    out[idx] = item;
                }
            }
            None => {
                by_name.insert(item.name.clone(), out.len());
                out.push(item);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_name("  StatTrak™ M4A4 / Howl  ");
        let twice = normalize_name(&once);
        assert_eq!(once, "StatTrak™ M4A4 - Howl");
        assert_eq!(once, twice);
    }

    #[test]
    fn encoding_covers_spaces_and_pipes() {
        assert_eq!(
            encode_name("AK-47 | Redline (Field-Tested)"),
            "AK-47%20%7C%20Redline%20(Field-Tested)"
        );
    }

    #[test]
    fn price_and_name_validation() {
        assert!(valid_price(0.01));
        assert!(!valid_price(0.0));
        assert!(!valid_price(-1.0));
        assert!(!valid_price(f64::NAN));
        assert!(valid_name("AK"));
        assert!(!valid_name("A"));
        assert!(!valid_name(&"x".repeat(301)));
    }

    #[test]
    fn lenient_numbers_parse_strings_and_numbers() {
        assert_eq!(value_to_f64(&serde_json::json!(1.5)), Some(1.5));
        assert_eq!(value_to_f64(&serde_json::json!("2.75")), Some(2.75));
        assert_eq!(value_to_f64(&serde_json::json!(" 3 ")), Some(3.0));
        assert_eq!(value_to_f64(&serde_json::json!(null)), None);
        assert_eq!(value_to_f64(&serde_json::json!("abc")), None);
    }

    #[test]
    fn dedup_keeps_cheapest_in_first_seen_order() {
        let items = vec![
            Listing::new(SourceTag::Lisskins, "A", 5.0),
            Listing::new(SourceTag::Lisskins, "B", 2.0),
            Listing::new(SourceTag::Lisskins, "A", 3.0),
            Listing::new(SourceTag::Lisskins, "A", 7.0),
        ];
        let out = dedup_cheapest(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "A");
        assert_eq!(out[0].price, 3.0);
        assert_eq!(out[1].name, "B");
    }
}
