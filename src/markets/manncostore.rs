//! Mannco.store paginated item feed. Prices are integers with the last two
//! digits as cents.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://mannco.store/items/get";
const STORE_URL: &str = "https://mannco.store/item/730/";
const PAGE_SIZE: u64 = 50;

pub struct ManncoStoreScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl ManncoStoreScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        ManncoStoreScraper {
            http: deps.http.clone(),
            cfg: deps.config.scraper(SourceTag::Manncostore),
            shutdown: deps.shutdown.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for ManncoStoreScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Manncostore
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut all = Vec::new();
        let mut skip = 0u64;
        let mut consecutive_empty = 0u32;

        while consecutive_empty < self.cfg.consecutive_empty_limit {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            let spec = RequestSpec::get(API_URL)
                .query("price", "DESC")
                .query("page", 1)
                .query("i", 0)
                .query("game", 730)
                .query("skip", skip);
            let value = match self.http.fetch_json_cached(self.source(), spec).await {
                Ok(v) => v,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    warn!("manncostore: skip {skip} failed, keeping partial snapshot: {e}");
                    break;
                }
            };
            let page_items = parse_page(&value);
            if page_items.is_empty() {
                consecutive_empty += 1;
            } else {
                consecutive_empty = 0;
                all.extend(page_items);
            }
            // The server's skip is a raw-row offset, so it advances by the
            // page size even when rows were dropped during parsing.
            skip += PAGE_SIZE;
        }

        info!("manncostore: {} listings", all.len());
        Ok(all)
    }
}

/// `1250` means `12.50`; single and double digit values are sub-dollar.
fn transform_price(raw: i64) -> f64 {
    raw as f64 / 100.0
}

fn parse_page(value: &serde_json::Value) -> Vec<Listing> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };
    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["name"].as_str() else {
            continue;
        };
        let Some(raw_price) = row["price"].as_i64() else {
            continue;
        };
        let price = transform_price(raw_price);
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let suffix = row["url"].as_str().unwrap_or("");
        listings.push(
            Listing::new(SourceTag::Manncostore, name, price)
                .with_url(format!("{STORE_URL}{suffix}")),
        );
    }
    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_prices_are_cents() {
        assert_eq!(transform_price(1250), 12.50);
        assert_eq!(transform_price(5), 0.05);
        assert_eq!(transform_price(99), 0.99);
    }

    #[test]
    fn parses_rows_with_url_suffix() {
        let payload = json!([
            {"name": "Tec-9 | Isaac (Field-Tested)", "price": 321, "url": "tec-9-isaac"},
            {"name": "Broken", "price": "notint"}
        ]);
        let items = parse_page(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 3.21);
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://mannco.store/item/730/tec-9-isaac")
        );
    }
}
