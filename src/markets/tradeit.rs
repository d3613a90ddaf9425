//! Tradeit.gg inventory, offset-paginated. `priceForTrade` is in cents.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://tradeit.gg/api/v2/inventory/data";
const PAGE_SIZE: u32 = 1000;

pub struct TradeitScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl TradeitScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        TradeitScraper {
            http: deps.http.clone(),
            cfg: deps.config.scraper(SourceTag::Tradeit),
            shutdown: deps.shutdown.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for TradeitScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Tradeit
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut all = Vec::new();
        let mut offset = 0u32;
        let mut consecutive_empty = 0u32;

        while consecutive_empty < self.cfg.consecutive_empty_limit {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            let spec = RequestSpec::get(API_URL)
                .query("gameId", 730)
                .query("sortType", "Popularity")
                .query("offset", offset)
                .query("limit", PAGE_SIZE)
                .query("fresh", "true");
            let value = match self.http.fetch_json_cached(self.source(), spec).await {
                Ok(v) => v,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    warn!("tradeit: offset {offset} failed, keeping partial snapshot: {e}");
                    break;
                }
            };
            let page_items = parse_page(&value);
            if page_items.is_empty() {
                consecutive_empty += 1;
                continue;
            }
            consecutive_empty = 0;
            offset += page_items.len() as u32;
            all.extend(page_items);
        }

        info!("tradeit: {} listings", all.len());
        Ok(all)
    }
}

fn parse_page(value: &serde_json::Value) -> Vec<Listing> {
    let Some(rows) = value["items"].as_array() else {
        return Vec::new();
    };
    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["name"].as_str() else {
            continue;
        };
        let Some(cents) = value_to_f64(&row["priceForTrade"]) else {
            continue;
        };
        let price = cents / 100.0;
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let url = format!(
            "https://tradeit.gg/csgo/trade?search={}",
            encode_name(&name)
        );
        listings.push(
            Listing::new(SourceTag::Tradeit, name, price)
                .with_url(url)
                .with_extra("price_for_trade_cents", serde_json::json!(cents)),
        );
    }
    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_cents() {
        let payload = json!({"items": [
            {"name": "P90 | Asiimov (Field-Tested)", "priceForTrade": 1234},
            {"name": "Zero Item", "priceForTrade": 0}
        ]});
        let items = parse_page(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 12.34);
    }

    #[test]
    fn missing_items_is_empty_page() {
        assert!(parse_page(&json!({})).is_empty());
    }
}
