//! CSGOEmpire trading items. Prices arrive as coin cents; coins convert to
//! USD at a configured rate. Auction and direct listings are crawled
//! concurrently and merged keeping the cheaper copy.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://csgoempire.com/api/v2/trading/items";
const SHOP_URL: &str = "https://csgoempire.com/shop/";
const PER_PAGE: u32 = 2500;
const DEFAULT_COIN_RATE: f64 = 0.6154;
const MIN_PRICE_USD: f64 = 0.01;
const MAX_PRICE_USD: f64 = 50_000.0;

pub struct EmpireScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    api_key: String,
    coin_rate: f64,
    shutdown: Shutdown,
}

impl EmpireScraper {
    pub fn new(deps: &ScraperDeps) -> Result<Self, ScrapeError> {
        let api_key = deps.config.require_api_key(SourceTag::Empire)?;
        let cfg = deps.config.scraper(SourceTag::Empire);
        let coin_rate = cfg.coin_usd_rate.unwrap_or(DEFAULT_COIN_RATE);
        Ok(EmpireScraper {
            http: deps.http.clone(),
            cfg,
            api_key,
            coin_rate,
            shutdown: deps.shutdown.clone(),
        })
    }

    async fn fetch_auction_mode(&self, auction: &str) -> Result<Vec<Listing>, ScrapeError> {
        let mut collected = Vec::new();
        for page in 1..=self.cfg.max_pages {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            let spec = RequestSpec::get(API_URL)
                .query("per_page", PER_PAGE)
                .query("page", page)
                .query("order", "market_value")
                .query("sort", "asc")
                .query("auction", auction)
                .bearer(&self.api_key);
            let value = match self.http.fetch_json_cached(self.source(), spec).await {
                Ok(v) => v,
                Err(e) if collected.is_empty() => return Err(e),
                Err(e) => {
                    warn!("empire: auction={auction} page {page} failed, partial: {e}");
                    break;
                }
            };
            let page_items = parse_page(&value, self.coin_rate, auction);
            if page_items.is_empty() {
                break;
            }
            collected.extend(page_items);
        }
        Ok(collected)
    }
}

#[async_trait::async_trait]
impl MarketScraper for EmpireScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Empire
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let (auction, direct) =
            tokio::join!(self.fetch_auction_mode("yes"), self.fetch_auction_mode("no"));

        if auction.is_err() && direct.is_err() {
            if let Err(e) = &auction {
                warn!("empire: both auction modes failed: {e}");
            }
            return direct;
        }

        let mut merged: HashMap<String, Listing> = HashMap::new();
        for result in [auction, direct] {
            match result {
                Ok(items) => {
                    for item in items {
                        match merged.get(&item.name) {
                            Some(existing) if existing.price <= item.price => {}
                            _ => {
                                merged.insert(item.name.clone(), item);
                            }
                        }
                    }
                }
                Err(e) => warn!("empire: one auction mode failed: {e}"),
            }
        }

        let mut listings: Vec<Listing> = merged.into_values().collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        info!("empire: {} listings (coin rate {})", listings.len(), self.coin_rate);
        Ok(listings)
    }
}

fn parse_page(value: &serde_json::Value, coin_rate: f64, auction: &str) -> Vec<Listing> {
    let Some(rows) = value["data"].as_array() else {
        return Vec::new();
    };
    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["market_name"].as_str() else {
            continue;
        };
        let Some(market_value) = value_to_f64(&row["market_value"]) else {
            continue;
        };
        if market_value <= 0.0 {
            continue;
        }
        let coins = market_value / 100.0;
        let price = (coins * coin_rate * 1000.0).round() / 1000.0;
        if !(MIN_PRICE_USD..=MAX_PRICE_USD).contains(&price) {
            continue;
        }
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        listings.push(
            Listing::new(SourceTag::Empire, name, price)
                .with_url(SHOP_URL)
                .with_extra("price_coins", serde_json::json!((coins * 1000.0).round() / 1000.0))
                .with_extra("auction", serde_json::json!(auction)),
        );
    }
    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_coin_cents_to_usd() {
        let payload = json!({"data": [
            {"market_name": "AK-47 | Redline (Field-Tested)", "market_value": 2000},
            {"market_name": "Worthless", "market_value": 0}
        ]});
        let items = parse_page(&payload, 0.6154, "no");
        assert_eq!(items.len(), 1);
        // 2000 coin cents -> 20 coins -> 20 * 0.6154 = 12.308
        assert_eq!(items[0].price, 12.308);
        assert_eq!(items[0].extra["price_coins"], json!(20.0));
    }

    #[test]
    fn filters_out_of_range_prices() {
        let payload = json!({"data": [
            {"market_name": "Dust Particle Authentic", "market_value": 1}
        ]});
        // 0.01 coins * 0.6154 ~= 0.006 USD, below the floor.
        assert!(parse_page(&payload, 0.6154, "yes").is_empty());
    }
}
