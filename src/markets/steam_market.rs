//! Steam Market order-histogram crawl. Reads the `item_nameids.json`
//! artifact and issues one histogram request per known name-id; the price
//! recorded is the highest open buy order.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{Listing, NameIdEntry, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::catalog::CatalogStore;
use crate::common::config::ScraperConfig;
use crate::common::constants::STEAM_LISTING_URL_BASE;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const HISTOGRAM_URL: &str = "https://steamcommunity.com/market/itemordershistogram";
const BATCH_SIZE: usize = 50;
const BATCH_PAUSE: std::time::Duration = std::time::Duration::from_millis(500);

pub struct SteamMarketScraper {
    http: Arc<HttpClient>,
    catalog: Arc<CatalogStore>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl SteamMarketScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        SteamMarketScraper {
            http: deps.http.clone(),
            catalog: deps.catalog.clone(),
            cfg: deps.config.scraper(SourceTag::SteamMarket),
            shutdown: deps.shutdown.clone(),
        }
    }

    async fn fetch_item(&self, entry: NameIdEntry) -> Option<Listing> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        let spec = RequestSpec::get(HISTOGRAM_URL)
            .query("country", "PK")
            .query("language", "english")
            .query("currency", 1)
            .query("item_nameid", &entry.id)
            .query("two_factor", 0)
            .query("norender", 1);
        match self.http.fetch_json(SourceTag::SteamMarket, spec).await {
            Ok(value) => parse_histogram(&value, &entry.name),
            Err(e) => {
                debug!("steammarket: histogram for {} failed: {e}", entry.name);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for SteamMarketScraper {
    fn source(&self) -> SourceTag {
        SourceTag::SteamMarket
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let name_ids = self.catalog.load_name_ids();
        if name_ids.is_empty() {
            return Err(ScrapeError::Parse {
                platform: SourceTag::SteamMarket,
                what: "name-id artifact",
                reason: "item_nameids.json is missing or empty; run the steamnameids scraper first"
                    .to_string(),
            });
        }
        info!("steammarket: crawling {} name-ids", name_ids.len());

        // Batches of 50 with a short pause between them keep the crawl
        // under Steam's tolerance even with a wide semaphore.
        let total_batches = (name_ids.len() + BATCH_SIZE - 1) / BATCH_SIZE;
        let mut items: Vec<Listing> = Vec::with_capacity(name_ids.len());
        for (batch_no, chunk) in name_ids.chunks(BATCH_SIZE).enumerate() {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            debug!("steammarket: batch {}/{}", batch_no + 1, total_batches);
            let batch: Vec<Listing> =
                stream::iter(chunk.iter().cloned().map(|e| self.fetch_item(e)))
                    .buffered(self.cfg.max_concurrent.max(1))
                    .collect::<Vec<Option<Listing>>>()
                    .await
                    .into_iter()
                    .flatten()
                    .collect();
            items.extend(batch);
            if batch_no + 1 < total_batches {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        if self.shutdown.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        if items.is_empty() {
            warn!("steammarket: crawl produced no priced items");
        }
        info!("steammarket: {} listings", items.len());
        Ok(items)
    }
}

fn parse_histogram(value: &serde_json::Value, raw_name: &str) -> Option<Listing> {
    let cents = value_to_f64(&value["highest_buy_order"])?;
    let price = ((cents / 100.0) * 100.0).round() / 100.0;
    let name = normalize_name(raw_name);
    if !valid_name(&name) || !valid_price(price) {
        return None;
    }
    Some(
        Listing::new(SourceTag::SteamMarket, name.clone(), price)
            .with_url(format!("{STEAM_LISTING_URL_BASE}{}", encode_name(&name))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn highest_buy_order_is_the_price() {
        let payload = json!({"highest_buy_order": "1250", "lowest_sell_order": "1400"});
        let listing = parse_histogram(&payload, "AK-47 | Redline (Field-Tested)").unwrap();
        assert_eq!(listing.price, 12.5);
    }

    #[test]
    fn missing_buy_orders_yield_nothing() {
        assert!(parse_histogram(&json!({}), "Some Item Name").is_none());
        assert!(parse_histogram(&json!({"highest_buy_order": null}), "Some Item").is_none());
    }
}
