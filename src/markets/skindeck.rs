//! SkinDeck market pages. Bearer token required; pages are huge
//! (`perPage=100000`) so only a handful of iterations ever run.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.skindeck.com/client/market";
const ITEM_URL: &str = "https://skindeck.com/sell?tab=withdraw";
const PER_PAGE: u32 = 100_000;

pub struct SkindeckScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    api_key: String,
    shutdown: Shutdown,
}

impl SkindeckScraper {
    pub fn new(deps: &ScraperDeps) -> Result<Self, ScrapeError> {
        let api_key = deps.config.require_api_key(SourceTag::Skindeck)?;
        Ok(SkindeckScraper {
            http: deps.http.clone(),
            cfg: deps.config.scraper(SourceTag::Skindeck),
            api_key,
            shutdown: deps.shutdown.clone(),
        })
    }
}

#[async_trait::async_trait]
impl MarketScraper for SkindeckScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Skindeck
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut all = Vec::new();
        for page in 1..=self.cfg.max_pages {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            let spec = RequestSpec::get(API_URL)
                .query("page", page)
                .query("perPage", PER_PAGE)
                .query("sort", "price_desc")
                .bearer(&self.api_key);
            let value = match self.http.fetch_json_cached(self.source(), spec).await {
                Ok(v) => v,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    warn!("skindeck: page {page} failed, keeping partial snapshot: {e}");
                    break;
                }
            };
            let page_items = match parse_page(&value) {
                Ok(items) => items,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    warn!("skindeck: page {page} unparseable, keeping partial snapshot: {e}");
                    break;
                }
            };
            if page_items.is_empty() {
                break;
            }
            all.extend(page_items);
        }
        info!("skindeck: {} listings", all.len());
        Ok(all)
    }
}

fn parse_page(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    if !value["success"].as_bool().unwrap_or(false) {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Skindeck,
            what: "market page",
            reason: "success=false".to_string(),
        });
    }
    let Some(rows) = value["items"].as_array() else {
        return Ok(Vec::new());
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["market_hash_name"].as_str() else {
            continue;
        };
        // Items without an attached offer are display-only.
        let offer = &row["offer"];
        if offer.is_null() {
            continue;
        }
        let Some(price) = value_to_f64(&offer["price"]) else {
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        listings.push(Listing::new(SourceTag::Skindeck, name, price).with_url(ITEM_URL));
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skips_items_without_offers() {
        let payload = json!({"success": true, "items": [
            {"market_hash_name": "Five-SeveN | Case Hardened (Well-Worn)", "offer": {"price": 7.77}},
            {"market_hash_name": "No Offer Item", "offer": null},
            {"market_hash_name": "Bad Offer", "offer": {"price": "abc"}}
        ]});
        let items = parse_page(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 7.77);
    }

    #[test]
    fn unsuccessful_page_errors() {
        assert!(parse_page(&json!({"success": false})).is_err());
    }
}
