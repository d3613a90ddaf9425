//! SkinOut market pages. Field names in this feed drift, so extraction is
//! deliberately forgiving.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://skinout.gg/api/market/items";
const SITE_URL: &str = "https://skinout.gg/";

pub struct SkinoutScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl SkinoutScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        SkinoutScraper {
            http: deps.http.clone(),
            cfg: deps.config.scraper(SourceTag::Skinout),
            shutdown: deps.shutdown.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for SkinoutScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Skinout
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut all = Vec::new();
        let mut consecutive_empty = 0u32;

        for page in 1..=self.cfg.max_pages {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            if consecutive_empty >= self.cfg.consecutive_empty_limit {
                break;
            }
            let spec = RequestSpec::get(API_URL).query("page", page);
            let value = match self.http.fetch_json_cached(self.source(), spec).await {
                Ok(v) => v,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    warn!("skinout: page {page} failed, keeping partial snapshot: {e}");
                    break;
                }
            };
            let page_items = parse_page(&value);
            if page_items.is_empty() {
                consecutive_empty += 1;
                continue;
            }
            consecutive_empty = 0;
            all.extend(page_items);
        }

        info!("skinout: {} listings", all.len());
        Ok(all)
    }
}

fn parse_page(value: &serde_json::Value) -> Vec<Listing> {
    let rows = value["items"]
        .as_array()
        .or_else(|| value["data"].as_array())
        .or_else(|| value.as_array());
    let Some(rows) = rows else {
        return Vec::new();
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_name = ["name", "market_hash_name", "item_name", "title"]
            .iter()
            .find_map(|f| row[*f].as_str())
            .unwrap_or("");
        let price = ["price", "current_price", "sell_price", "value"]
            .iter()
            .find_map(|f| value_to_f64(&row[*f]));
        let Some(price) = price else {
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let price = (price * 100.0).round() / 100.0;
        listings.push(Listing::new(SourceTag::Skinout, name, price).with_url(SITE_URL));
    }
    listings
}
