//! Steam Market search crawl: one probe request learns `total_count`, then
//! `(start, count)` ranges cover the whole result set under a bounded
//! fan-out.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, MarketScraper, ScraperDeps};
use crate::common::config::ScraperConfig;
use crate::common::constants::STEAM_LISTING_URL_BASE;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

const SEARCH_URL: &str = "https://steamcommunity.com/market/search/render/";
const BATCH_SIZE: usize = 10;

pub struct SteamListingScraper {
    http: Arc<HttpClient>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl SteamListingScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        SteamListingScraper {
            http: deps.http.clone(),
            cfg: deps.config.scraper(SourceTag::SteamListing),
            shutdown: deps.shutdown.clone(),
        }
    }

    fn range_spec(start: usize, count: usize) -> RequestSpec {
        RequestSpec::get(SEARCH_URL)
            .query("query", "")
            .query("start", start)
            .query("count", count)
            .query("search_descriptions", 0)
            .query("sort_column", "name")
            .query("sort_dir", "asc")
            .query("appid", 730)
            .query("norender", 1)
    }

    async fn total_count(&self) -> Result<usize, ScrapeError> {
        let value = self
            .http
            .fetch_json(SourceTag::SteamListing, Self::range_spec(0, 1))
            .await?;
        value["total_count"]
            .as_u64()
            .map(|n| n as usize)
            .ok_or(ScrapeError::Parse {
                platform: SourceTag::SteamListing,
                what: "search probe",
                reason: "missing total_count".to_string(),
            })
    }

    async fn fetch_range(&self, start: usize) -> Vec<Listing> {
        if self.shutdown.is_cancelled() {
            return Vec::new();
        }
        match self
            .http
            .fetch_json(SourceTag::SteamListing, Self::range_spec(start, BATCH_SIZE))
            .await
        {
            Ok(value) => parse_results(&value),
            Err(e) => {
                warn!("steamlisting: range start={start} failed: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for SteamListingScraper {
    fn source(&self) -> SourceTag {
        SourceTag::SteamListing
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let total = self.total_count().await?;
        let batches = (total + BATCH_SIZE - 1) / BATCH_SIZE;
        let capped = batches.min(self.cfg.max_pages);
        if capped < batches {
            info!(
                "steamlisting: capping crawl to {} of {} ranges",
                capped, batches
            );
        }
        info!("steamlisting: {total} items in {capped} ranges");

        let items: Vec<Listing> = stream::iter((0..capped).map(|i| self.fetch_range(i * BATCH_SIZE)))
            .buffered(self.cfg.max_concurrent.max(1))
            .collect::<Vec<Vec<Listing>>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        if self.shutdown.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        info!("steamlisting: {} listings", items.len());
        Ok(items)
    }
}

fn parse_results(value: &serde_json::Value) -> Vec<Listing> {
    let Some(rows) = value["results"].as_array() else {
        return Vec::new();
    };
    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["name"].as_str() else {
            continue;
        };
        let Some(cents) = row["sell_price"].as_u64() else {
            continue;
        };
        let price = cents as f64 / 100.0;
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let mut listing = Listing::new(SourceTag::SteamListing, name.clone(), price)
            .with_url(format!("{STEAM_LISTING_URL_BASE}{}", encode_name(&name)));
        if let Some(icon) = row["asset_description"]["icon_url"].as_str() {
            listing = listing.with_extra(
                "icon_url",
                serde_json::json!(format!(
                    "https://community.fastly.steamstatic.com/economy/image/{icon}"
                )),
            );
        }
        if let Some(qty) = row["sell_listings"].as_u64() {
            listing = listing.with_quantity(qty);
        }
        listings.push(listing);
    }
    listings
}
