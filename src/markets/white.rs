//! White.market export feed: array of `{market_hash_name, price,
//! market_product_link}`.

use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.white.market/export/v1/prices/730.json";

pub struct WhiteScraper {
    http: Arc<HttpClient>,
}

impl WhiteScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        WhiteScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for WhiteScraper {
    fn source(&self) -> SourceTag {
        SourceTag::White
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(&value)?;
        info!("white: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let Some(rows) = value.as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::White,
            what: "price feed",
            reason: "expected a top-level array".to_string(),
        });
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["market_hash_name"].as_str() else {
            continue;
        };
        let Some(price) = value_to_f64(&row["price"]) else {
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let mut listing = Listing::new(SourceTag::White, name, price);
        if let Some(link) = row["market_product_link"].as_str() {
            listing = listing.with_url(link.to_string());
        }
        listings.push(listing);
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_export_rows() {
        let payload = json!([
            {"market_hash_name": "USP-S | Kill Confirmed (Minimal Wear)", "price": "61.20",
             "market_product_link": "https://white.market/item/x"},
            {"market_hash_name": "No price"}
        ]);
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url.as_deref(), Some("https://white.market/item/x"));
    }
}
