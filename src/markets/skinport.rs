//! Skinport public price feed: top-level array, already in USD.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.skinport.com/v1/items?app_id=730&currency=USD";

#[derive(Debug, Deserialize)]
struct SkinportItem {
    market_hash_name: Option<String>,
    min_price: Option<f64>,
    item_page: Option<String>,
    quantity: Option<u64>,
}

pub struct SkinportScraper {
    http: Arc<HttpClient>,
}

impl SkinportScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        SkinportScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for SkinportScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Skinport
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(value)?;
        info!("skinport: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let rows: Vec<SkinportItem> = serde_json::from_value(value).map_err(|e| ScrapeError::Parse {
        platform: SourceTag::Skinport,
        what: "item array",
        reason: e.to_string(),
    })?;

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row.market_hash_name else {
            continue;
        };
        // Items with no open listings come back with a null min_price.
        let Some(price) = row.min_price else {
            continue;
        };
        let name = normalize_name(&raw_name);
        if !valid_name(&name) || !valid_price(price) {
            warn!("skinport: dropping invalid item {raw_name:?}");
            continue;
        }
        let mut listing = Listing::new(SourceTag::Skinport, name, price);
        if let Some(page) = row.item_page {
            listing = listing.with_url(page);
        }
        if let Some(quantity) = row.quantity {
            listing = listing.with_quantity(quantity);
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
    fn parses_array_and_skips_unlisted() {
        let payload = json!([
            {"market_hash_name": "AWP | Asiimov (Field-Tested)", "min_price": 80.25,
             "item_page": "https://skinport.com/item/awp-asiimov", "quantity": 7},
            {"market_hash_name": "Ghost Item", "min_price": null},
            {"market_hash_name": "Free Item", "min_price": 0.0}
        ]);
        let items = parse_response(payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 80.25);
        assert_eq!(items[0].quantity, Some(7));
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://skinport.com/item/awp-asiimov")
        );
    }

    #[test]
    fn non_array_payload_is_a_parse_error() {
        assert!(matches!(
            parse_response(json!({"error": "nope"})),
            Err(ScrapeError::Parse { .. })
        ));
    }
}
