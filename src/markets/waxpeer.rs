//! Waxpeer price feed: one GET, prices come back in 1/1000 USD.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.waxpeer.com/v1/prices?game=csgo&minified=0&single=0";
const ITEM_URL_BASE: &str = "https://waxpeer.com/es?sort=ASC&order=price&all=0&search=";

#[derive(Debug, Deserialize)]
struct WaxpeerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items: Vec<WaxpeerItem>,
}

#[derive(Debug, Deserialize)]
struct WaxpeerItem {
    name: Option<String>,
    /// Lowest listing price, in 1/1000 USD.
    #[serde(default)]
    min: f64,
    count: Option<u64>,
    steam_price: Option<f64>,
}

pub struct WaxpeerScraper {
    http: Arc<HttpClient>,
}

impl WaxpeerScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        WaxpeerScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for WaxpeerScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Waxpeer
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(value)?;
        info!("waxpeer: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let response: WaxpeerResponse =
        serde_json::from_value(value).map_err(|e| ScrapeError::Parse {
            platform: SourceTag::Waxpeer,
            what: "price feed",
            reason: e.to_string(),
        })?;
    if !response.success {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Waxpeer,
            what: "price feed",
            reason: "success=false".to_string(),
        });
    }

    let mut listings = Vec::with_capacity(response.items.len());
    for item in response.items {
        let Some(raw_name) = item.name else {
            continue;
        };
        let name = normalize_name(&raw_name);
        let price = item.min / 1000.0;
        if !valid_name(&name) || !valid_price(price) {
            warn!("waxpeer: dropping invalid item {raw_name:?} (price {price})");
            continue;
        }
        let mut listing = Listing::new(SourceTag::Waxpeer, name, price)
            .with_url(format!("{ITEM_URL_BASE}{}", encode_name(&raw_name)));
        if let Some(count) = item.count {
            listing = listing.with_quantity(count);
        }
        if let Some(steam) = item.steam_price {
            listing = listing.with_extra("steam_price", serde_json::json!(steam / 1000.0));
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
    fn parses_and_converts_millidollars() {
        let payload = json!({
            "success": true,
            "items": [
                {"name": "AK-47 | Redline (Field-Tested)", "min": 12500, "count": 4, "steam_price": 15000},
                {"name": "Broken", "min": 0},
                {"min": 100}
            ]
        });
        let items = parse_response(payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 12.5);
        assert_eq!(items[0].quantity, Some(4));
        assert_eq!(items[0].extra["steam_price"], json!(15.0));
        assert!(items[0].url.as_deref().unwrap().contains("%7C"));
    }

    #[test]
    fn unsuccessful_response_is_a_parse_error() {
        let payload = json!({"success": false, "items": []});
        assert!(matches!(
            parse_response(payload),
            Err(ScrapeError::Parse { .. })
        ));
    }
}
