//! BitSkins in-sell feed: `{list: [...]}` with prices in 1/1000 USD.

use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.bitskins.com/market/insell/730";

pub struct BitskinsScraper {
    http: Arc<HttpClient>,
    api_key: Option<String>,
}

impl BitskinsScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        BitskinsScraper {
            http: deps.http.clone(),
            api_key: deps.config.api_key(SourceTag::Bitskins),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for BitskinsScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Bitskins
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let mut spec = RequestSpec::get(API_URL);
        if let Some(key) = &self.api_key {
            spec = spec.bearer(key);
        }
        let value = self.http.fetch_json_cached(self.source(), spec).await?;
        let items = parse_response(&value)?;
        info!("bitskins: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let Some(rows) = value["list"].as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Bitskins,
            what: "insell feed",
            reason: "missing list array".to_string(),
        });
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["name"].as_str() else {
            continue;
        };
        let Some(raw_price) = value_to_f64(&row["price_min"]) else {
            continue;
        };
        let price = ((raw_price / 1000.0) * 100.0).round() / 100.0;
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let url = format!(
            "https://bitskins.com/market/730/search?market_hash_name={}",
            encode_name(&name)
        );
        let mut listing = Listing::new(SourceTag::Bitskins, name, price).with_url(url);
        if let Some(quantity) = row["quantity"].as_u64() {
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
    fn converts_millidollars_and_rounds() {
        let payload = json!({"list": [
            {"name": "Desert Eagle | Blaze (Factory New)", "price_min": 412345, "quantity": 2},
            {"name": "Junk", "price_min": 0}
        ]});
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 412.35);
        assert_eq!(items[0].quantity, Some(2));
    }
}
