//! ShadowPay price feed. The endpoint is account-scoped, so a bearer token
//! is mandatory.

use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://api.shadowpay.com/api/v2/user/items/prices";
const PRICE_CEILING: f64 = 50_000.0;

pub struct ShadowpayScraper {
    http: Arc<HttpClient>,
    api_key: String,
}

impl ShadowpayScraper {
    pub fn new(deps: &ScraperDeps) -> Result<Self, ScrapeError> {
        let api_key = deps.config.require_api_key(SourceTag::Shadowpay)?;
        Ok(ShadowpayScraper {
            http: deps.http.clone(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl MarketScraper for ShadowpayScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Shadowpay
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let spec = RequestSpec::get(API_URL).bearer(&self.api_key);
        let value = self.http.fetch_json_cached(self.source(), spec).await?;
        let items = parse_response(&value)?;
        info!("shadowpay: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let Some(rows) = value["data"].as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Shadowpay,
            what: "price feed",
            reason: "missing data array".to_string(),
        });
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["steam_market_hash_name"].as_str() else {
            continue;
        };
        let Some(price) = value_to_f64(&row["price"]) else {
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) || price > PRICE_CEILING {
            continue;
        }
        let url = format!(
            "https://shadowpay.com/csgo-items?search={}&sort_column=price&sort_dir=asc",
            encode_name(&name)
        );
        listings.push(Listing::new(SourceTag::Shadowpay, name, price).with_url(url));
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_data_rows_and_caps_prices() {
        let payload = json!({"data": [
            {"steam_market_hash_name": "P250 | Sand Dune (Field-Tested)", "price": "0.03"},
            {"steam_market_hash_name": "Absurd Item", "price": 99999.0}
        ]});
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 0.03);
    }
}
