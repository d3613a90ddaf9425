//! Market.CSGO USD price feed.

use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://market.csgo.com/api/v2/prices/USD.json";

pub struct MarketCsgoScraper {
    http: Arc<HttpClient>,
}

impl MarketCsgoScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        MarketCsgoScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for MarketCsgoScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Marketcsgo
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(&value)?;
        info!("marketcsgo: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let Some(rows) = value["items"].as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Marketcsgo,
            what: "price feed",
            reason: "missing items array".to_string(),
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
        let url = format!("https://market.csgo.com/?search={}", encode_name(&name));
        listings.push(Listing::new(SourceTag::Marketcsgo, name, price).with_url(url));
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_prices() {
        let payload = json!({"items": [
            {"market_hash_name": "Glock-18 | Fade (Factory New)", "price": "310.50"},
            {"market_hash_name": "Zero", "price": "0"}
        ]});
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 310.5);
    }
}
