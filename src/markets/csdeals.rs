//! CS.Deals lowest-price feed: `{success, response: {items}}`.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://cs.deals/API/IPricing/GetLowestPrices/v1?appid=730";

pub struct CsDealsScraper {
    http: Arc<HttpClient>,
}

impl CsDealsScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        CsDealsScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for CsDealsScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Csdeals
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(&value)?;
        info!("csdeals: {} listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    if !value["success"].as_bool().unwrap_or(false) {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Csdeals,
            what: "price feed",
            reason: "success=false".to_string(),
        });
    }
    let Some(rows) = value["response"]["items"].as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Csdeals,
            what: "price feed",
            reason: "missing response.items".to_string(),
        });
    };

    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_name) = row["marketname"].as_str() else {
            continue;
        };
        let Some(price) = value_to_f64(&row["lowest_price"]) else {
            warn!("csdeals: non-numeric price for {raw_name:?}");
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let url = format!(
            "https://cs.deals/new?name={}&game=csgo&sort=price&sort_desc=0",
            name.replace(' ', "%20")
        );
        let mut listing = Listing::new(SourceTag::Csdeals, name, round2(price)).with_url(url);
        if let Some(quantity) = row["quantity"].as_u64() {
            listing = listing.with_quantity(quantity);
        }
        listings.push(listing);
    }
    Ok(listings)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_response_and_cleans_names() {
        let payload = json!({
            "success": true,
            "response": {"items": [
                {"marketname": " Sticker | Crown (Foil) ", "lowest_price": "4.556", "quantity": 2},
                {"marketname": "Nameless", "lowest_price": "abc"},
                {"lowest_price": 1.0}
            ]}
        });
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Sticker | Crown (Foil)");
        assert_eq!(items[0].price, 4.56);
        assert_eq!(items[0].quantity, Some(2));
    }

    #[test]
    fn failure_flag_is_surfaced() {
        let payload = json!({"success": false});
        assert!(parse_response(&payload).is_err());
    }
}
