//! CS.Trade price map. Advertised prices carry the site's trade bonus, so
//! the real price is `advertised / (1 + bonus/100)`.

use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://cdn.cs.trade:2096/api/prices_CSGO";
const DEFAULT_BONUS_RATE: f64 = 50.0;

pub struct CsTradeScraper {
    http: Arc<HttpClient>,
    bonus_rate: f64,
}

impl CsTradeScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        let bonus_rate = deps
            .config
            .scraper(SourceTag::Cstrade)
            .bonus_rate_percent
            .unwrap_or(DEFAULT_BONUS_RATE);
        CsTradeScraper {
            http: deps.http.clone(),
            bonus_rate,
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for CsTradeScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Cstrade
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(&value, self.bonus_rate)?;
        info!("cstrade: {} listings (bonus rate {}%)", items.len(), self.bonus_rate);
        Ok(items)
    }
}

fn real_price(advertised: f64, bonus_rate: f64) -> f64 {
    advertised / (1.0 + bonus_rate / 100.0)
}

fn parse_response(value: &serde_json::Value, bonus_rate: f64) -> Result<Vec<Listing>, ScrapeError> {
    let Some(map) = value.as_object() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Cstrade,
            what: "price map",
            reason: "expected an object keyed by item name".to_string(),
        });
    };

    let mut listings = Vec::with_capacity(map.len());
    for (raw_name, row) in map {
        let tradable = row["tradable"].as_u64().unwrap_or(0);
        let stock = row["have"].as_u64().unwrap_or(0);
        if tradable == 0 || stock == 0 {
            continue;
        }
        let Some(advertised) = value_to_f64(&row["price"]) else {
            continue;
        };
        let price = (real_price(advertised, bonus_rate) * 100.0).round() / 100.0;
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let url = format!(
            "https://cs.trade/trade?market_name={}",
            encode_name(raw_name)
        );
        let listing = Listing::new(SourceTag::Cstrade, name, price)
            .with_url(url)
            .with_quantity(stock)
            .with_extra("advertised_price", serde_json::json!(advertised))
            .with_extra("bonus_rate_percent", serde_json::json!(bonus_rate));
        listings.push(listing);
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn divides_out_the_bonus() {
        assert_eq!(real_price(15.0, 50.0), 10.0);
        assert_eq!(real_price(12.0, 20.0), 10.0);
    }

    #[test]
    fn skips_untradable_and_out_of_stock() {
        let payload = json!({
            "AK-47 | Redline (Field-Tested)": {"price": 15.0, "tradable": 1, "have": 3},
            "AWP | Asiimov (Field-Tested)": {"price": 90.0, "tradable": 0, "have": 5},
            "M4A4 | Howl (Minimal Wear)": {"price": 900.0, "tradable": 1, "have": 0}
        });
        let items = parse_response(&payload, 50.0).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 10.0);
        assert_eq!(items[0].quantity, Some(3));
        assert_eq!(items[0].extra["advertised_price"], json!(15.0));
    }
}
