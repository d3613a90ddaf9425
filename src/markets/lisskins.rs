//! LisSkins full-market export. The feed lists every open offer, so one
//! name can appear many times; the cheapest copy wins.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::types::{Listing, SourceTag};
use super::{normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::common::errors::ScrapeError;
use crate::net::{HttpClient, RequestSpec};

const API_URL: &str = "https://lis-skins.com/market_export_json/api_csgo_full.json";

pub struct LisSkinsScraper {
    http: Arc<HttpClient>,
}

impl LisSkinsScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        LisSkinsScraper {
            http: deps.http.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for LisSkinsScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Lisskins
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let value = self
            .http
            .fetch_json_cached(self.source(), RequestSpec::get(API_URL))
            .await?;
        let items = parse_response(&value)?;
        info!("lisskins: {} deduplicated listings", items.len());
        Ok(items)
    }
}

fn parse_response(value: &serde_json::Value) -> Result<Vec<Listing>, ScrapeError> {
    let Some(rows) = value["items"].as_array() else {
        return Err(ScrapeError::Parse {
            platform: SourceTag::Lisskins,
            what: "market export",
            reason: "missing items array".to_string(),
        });
    };

    // Keep the cheapest copy per name, preserving first-seen order.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut listings: Vec<Listing> = Vec::new();
    for row in rows {
        let Some(raw_name) = row["name"].as_str() else {
            continue;
        };
        let Some(price) = value_to_f64(&row["price"]) else {
            continue;
        };
        let name = normalize_name(raw_name);
        if !valid_name(&name) || !valid_price(price) {
            continue;
        }
        let price = (price * 100.0).round() / 100.0;
        match index.get(&name) {
            Some(&i) => {
                if price < listings[i].price {
                    let url = listings[i].url.clone();
                    listings[i] = Listing::new(SourceTag::Lisskins, name, price);
                    listings[i].url = url;
                }
            }
            None => {
                let url = format!(
                    "https://lis-skins.com/en/market/csgo/{}",
                    url_slug(&name)
                );
                index.insert(name.clone(), listings.len());
                listings.push(Listing::new(SourceTag::Lisskins, name, price).with_url(url));
            }
        }
    }
    Ok(listings)
}

/// Site slugs strip decoration characters and hyphenate spaces.
fn url_slug(name: &str) -> String {
    let mut slug: String = name
        .chars()
        .filter(|c| !"™(),/|".contains(*c))
        .collect::<String>()
        .replace(' ', "-");
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    slug.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_cheapest_duplicate() {
        let payload = json!({"items": [
            {"name": "AK-47 | Slate (Field-Tested)", "price": 5},
            {"name": "AK-47 | Slate (Field-Tested)", "price": 3},
            {"name": "AK-47 | Slate (Field-Tested)", "price": 7},
            {"name": "M4A1-S | Printstream (Field-Tested)", "price": 90}
        ]});
        let items = parse_response(&payload).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price, 3.0);
        assert_eq!(items[1].price, 90.0);
    }

    #[test]
    fn slug_strips_decoration() {
        assert_eq!(
            url_slug("StatTrak™ AK-47 | Redline (Field-Tested)"),
            "stattrak-ak-47-redline-field-tested"
        );
    }
}
