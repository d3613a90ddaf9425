//! RapidSkins. The site needs an authenticated in-browser session, which an
//! external browser process handles; it drops its accumulated listings into
//! `data/rapidskins_feed.json`. This adapter only polls that artifact for
//! freshness and normalizes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::types::{Listing, SourceTag};
use super::{encode_name, normalize_name, valid_name, valid_price, value_to_f64, MarketScraper, ScraperDeps};
use crate::catalog::CatalogStore;
use crate::common::config::ScraperConfig;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;

pub const FEED_FILE: &str = "rapidskins_feed.json";
const ITEM_URL_BASE: &str = "https://rapidskins.com/item/";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_BUDGET: Duration = Duration::from_secs(60);

pub struct RapidskinsScraper {
    catalog: Arc<CatalogStore>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl RapidskinsScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        RapidskinsScraper {
            catalog: deps.catalog.clone(),
            cfg: deps.config.scraper(SourceTag::Rapidskins),
            shutdown: deps.shutdown.clone(),
        }
    }

    fn feed_path(&self) -> PathBuf {
        self.catalog.data_dir().join(FEED_FILE)
    }

    fn feed_is_fresh(&self) -> bool {
        let max_age = Duration::from_secs(self.cfg.feed_max_age_seconds.unwrap_or(3600));
        let Ok(meta) = std::fs::metadata(self.feed_path()) else {
            return false;
        };
        match meta.modified().and_then(|m| {
            SystemTime::now()
                .duration_since(m)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }) {
            Ok(age) => age <= max_age,
            Err(_) => false,
        }
    }
}

#[async_trait::async_trait]
impl MarketScraper for RapidskinsScraper {
    fn source(&self) -> SourceTag {
        SourceTag::Rapidskins
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let started = tokio::time::Instant::now();
        while !self.feed_is_fresh() {
            if self.shutdown.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            if started.elapsed() >= POLL_BUDGET {
                return Err(ScrapeError::Parse {
                    platform: SourceTag::Rapidskins,
                    what: "browser feed",
                    reason: format!(
                        "{} missing or stale; is the browser collector running?",
                        self.feed_path().display()
                    ),
                });
            }
            debug!("rapidskins: waiting for a fresh browser feed");
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let raw = std::fs::read_to_string(self.feed_path()).map_err(|e| ScrapeError::Parse {
            platform: SourceTag::Rapidskins,
            what: "browser feed",
            reason: e.to_string(),
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ScrapeError::Parse {
                platform: SourceTag::Rapidskins,
                what: "browser feed",
                reason: e.to_string(),
            })?;
        let items = parse_feed(&value);
        info!("rapidskins: {} listings from browser feed", items.len());
        Ok(items)
    }
}

pub(crate) fn parse_feed(value: &serde_json::Value) -> Vec<Listing> {
    let rows = value["items"].as_array().or_else(|| value.as_array());
    let Some(rows) = rows else {
        warn!("rapidskins: feed has no items array");
        return Vec::new();
    };

    let mut listings = Vec::with_capacity(rows.len());
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
        listings.push(
            Listing::new(SourceTag::Rapidskins, name.clone(), price)
                .with_url(format!("{ITEM_URL_BASE}{}", encode_name(&name))),
        );
    }
    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wrapped_and_bare_feeds() {
        let wrapped = json!({"generated_at": "2026-01-01T00:00:00Z", "items": [
            {"name": "Butterfly Knife | Doppler (Factory New)", "price": 1555.555}
        ]});
        let bare = json!([{"name": "Falchion Knife | Fade (Factory New)", "price": 200}]);
        assert_eq!(parse_feed(&wrapped).len(), 1);
        assert_eq!(parse_feed(&wrapped)[0].price, 1555.56);
        assert_eq!(parse_feed(&bare).len(), 1);
    }

    #[test]
    fn garbage_feed_yields_nothing() {
        assert!(parse_feed(&json!({"status": "collecting"})).is_empty());
    }
}
