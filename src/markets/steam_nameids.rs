//! Name-id resolver. Steam's order-histogram endpoint is keyed by an
//! internal numeric id that only appears inside each item's listing page,
//! so this sub-adapter walks the listing snapshot, fetches pages for names
//! with no known id yet, scrapes the id out of the embedded script, and
//! merges the result into `item_nameids.json`. It contributes no catalog
//! listings of its own.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::types::{Listing, NameIdEntry, SourceTag};
use super::{encode_name, MarketScraper, ScraperDeps};
use crate::catalog::CatalogStore;
use crate::common::config::ScraperConfig;
use crate::common::constants::STEAM_LISTING_URL_BASE;
use crate::common::errors::ScrapeError;
use crate::common::shutdown::Shutdown;
use crate::net::{HttpClient, RequestSpec};

pub struct SteamNameIdsScraper {
    http: Arc<HttpClient>,
    catalog: Arc<CatalogStore>,
    cfg: ScraperConfig,
    shutdown: Shutdown,
}

impl SteamNameIdsScraper {
    pub fn new(deps: &ScraperDeps) -> Self {
        SteamNameIdsScraper {
            http: deps.http.clone(),
            catalog: deps.catalog.clone(),
            cfg: deps.config.scraper(SourceTag::SteamNameids),
            shutdown: deps.shutdown.clone(),
        }
    }

    async fn resolve(&self, name: String) -> Option<NameIdEntry> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        let url = format!("{STEAM_LISTING_URL_BASE}{}", encode_name(&name));
        let html = match self
            .http
            .fetch_text(SourceTag::SteamNameids, RequestSpec::get(url))
            .await
        {
            Ok(html) => html,
            Err(e) => {
                debug!("steamnameids: page fetch for {name} failed: {e}");
                return None;
            }
        };
        let id = extract_name_id(&html)?;
        Some(NameIdEntry {
            name,
            id,
            last_updated: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        })
    }
}

#[async_trait::async_trait]
impl MarketScraper for SteamNameIdsScraper {
    fn source(&self) -> SourceTag {
        SourceTag::SteamNameids
    }

    fn persists_catalog(&self) -> bool {
        false
    }

    async fn scrape(&self) -> Result<Vec<Listing>, ScrapeError> {
        let listing_names: Vec<String> = self
            .catalog
            .load_items(SourceTag::SteamListing)
            .into_iter()
            .map(|l| l.name)
            .collect();
        if listing_names.is_empty() {
            return Err(ScrapeError::Parse {
                platform: SourceTag::SteamNameids,
                what: "listing snapshot",
                reason: "steamlisting_data.json is missing or empty; run the steamlisting \
                         scraper first"
                    .to_string(),
            });
        }

        let known: HashSet<String> = self
            .catalog
            .load_name_ids()
            .into_iter()
            .map(|e| e.name)
            .collect();
        let missing: Vec<String> = listing_names
            .into_iter()
            .filter(|n| !known.contains(n))
            .collect();
        info!(
            "steamnameids: {} known, {} to resolve",
            known.len(),
            missing.len()
        );
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let resolved: Vec<NameIdEntry> = stream::iter(missing.into_iter().map(|n| self.resolve(n)))
            .buffered(self.cfg.max_concurrent.max(1))
            .collect::<Vec<Option<NameIdEntry>>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        if self.shutdown.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        if !resolved.is_empty() {
            let total = self.catalog.save_name_ids(&resolved)?;
            info!(
                "steamnameids: resolved {} new ids ({} total)",
                resolved.len(),
                total
            );
        }
        Ok(Vec::new())
    }
}

/// The id appears in a few shapes inside the listing page's inline script.
fn extract_name_id(html: &str) -> Option<String> {
    for marker in ["Market_LoadOrderSpread( ", "Market_LoadOrderSpread(", "\"nameid\":", "nameid="] {
        if let Some(pos) = html.find(marker) {
            let tail = &html[pos + marker.len()..];
            let digits: String = tail
                .chars()
                .skip_while(|c| c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                return Some(digits);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_order_spread_call() {
        let html = "<script>Market_LoadOrderSpread( 176321961 );</script>";
        assert_eq!(extract_name_id(html), Some("176321961".to_string()));
    }

    #[test]
    fn extracts_from_json_shape() {
        let html = "var g_data = {\"nameid\":12345,\"other\":1};";
        assert_eq!(extract_name_id(html), Some("12345".to_string()));
    }

    #[test]
    fn no_id_no_entry() {
        assert_eq!(extract_name_id("<html>nothing here</html>"), None);
    }
}
