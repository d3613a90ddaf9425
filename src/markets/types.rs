use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Every marketplace the bot knows how to read, plus the Steam reference
/// feeds. The string form (lowercase) is the tag used in config blocks,
/// data file names and `BOT_API_KEY_<TAG>` environment variables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Waxpeer,
    Skinport,
    Csdeals,
    Marketcsgo,
    White,
    Lisskins,
    Cstrade,
    Bitskins,
    Shadowpay,
    Skindeck,
    Tradeit,
    Skinout,
    Manncostore,
    Empire,
    Rapidskins,
    SteamListing,
    SteamMarket,
    SteamNameids,
}

impl SourceTag {
    /// Catalog artifact for this source, relative to the data directory.
    pub fn data_file(&self) -> String {
        format!("{}_data.json", self)
    }

    /// Steam feeds define the sell side of an arbitrage; everything else is
    /// a buy-side marketplace.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            SourceTag::SteamListing | SourceTag::SteamMarket | SourceTag::SteamNameids
        )
    }

    /// Environment variable holding this source's API key.
    pub fn api_key_var(&self) -> String {
        format!("BOT_API_KEY_{}", self.to_string().to_uppercase())
    }

    /// Sources that cannot operate without a key.
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            SourceTag::Empire | SourceTag::Shadowpay | SourceTag::Skindeck
        )
    }

    /// All buy-side marketplaces the arbitrage engine scans.
    pub fn marketplaces() -> Vec<SourceTag> {
        use strum::IntoEnumIterator;
        SourceTag::iter().filter(|t| !t.is_reference()).collect()
    }
}

/// One normalized marketplace listing. `(source, name)` is unique within a
/// snapshot; prices are USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub name: String,
    pub price: f64,
    pub source: SourceTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Listing {
    pub fn new(source: SourceTag, name: impl Into<String>, price: f64) -> Self {
        Listing {
            name: name.into(),
            price,
            source,
            url: None,
            quantity: None,
            captured_at: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// One complete catalog pass for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: SourceTag,
    pub captured_at: DateTime<Utc>,
    pub items: Vec<Listing>,
}

impl Snapshot {
    pub fn new(source: SourceTag, items: Vec<Listing>) -> Self {
        Snapshot {
            source,
            captured_at: Utc::now(),
            items,
        }
    }
}

/// Entry in the `item_nameids.json` artifact that feeds the Steam market
/// order-histogram adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameIdEntry {
    pub name: String,
    pub id: String,
    pub last_updated: f64,
}
