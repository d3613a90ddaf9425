pub static PROJECT_NAME: &str = "skin_arb_bot";

use crate::markets::types::SourceTag;

/// Steam Community Market listing page, used both for deep links and for
/// name-id resolution.
pub static STEAM_LISTING_URL_BASE: &str = "https://steamcommunity.com/market/listings/730/";

/// Region codes the proxy provider serves reliably (tier 1 + tier 2).
pub static RELIABLE_REGIONS: &[&str] = &[
    "us", "gb", "de", "ca", "au", "fr", "nl", "jp", "sg", "br", "mx", "in", "kr", "hk", "tw", "pl",
    "it", "es", "ch", "se", "no", "dk", "fi", "at", "be", "ie", "pt", "ru", "tr", "za", "eg", "ae",
    "sa", "th", "my", "id", "ph", "vn", "nz",
];

pub fn get_env(key: &str) -> String {
    std::env::var(key).unwrap_or(String::from(""))
}

/// Search-page base used to build a deep link when a source does not ship
/// per-item URLs in its feed. The encoded item name is appended.
pub fn search_url_base(source: SourceTag) -> Option<&'static str> {
    match source {
        SourceTag::Waxpeer => Some("https://waxpeer.com/es?sort=ASC&order=price&all=0&search="),
        SourceTag::Csdeals => Some("https://cs.deals/market/"),
        SourceTag::Empire => Some("https://csgoempire.com/shop/"),
        SourceTag::Skinport => Some("https://skinport.com/market/730?search="),
        SourceTag::Bitskins => {
            Some("https://bitskins.com/market/730/search?market_hash_name=")
        }
        SourceTag::Cstrade => Some("https://cs.trade/csgo-skins?search="),
        SourceTag::Marketcsgo => Some("https://market.csgo.com/?search="),
        SourceTag::Tradeit => Some("https://tradeit.gg/csgo/trade?search="),
        SourceTag::Skindeck => Some("https://skindeck.com/listings?query="),
        SourceTag::Rapidskins => Some("https://rapidskins.com/item/"),
        SourceTag::Manncostore => Some("https://mannco.store/item/730/"),
        SourceTag::Shadowpay => Some("https://shadowpay.com/csgo?search="),
        SourceTag::Skinout => Some("https://skinout.gg/market/cs2?item="),
        SourceTag::Lisskins => Some("https://lis-skins.com/market_730.html?search_item="),
        SourceTag::White => Some("https://white.market/search?game[]=CS2&query="),
        SourceTag::SteamListing | SourceTag::SteamMarket | SourceTag::SteamNameids => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_marketplace_has_a_search_base() {
        for tag in SourceTag::marketplaces() {
            assert!(search_url_base(tag).is_some(), "missing url base for {tag}");
        }
    }

    #[test]
    fn reference_feeds_have_no_search_base() {
        assert!(search_url_base(SourceTag::SteamMarket).is_none());
    }

    #[test]
    fn region_list_is_distinct() {
        let mut seen = std::collections::HashSet::new();
        for r in RELIABLE_REGIONS {
            assert!(seen.insert(*r), "duplicate region {r}");
        }
        assert_eq!(RELIABLE_REGIONS.len(), 39);
    }
}
