use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;

use super::requests::{get_reqwest_client, UpstreamError};
use crate::chains::ChainEntry;

const MAP_DATA_URL: &str = "https://api-legacy.bubblemaps.io/map-data";
const MAP_PAGE_URL: &str = "https://app.bubblemaps.io";

/// Holder distribution data for a token, as computed by Bubblemaps.
/// Unknown fields in the payload are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MapData {
    pub full_name: Option<String>,
    pub symbol: Option<String>,
    pub dt_update: Option<String>,
    #[serde(default)]
    pub nodes: Vec<HolderNode>,
}

/// One holder in the map, ordered by share of supply (largest first).
#[derive(Debug, Clone, Deserialize)]
pub struct HolderNode {
    pub address: String,
    pub name: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub is_contract: bool,
}

/// Fetches the computed map for a token.
///
/// `Ok(None)` when the map was never computed (401) or the token is unknown
/// (404); any other non-success status is an upstream failure.
pub async fn get_map_data(
    chain: &ChainEntry,
    address: &str,
) -> Result<Option<MapData>, UpstreamError> {
    let response = get_reqwest_client()
        .get(MAP_DATA_URL)
        .query(&[("token", address), ("chain", chain.code)])
        .send()
        .await?;
    match response.status() {
        StatusCode::UNAUTHORIZED => {
            log::warn!("Map not computed for {address} on {}", chain.code);
            Ok(None)
        }
        StatusCode::NOT_FOUND => {
            log::warn!("Token not found: {address} on {}", chain.code);
            Ok(None)
        }
        status if !status.is_success() => Err(UpstreamError::Unavailable(format!(
            "map-data returned {status} for {address} on {}",
            chain.code
        ))),
        _ => Ok(Some(response.json::<MapData>().await?)),
    }
}

/// The public visualization page for a token, the page the screenshot
/// renderer loads.
pub fn map_page_url(chain: &ChainEntry, address: &str) -> String {
    format!(
        "{MAP_PAGE_URL}/{chain}/token/{address}",
        chain = chain.code,
        address = urlencoding::encode(address),
    )
}

/// Best-effort humanization of the map's last-computed timestamp. The
/// upstream format is not documented, so anything that is not RFC 3339 is
/// shown verbatim.
pub fn format_update_time(dt_update: &str) -> String {
    match DateTime::parse_from_rfc3339(dt_update) {
        Ok(time) => time
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M UTC")
            .to_string(),
        Err(_) => dt_update.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;

    #[test]
    fn map_data_deserializes_and_ignores_unknown_fields() {
        let json = r#"{
            "version": 4,
            "chain": "bsc",
            "token_address": "0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95",
            "full_name": "ApeSwap",
            "symbol": "BANANA",
            "dt_update": "2024-03-08T10:23:08.529Z",
            "is_X721": false,
            "nodes": [
                {
                    "address": "0xdead000000000000000000000000000000000000",
                    "amount": 12345.6,
                    "is_contract": true,
                    "name": "Burn",
                    "percentage": 21.78,
                    "transaction_count": 4
                },
                {
                    "address": "0x1234000000000000000000000000000000000000",
                    "amount": 999.0,
                    "is_contract": false,
                    "percentage": 3.02
                }
            ],
            "links": []
        }"#;
        let map: MapData = serde_json::from_str(json).unwrap();
        assert_eq!(map.full_name.as_deref(), Some("ApeSwap"));
        assert_eq!(map.symbol.as_deref(), Some("BANANA"));
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.nodes[0].name.as_deref(), Some("Burn"));
        assert!(map.nodes[0].is_contract);
        assert_eq!(map.nodes[1].name, None);
        assert_eq!(map.nodes[1].percentage, 3.02);
    }

    #[test]
    fn sparse_map_data_deserializes() {
        let map: MapData = serde_json::from_str("{}").unwrap();
        assert_eq!(map.full_name, None);
        assert_eq!(map.symbol, None);
        assert!(map.nodes.is_empty());
    }

    #[test]
    fn page_url_encodes_the_address() {
        let chain = chains::lookup("bsc").unwrap();
        assert_eq!(
            map_page_url(chain, "0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95"),
            "https://app.bubblemaps.io/bsc/token/0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95"
        );
        assert_eq!(
            map_page_url(chain, "a/b c"),
            "https://app.bubblemaps.io/bsc/token/a%2Fb%20c"
        );
    }

    #[test]
    fn update_time_parses_rfc3339_and_falls_back() {
        assert_eq!(
            format_update_time("2024-03-08T10:23:08.529Z"),
            "2024-03-08 10:23 UTC"
        );
        assert_eq!(format_update_time("yesterday"), "yesterday");
    }
}
