use cached::proc_macro::cached;
use serde::Deserialize;

use super::requests::{get_reqwest_client, UpstreamError};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Market data for a token contract. Every field is optional, listings are
/// frequently missing one or more of them.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub price_change_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ContractResponse {
    market_data: Option<ContractMarketData>,
}

#[derive(Debug, Deserialize)]
struct ContractMarketData {
    #[serde(default)]
    current_price: UsdAmount,
    #[serde(default)]
    market_cap: UsdAmount,
    #[serde(default)]
    total_volume: UsdAmount,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct UsdAmount {
    usd: Option<f64>,
}

impl From<ContractResponse> for Option<MarketData> {
    fn from(response: ContractResponse) -> Self {
        response.market_data.map(|market| MarketData {
            price_usd: market.current_price.usd,
            market_cap_usd: market.market_cap.usd,
            volume_24h_usd: market.total_volume.usd,
            price_change_24h: market.price_change_percentage_24h,
        })
    }
}

/// Fetches market data for a contract on a CoinGecko asset platform.
///
/// `Ok(None)` means the token is not listed there (any non-200 status), the
/// caller simply omits the market block from the reply.
#[cached(time = 60, result = true, size = 100)]
pub async fn get_market_data(
    platform: String,
    address: String,
) -> Result<Option<MarketData>, UpstreamError> {
    let url = format!(
        "{COINGECKO_API_URL}/coins/{platform}/contract/{encoded}",
        encoded = urlencoding::encode(&address),
    );
    let response = get_reqwest_client().get(&url).send().await?;
    if !response.status().is_success() {
        log::debug!(
            "CoinGecko returned {status} for {address} on {platform}",
            status = response.status()
        );
        return Ok(None);
    }
    let data = response.json::<ContractResponse>().await?;
    Ok(data.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_response_deserializes() {
        let json = r#"{
            "id": "binancecoin",
            "symbol": "bnb",
            "market_data": {
                "current_price": {"usd": 1.5, "eur": 1.4},
                "market_cap": {"usd": 1000000.0},
                "total_volume": {"usd": 50000.0},
                "price_change_percentage_24h": -2.35
            }
        }"#;
        let response: ContractResponse = serde_json::from_str(json).unwrap();
        let market = Option::<MarketData>::from(response).unwrap();
        assert_eq!(market.price_usd, Some(1.5));
        assert_eq!(market.market_cap_usd, Some(1000000.0));
        assert_eq!(market.volume_24h_usd, Some(50000.0));
        assert_eq!(market.price_change_24h, Some(-2.35));
    }

    #[test]
    fn missing_fields_become_none() {
        let json = r#"{
            "market_data": {
                "current_price": {"usd": 0.002},
                "market_cap": {},
                "total_volume": {"eur": 1.0}
            }
        }"#;
        let response: ContractResponse = serde_json::from_str(json).unwrap();
        let market = Option::<MarketData>::from(response).unwrap();
        assert_eq!(market.price_usd, Some(0.002));
        assert_eq!(market.market_cap_usd, None);
        assert_eq!(market.volume_24h_usd, None);
        assert_eq!(market.price_change_24h, None);
    }

    #[test]
    fn response_without_market_data_is_none() {
        let response: ContractResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(Option::<MarketData>::from(response), None);
    }
}
