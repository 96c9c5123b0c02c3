use std::collections::HashMap;

use lazy_static::lazy_static;

/// One supported network. `code` is what users type after the token address,
/// `display_name` is what they see in replies, `coingecko_platform` is the
/// CoinGecko asset platform id used for contract lookups, absent for chains
/// CoinGecko does not index by contract address.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainEntry {
    pub code: &'static str,
    pub display_name: &'static str,
    pub coingecko_platform: Option<&'static str>,
}

static CHAINS: &[ChainEntry] = &[
    ChainEntry {
        code: "eth",
        display_name: "Ethereum",
        coingecko_platform: Some("ethereum"),
    },
    ChainEntry {
        code: "bsc",
        display_name: "BNB Smart Chain",
        coingecko_platform: Some("binance-smart-chain"),
    },
    ChainEntry {
        code: "ftm",
        display_name: "Fantom",
        coingecko_platform: Some("fantom"),
    },
    ChainEntry {
        code: "avax",
        display_name: "Avalanche",
        coingecko_platform: Some("avalanche"),
    },
    ChainEntry {
        code: "cro",
        display_name: "Cronos",
        coingecko_platform: Some("cronos"),
    },
    ChainEntry {
        code: "arbi",
        display_name: "Arbitrum",
        coingecko_platform: Some("arbitrum-one"),
    },
    ChainEntry {
        code: "poly",
        display_name: "Polygon",
        coingecko_platform: Some("polygon-pos"),
    },
    ChainEntry {
        code: "base",
        display_name: "Base",
        coingecko_platform: Some("base"),
    },
    ChainEntry {
        code: "sol",
        display_name: "Solana",
        coingecko_platform: None,
    },
    ChainEntry {
        code: "sonic",
        display_name: "Sonic",
        coingecko_platform: None,
    },
];

lazy_static! {
    static ref CHAINS_BY_CODE: HashMap<&'static str, &'static ChainEntry> =
        CHAINS.iter().map(|entry| (entry.code, entry)).collect();
}

/// Case-insensitive lookup of a chain code. Misses are a normal outcome,
/// callers translate them into a user-facing error.
pub fn lookup(code: &str) -> Option<&'static ChainEntry> {
    CHAINS_BY_CODE
        .get(code.to_ascii_lowercase().as_str())
        .copied()
}

/// Chain codes in declaration order, for "Supported chains:" lists.
pub fn supported_codes() -> impl Iterator<Item = &'static str> {
    CHAINS.iter().map(|entry| entry.code)
}

pub fn entries() -> impl Iterator<Item = &'static ChainEntry> {
    CHAINS.iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_supported_codes_resolve() {
        for code in supported_codes() {
            let entry = lookup(code).expect("registered code must resolve");
            assert_eq!(entry.code, code);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("BSC"), lookup("bsc"));
        assert_eq!(lookup("Eth").unwrap().display_name, "Ethereum");
        assert_eq!(lookup("SOL").unwrap().code, "sol");
    }

    #[test]
    fn unknown_codes_fail() {
        assert_eq!(lookup("notachain"), None);
        assert_eq!(lookup(""), None);
        assert_eq!(lookup("ethereum"), None);
    }

    #[test]
    fn codes_are_unique_and_lowercase() {
        let codes: Vec<_> = supported_codes().collect();
        let mut deduped = codes.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(codes.len(), deduped.len());
        for code in codes {
            assert_eq!(code, code.to_ascii_lowercase());
        }
    }

    #[test]
    fn chains_without_contract_listings_have_no_platform() {
        assert_eq!(lookup("sol").unwrap().coingecko_platform, None);
        assert_eq!(lookup("sonic").unwrap().coingecko_platform, None);
        assert_eq!(
            lookup("bsc").unwrap().coingecko_platform,
            Some("binance-smart-chain")
        );
    }
}
