use std::fmt;

use crate::chains::{self, ChainEntry};

/// A validated analysis request: the token address exactly as the user typed
/// it and the chain resolved through the registry. The address format varies
/// by chain and is not validated beyond being non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub address: String,
    pub chain: &'static ChainEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than two whitespace-separated tokens. Carries the raw input.
    MissingArgument(String),
    /// The chain code is not in the registry. Carries the attempted code.
    UnknownChain(String),
    /// The address token is empty, or the line has trailing tokens beyond
    /// address and chain. Carries the raw input.
    MalformedAddress(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingArgument(raw) => {
                write!(f, "missing address or chain code in {raw:?}")
            }
            ParseError::UnknownChain(code) => write!(f, "unknown chain {code:?}"),
            ParseError::MalformedAddress(raw) => write!(f, "malformed input {raw:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a raw `<address> <chain>` line into an [`AnalysisRequest`].
///
/// Pure function over its input and the static registry. Lines with more than
/// two tokens are rejected rather than truncated, matching the strict format
/// check of the original bot.
pub fn parse(raw: &str) -> Result<AnalysisRequest, ParseError> {
    let mut parts = raw.splitn(2, char::is_whitespace);
    let address = parts.next().unwrap_or_default();
    let Some(rest) = parts.next() else {
        return Err(ParseError::MissingArgument(raw.to_string()));
    };
    let mut rest_tokens = rest.split_whitespace();
    let Some(code) = rest_tokens.next() else {
        return Err(ParseError::MissingArgument(raw.to_string()));
    };
    if rest_tokens.next().is_some() {
        return Err(ParseError::MalformedAddress(raw.to_string()));
    }
    if address.trim().is_empty() {
        return Err(ParseError::MalformedAddress(raw.to_string()));
    }
    match chains::lookup(code) {
        Some(chain) => Ok(AnalysisRequest {
            address: address.to_string(),
            chain,
        }),
        None => Err(ParseError::UnknownChain(code.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pair_parses() {
        let request = parse("0xABC123 bsc").unwrap();
        assert_eq!(request.address, "0xABC123");
        assert_eq!(request.chain.code, "bsc");
    }

    #[test]
    fn chain_code_is_case_insensitive() {
        let request = parse("0xABC123 BSC").unwrap();
        assert_eq!(request.chain.code, "bsc");
    }

    #[test]
    fn address_is_kept_as_given() {
        let request = parse("EjpUeZQ3xT2Q35b9t5uAqxcJq1QqykZzBJbJxDoX1eK sol").unwrap();
        assert_eq!(
            request.address,
            "EjpUeZQ3xT2Q35b9t5uAqxcJq1QqykZzBJbJxDoX1eK"
        );
        assert_eq!(request.chain.display_name, "Solana");
    }

    #[test]
    fn unknown_chain_echoes_the_code() {
        assert_eq!(
            parse("0xABC123 notachain"),
            Err(ParseError::UnknownChain("notachain".to_string()))
        );
    }

    #[test]
    fn single_token_is_missing_argument() {
        assert_eq!(
            parse("0xABC123"),
            Err(ParseError::MissingArgument("0xABC123".to_string()))
        );
    }

    #[test]
    fn empty_input_is_missing_argument() {
        assert_eq!(parse(""), Err(ParseError::MissingArgument(String::new())));
    }

    #[test]
    fn trailing_whitespace_only_is_missing_argument() {
        assert_eq!(
            parse("0xABC123   "),
            Err(ParseError::MissingArgument("0xABC123   ".to_string()))
        );
    }

    #[test]
    fn leading_whitespace_makes_the_address_empty() {
        assert_eq!(
            parse("   bsc"),
            Err(ParseError::MalformedAddress("   bsc".to_string()))
        );
    }

    #[test]
    fn extra_tokens_are_rejected() {
        assert_eq!(
            parse("0xABC123 bsc extra"),
            Err(ParseError::MalformedAddress("0xABC123 bsc extra".to_string()))
        );
    }

    #[test]
    fn tabs_and_repeated_spaces_separate_tokens() {
        let request = parse("0xABC123\tbsc").unwrap();
        assert_eq!(request.chain.code, "bsc");
        let request = parse("0xABC123   eth").unwrap();
        assert_eq!(request.chain.code, "eth");
    }

    #[test]
    fn parsing_is_idempotent() {
        for raw in ["0xABC123 bsc", "0xABC123 notachain", "0xABC123", "   bsc"] {
            assert_eq!(parse(raw), parse(raw));
        }
    }
}
