//! Supported chains and their per-chain constants

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How fees are priced on a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeModel {
    /// Base fee plus priority tip (EIP-1559)
    Eip1559,
    /// A single flat fee rate with no fee market
    Flat,
}

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bitcoin,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Bitcoin, Chain::Solana];

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bitcoin => "bitcoin",
            Chain::Solana => "solana",
        }
    }

    /// Native currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bitcoin => "BTC",
            Chain::Solana => "SOL",
        }
    }

    /// Decimal places between base units and display units
    pub fn decimals(&self) -> u8 {
        match self {
            Chain::Ethereum => 18,
            Chain::Bitcoin => 8,
            Chain::Solana => 9,
        }
    }

    /// Conventional HD derivation path for the first account
    pub fn derivation_path(&self) -> &'static str {
        match self {
            Chain::Ethereum => "m/44'/60'/0'/0/0",
            // BIP-84 native segwit
            Chain::Bitcoin => "m/84'/0'/0'/0/0",
            // SLIP-0010, all levels hardened
            Chain::Solana => "m/44'/501'/0'/0'",
        }
    }

    pub fn fee_model(&self) -> FeeModel {
        match self {
            Chain::Ethereum => FeeModel::Eip1559,
            Chain::Bitcoin | Chain::Solana => FeeModel::Flat,
        }
    }

    /// EIP-155 chain id, for account-based EVM chains only
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Bitcoin | Chain::Solana => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Chain::Ethereum),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_tickers() {
        assert_eq!("ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("BTC".parse::<Chain>().unwrap(), Chain::Bitcoin);
        assert_eq!("sol".parse::<Chain>().unwrap(), Chain::Solana);
    }

    #[test]
    fn unknown_chain_is_unsupported() {
        let err = "dogecoin".parse::<Chain>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedChain(name) if name == "dogecoin"));
    }

    #[test]
    fn only_ethereum_has_a_fee_market() {
        assert_eq!(Chain::Ethereum.fee_model(), FeeModel::Eip1559);
        assert_eq!(Chain::Bitcoin.fee_model(), FeeModel::Flat);
        assert_eq!(Chain::Solana.fee_model(), FeeModel::Flat);
    }
}
