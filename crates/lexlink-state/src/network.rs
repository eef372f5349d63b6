//! Bitcoin network selection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lexlink_core::ValidationError;

/// The Bitcoin network an order is paid on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
        }
    }

    /// Confirmations a `btc` payment needs before the order may finalize.
    pub fn required_confirmations(&self) -> u32 {
        match self {
            Self::Mainnet => 3,
            Self::Testnet | Self::Signet | Self::Regtest => 1,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Self::Mainnet)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "signet" => Ok(Self::Signet),
            "regtest" => Ok(Self::Regtest),
            other => Err(ValidationError::field(
                "network",
                format!("unknown network '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_needs_three_confirmations() {
        assert_eq!(Network::Mainnet.required_confirmations(), 3);
    }

    #[test]
    fn test_networks_need_one_confirmation() {
        for n in [Network::Testnet, Network::Signet, Network::Regtest] {
            assert_eq!(n.required_confirmations(), 1, "{n}");
        }
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("MAIN".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!(" testnet ".parse::<Network>().unwrap(), Network::Testnet);
        assert!("litecoin".parse::<Network>().is_err());
    }

    #[test]
    fn serde_lowercase() {
        assert_eq!(serde_json::to_string(&Network::Signet).unwrap(), "\"signet\"");
    }
}
