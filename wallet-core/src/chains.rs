//! Supported networks and fixed-point amounts.
//!
//! EVM chains (Ethereum, Polygon) share one secp256k1 derivation and address;
//! Solana and TON use their own ed25519 derivations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Polygon,
    Solana,
    Ton,
}

/// Signing curve family used by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Secp256k1,
    Ed25519,
}

/// Static network parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: ChainId,
    pub name: &'static str,
    pub symbol: &'static str,
    pub default_rpc_url: &'static str,
    /// EIP-155 chain id; zero for non-EVM networks.
    pub evm_chain_id: u64,
    pub decimals: u8,
}

impl ChainId {
    pub const ALL: [ChainId; 4] = [
        ChainId::Ethereum,
        ChainId::Polygon,
        ChainId::Solana,
        ChainId::Ton,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon",
            ChainId::Solana => "solana",
            ChainId::Ton => "ton",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, ChainId::Ethereum | ChainId::Polygon)
    }

    pub fn curve(&self) -> CurveKind {
        if self.is_evm() {
            CurveKind::Secp256k1
        } else {
            CurveKind::Ed25519
        }
    }

    pub fn config(&self) -> ChainConfig {
        match self {
            ChainId::Ethereum => ChainConfig {
                id: *self,
                name: "Ethereum",
                symbol: "ETH",
                default_rpc_url: "https://eth.llamarpc.com",
                evm_chain_id: 1,
                decimals: 18,
            },
            ChainId::Polygon => ChainConfig {
                id: *self,
                name: "Polygon",
                symbol: "MATIC",
                default_rpc_url: "https://polygon-rpc.com",
                evm_chain_id: 137,
                decimals: 18,
            },
            ChainId::Solana => ChainConfig {
                id: *self,
                name: "Solana",
                symbol: "SOL",
                default_rpc_url: "https://api.mainnet-beta.solana.com",
                evm_chain_id: 0,
                decimals: 9,
            },
            ChainId::Ton => ChainConfig {
                id: *self,
                name: "TON",
                symbol: "TON",
                default_rpc_url: "https://toncenter.com/api/v2",
                evm_chain_id: 0,
                decimals: 9,
            },
        }
    }

    pub fn decimals(&self) -> u8 {
        self.config().decimals
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainId::Ethereum),
            "polygon" | "matic" => Ok(ChainId::Polygon),
            "solana" | "sol" => Ok(ChainId::Solana),
            "ton" => Ok(ChainId::Ton),
            _ => Err(WalletError::UnsupportedChain(s.trim().to_string())),
        }
    }
}

/// Public receive address for one chain. Safe to persist in cleartext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAddress {
    pub chain_id: ChainId,
    pub address: String,
}

/// Token amount in the chain's smallest unit.
///
/// Uses fixed-point arithmetic so decimal user input never passes through floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    base_units: u128,
    decimals: u8,
}

impl Amount {
    /// Largest supported precision (EVM wei).
    pub const MAX_DECIMALS: u8 = 18;

    pub fn from_base_units(base_units: u128, decimals: u8) -> WalletResult<Self> {
        if decimals > Self::MAX_DECIMALS {
            return Err(WalletError::ValidationError(format!(
                "Unsupported precision: {} decimals",
                decimals
            )));
        }
        Ok(Amount {
            base_units,
            decimals,
        })
    }

    /// Parse a plain decimal string (`"12"`, `"0.5"`) into base units.
    ///
    /// Signs, exponents and separators other than a single `.` are rejected.
    pub fn parse_decimal(amount_str: &str, decimals: u8) -> WalletResult<Self> {
        if decimals > Self::MAX_DECIMALS {
            return Err(WalletError::ValidationError(format!(
                "Unsupported precision: {} decimals",
                decimals
            )));
        }
        if amount_str.is_empty() {
            return Err(WalletError::ValidationError(
                "Amount cannot be empty".to_string(),
            ));
        }

        let parts: Vec<&str> = amount_str.split('.').collect();
        if parts.len() > 2 {
            return Err(WalletError::ValidationError(
                "Invalid decimal format".to_string(),
            ));
        }

        let whole_str = parts[0];
        if whole_str.is_empty() || !whole_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::ValidationError(
                "Invalid number format".to_string(),
            ));
        }
        let whole_part: u128 = whole_str
            .parse()
            .map_err(|_| WalletError::ValidationError("Amount too large".to_string()))?;

        let fractional_units = if parts.len() == 2 {
            let fractional_str = parts[1];
            if fractional_str.is_empty() || !fractional_str.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(WalletError::ValidationError(
                    "Invalid fractional part".to_string(),
                ));
            }
            if fractional_str.len() > decimals as usize {
                return Err(WalletError::ValidationError(format!(
                    "At most {} decimal places allowed",
                    decimals
                )));
            }

            let padded = format!("{:0<width$}", fractional_str, width = decimals as usize);
            padded
                .parse::<u128>()
                .map_err(|_| WalletError::ValidationError("Invalid fractional part".to_string()))?
        } else {
            0
        };

        let total_base_units = whole_part
            .checked_mul(unit_scale(decimals))
            .and_then(|w| w.checked_add(fractional_units))
            .ok_or_else(|| WalletError::ValidationError("Amount overflow".to_string()))?;

        Self::from_base_units(total_base_units, decimals)
    }

    pub fn base_units(&self) -> u128 {
        self.base_units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.base_units == 0
    }

    /// Full-precision decimal rendering without trailing zeros.
    pub fn as_string(&self) -> String {
        let scale = unit_scale(self.decimals);
        let whole = self.base_units / scale;
        let fractional = self.base_units % scale;

        if fractional == 0 {
            whole.to_string()
        } else {
            let frac_str = format!("{:0width$}", fractional, width = self.decimals as usize)
                .trim_end_matches('0')
                .to_string();
            format!("{}.{}", whole, frac_str)
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// `10^decimals`; callers guarantee `decimals <= Amount::MAX_DECIMALS`.
pub(crate) fn unit_scale(decimals: u8) -> u128 {
    10_u128.pow(decimals as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_parse_case_insensitively() {
        assert_eq!("Ethereum".parse::<ChainId>().unwrap(), ChainId::Ethereum);
        assert_eq!(" ton ".parse::<ChainId>().unwrap(), ChainId::Ton);
        let err = "dogecoin".parse::<ChainId>().unwrap_err();
        assert!(matches!(err, WalletError::UnsupportedChain(_)));
    }

    #[test]
    fn evm_chains_share_curve() {
        assert_eq!(ChainId::Ethereum.curve(), ChainId::Polygon.curve());
        assert_eq!(ChainId::Solana.curve(), CurveKind::Ed25519);
        assert_eq!(ChainId::Polygon.config().evm_chain_id, 137);
    }

    #[test]
    fn amount_parses_to_base_units() {
        let amount = Amount::parse_decimal("1.5", 9).unwrap();
        assert_eq!(amount.base_units(), 1_500_000_000);
        assert_eq!(amount.as_string(), "1.5");

        let wei = Amount::parse_decimal("0.000000000000000001", 18).unwrap();
        assert_eq!(wei.base_units(), 1);
    }

    #[test]
    fn amount_rejects_bad_input() {
        assert!(Amount::parse_decimal("", 9).is_err());
        assert!(Amount::parse_decimal("-1", 9).is_err());
        assert!(Amount::parse_decimal("1e5", 9).is_err());
        assert!(Amount::parse_decimal("1.", 9).is_err());
        assert!(Amount::parse_decimal(".5", 9).is_err());
        assert!(Amount::parse_decimal("1.0000000001", 9).is_err());
        assert!(Amount::parse_decimal("1.2.3", 9).is_err());
    }
}
