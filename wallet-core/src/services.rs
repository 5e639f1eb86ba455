//! Outbound service seams used by the wallet core.
//!
//! The HTTP implementations live in `blockchain_client` and `sync_client`;
//! tests substitute in-process fakes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chains::{Amount, ChainId};
use crate::errors::WalletResult;
use crate::transaction::Transaction;

/// Balance of one chain address as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
    pub chain_id: ChainId,
    /// Decimal amount in whole tokens.
    pub crypto: String,
    pub usd: f64,
    /// False when the oracle could not be reached and the entry is a placeholder.
    pub available: bool,
}

impl ChainBalance {
    pub fn new(chain_id: ChainId, amount: Amount, usd: f64) -> Self {
        Self {
            chain_id,
            crypto: amount.as_string(),
            usd,
            available: true,
        }
    }

    pub fn unavailable(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            crypto: "0".to_string(),
            usd: 0.0,
            available: false,
        }
    }
}

/// Encrypted wallet record held by the remote sync service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWallet {
    /// Base64 vault blob, never decrypted server-side.
    pub encrypted_seed: String,
    pub addresses: BTreeMap<ChainId, String>,
}

/// Account state an EVM transfer needs before it can be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmTxParams {
    pub nonce: u64,
    /// Wei per gas.
    pub gas_price: u128,
    pub gas_limit: u64,
}

/// Gas for a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Read-only balance lookups.
#[async_trait::async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Current balance of `address` on `chain`.
    async fn balance(&self, chain: ChainId, address: &str) -> WalletResult<ChainBalance>;
}

/// Broadcasts signed transactions.
#[async_trait::async_trait]
pub trait TransactionRelay: Send + Sync {
    /// Nonce and gas price for a transfer sent from `from` on an EVM chain.
    async fn evm_params(&self, chain: ChainId, from: &str) -> WalletResult<EvmTxParams>;

    /// Submit a signed transaction and return the transaction hash.
    ///
    /// Callers must treat an error after submission as "status unknown".
    async fn relay(&self, transaction: &Transaction, token: Option<&str>) -> WalletResult<String>;
}

/// Remote backup of the encrypted vault.
#[async_trait::async_trait]
pub trait RemoteVaultStore: Send + Sync {
    /// Upload the encrypted blob and public address map.
    async fn save(
        &self,
        token: &str,
        encrypted_seed: &str,
        addresses: &BTreeMap<ChainId, String>,
    ) -> WalletResult<()>;

    /// Fetch the stored record, `None` when the account has no wallet.
    async fn fetch(&self, token: &str) -> WalletResult<Option<RemoteWallet>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_serializes_camel_case() {
        let amount = Amount::parse_decimal("1.5", 18).unwrap();
        let balance = ChainBalance::new(ChainId::Ethereum, amount, 0.0);
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["chainId"], "ethereum");
        assert_eq!(json["crypto"], "1.5");
        assert_eq!(json["available"], true);
    }

    #[test]
    fn unavailable_balance_is_zero() {
        let balance = ChainBalance::unavailable(ChainId::Ton);
        assert_eq!(balance.crypto, "0");
        assert!(!balance.available);
    }
}
