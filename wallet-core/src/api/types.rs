use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chains::ChainId;
use crate::errors::{ErrorKind, WalletError, WalletResult};
use crate::services::ChainBalance;
use crate::validation::escape_html;

/// Envelope for every bridge response. Payload fields are flattened next to
/// `success`; failures carry only a sanitized message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            retry_after_secs: None,
        }
    }

    pub fn failure(error: &WalletError) -> Self {
        let retry_after_secs = match error {
            WalletError::RateLimited { retry_after_secs }
            | WalletError::LockedOut { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            success: false,
            data: None,
            error: Some(error.sanitized()),
            error_kind: Some(error.kind()),
            retry_after_secs,
        }
    }

    pub fn from_result(result: WalletResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatusResponse {
    pub has_wallet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressesResponse {
    pub addresses: BTreeMap<ChainId, String>,
    /// False while the map is an unchecked copy from a remote backup.
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletResponse {
    pub mnemonic: String,
    pub word_count: usize,
    pub addresses: BTreeMap<ChainId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWalletResponse {
    pub addresses: BTreeMap<ChainId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub chain: ChainId,
    pub amount: String,
    pub usd: f64,
    pub available: bool,
}

impl From<ChainBalance> for BalanceEntry {
    fn from(balance: ChainBalance) -> Self {
        Self {
            chain: balance.chain_id,
            amount: balance.crypto,
            usd: balance.usd,
            available: balance.available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    pub balances: Vec<BalanceEntry>,
    pub total_usd: f64,
}

impl BalancesResponse {
    pub fn from_balances(balances: BTreeMap<ChainId, ChainBalance>) -> Self {
        let balances: Vec<BalanceEntry> = balances.into_values().map(BalanceEntry::from).collect();
        let total_usd = balances.iter().map(|entry| entry.usd).sum();
        Self {
            balances,
            total_usd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub tx_hash: String,
    pub chain: ChainId,
}

/// Validator outcome as returned to the bridge, with any message escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<crate::validation::ValidationResult> for ValidationResponse {
    fn from(result: crate::validation::ValidationResult) -> Self {
        Self {
            valid: result.valid,
            error: result.error.map(|message| escape_html(&message)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatusResponse {
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_payload_is_flattened() {
        let response = ApiResponse::ok(WalletStatusResponse { has_wallet: true });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "hasWallet": true}));
    }

    #[test]
    fn failure_is_sanitized() {
        let err = WalletError::ValidationError("<script>alert(1)</script>".into());
        let response: ApiResponse<WalletStatusResponse> = ApiResponse::failure(&err);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "validation");
        let message = json["error"].as_str().unwrap();
        assert!(!message.contains('<'));
        assert!(message.contains("&lt;script&gt;"));
    }

    #[test]
    fn lockout_carries_retry_hint() {
        let err = WalletError::LockedOut {
            retry_after_secs: 1800,
        };
        let response: ApiResponse<LockStatusResponse> = ApiResponse::failure(&err);
        assert_eq!(response.retry_after_secs, Some(1800));
        assert_eq!(response.error_kind, Some(ErrorKind::Locked));
    }

    #[test]
    fn balances_total_usd() {
        let mut balances = BTreeMap::new();
        balances.insert(
            ChainId::Solana,
            ChainBalance {
                chain_id: ChainId::Solana,
                crypto: "2".into(),
                usd: 10.5,
                available: true,
            },
        );
        balances.insert(ChainId::Ton, ChainBalance::unavailable(ChainId::Ton));
        let response = BalancesResponse::from_balances(balances);
        assert_eq!(response.balances.len(), 2);
        assert_eq!(response.total_usd, 10.5);
        assert_eq!(response.balances[1].amount, "0");
    }
}
