/// Chain RPC and relay client
///
/// Balance queries go straight to each chain's public RPC endpoint (JSON-RPC for
/// EVM and Solana, the toncenter HTTP API for TON). Signed transactions are handed
/// to the Xipher relay service. EVM transfers travel as raw EIP-155 transactions;
/// nonce and gas price are read from the chain before signing.
use crate::chains::{Amount, ChainId};
use crate::config_store::NetworkConfig;
use crate::errors::{WalletError, WalletResult};
use crate::services::{
    BalanceOracle, ChainBalance, EvmTxParams, TransactionRelay, TRANSFER_GAS_LIMIT,
};
use crate::transaction::Transaction;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client for chain RPC and transaction relay
pub struct BlockchainClient {
    client: Client,
    network: NetworkConfig,
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: String,
    method: String,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // fields are populated via serde; not all are read by all call sites
struct JsonRpcResponse<T> {
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    id: u64,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Solana `getBalance` result
#[derive(Debug, Deserialize)]
struct SolanaBalance {
    value: u64,
}

/// toncenter `getAddressBalance` response
#[derive(Debug, Deserialize)]
struct TonCenterResponse {
    ok: bool,
    result: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    chain: ChainId,
    signed_tx: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    success: bool,
    tx_hash: Option<String>,
    message: Option<String>,
}

impl BlockchainClient {
    /// Create a new client for the configured endpoints
    pub fn new(network: NetworkConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(network.http_timeout_secs))
            .build()
            .map_err(|e| {
                WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(BlockchainClient { client, network })
    }

    /// Get native balance of `address` in base units
    pub async fn get_balance(&self, chain: ChainId, address: &str) -> WalletResult<Amount> {
        let base_units = match chain {
            ChainId::Ethereum | ChainId::Polygon => {
                let params = serde_json::json!([address, "latest"]);
                let result: String = self.rpc_call(chain, "eth_getBalance", params).await?;
                parse_hex_quantity(&result)?
            }
            ChainId::Solana => {
                let params = serde_json::json!([address]);
                let result: SolanaBalance = self.rpc_call(chain, "getBalance", params).await?;
                u128::from(result.value)
            }
            ChainId::Ton => self.ton_balance(address).await?,
        };
        Amount::from_base_units(base_units, chain.decimals())
    }

    /// Pending nonce and current gas price for `from`
    pub async fn get_evm_params(&self, chain: ChainId, from: &str) -> WalletResult<EvmTxParams> {
        if !chain.is_evm() {
            return Err(WalletError::UnsupportedChain(chain.to_string()));
        }
        let nonce: String = self
            .rpc_call(
                chain,
                "eth_getTransactionCount",
                serde_json::json!([from, "pending"]),
            )
            .await?;
        let gas_price: String = self
            .rpc_call(chain, "eth_gasPrice", serde_json::json!([]))
            .await?;

        let nonce = u64::try_from(parse_hex_quantity(&nonce)?)
            .map_err(|_| WalletError::NetworkError("Nonce out of range".to_string()))?;
        Ok(EvmTxParams {
            nonce,
            gas_price: parse_hex_quantity(&gas_price)?,
            gas_limit: TRANSFER_GAS_LIMIT,
        })
    }

    /// Submit a signed transaction through the relay service
    pub async fn relay_transaction(
        &self,
        transaction: &Transaction,
        token: Option<&str>,
    ) -> WalletResult<String> {
        let request = RelayRequest {
            token,
            chain: transaction.chain_id,
            signed_tx: transaction.relay_payload()?,
        };
        let url = format!("{}/api/wallet/relay-tx", self.network.server_url());
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let relay: RelayResponse = response.json().await.map_err(map_transport_error)?;
        match (relay.success, relay.tx_hash) {
            (true, Some(tx_hash)) if !tx_hash.is_empty() => {
                log::info!("Relayed {} transaction", transaction.chain_id);
                Ok(tx_hash)
            }
            _ => Err(WalletError::NetworkError(format!(
                "Relay rejected transaction: {}",
                relay.message.unwrap_or_else(|| "unknown error".to_string())
            ))),
        }
    }

    async fn ton_balance(&self, address: &str) -> WalletResult<u128> {
        let url = format!(
            "{}/getAddressBalance",
            self.network.rpc_url(ChainId::Ton).trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[("address", address)])
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: TonCenterResponse = response.json().await.map_err(map_transport_error)?;
        if !body.ok {
            return Err(WalletError::NetworkError(format!(
                "TON API error: {}",
                body.error.unwrap_or_default()
            )));
        }
        let result = body
            .result
            .ok_or_else(|| WalletError::NetworkError("No result in TON response".to_string()))?;
        result
            .parse()
            .map_err(|_| WalletError::NetworkError("Invalid TON balance format".to_string()))
    }

    /// Make a JSON-RPC call against the endpoint configured for `chain`
    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        chain: ChainId,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let url = self.network.rpc_url(chain);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response.json().await.map_err(map_transport_error)?;

        if let Some(error) = rpc_response.error {
            return Err(WalletError::NetworkError(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| WalletError::NetworkError("No result in RPC response".to_string()))
    }
}

#[async_trait::async_trait]
impl BalanceOracle for BlockchainClient {
    async fn balance(&self, chain: ChainId, address: &str) -> WalletResult<ChainBalance> {
        let amount = self.get_balance(chain, address).await?;
        Ok(ChainBalance::new(chain, amount, 0.0))
    }
}

#[async_trait::async_trait]
impl TransactionRelay for BlockchainClient {
    async fn evm_params(&self, chain: ChainId, from: &str) -> WalletResult<EvmTxParams> {
        self.get_evm_params(chain, from).await
    }

    async fn relay(&self, transaction: &Transaction, token: Option<&str>) -> WalletResult<String> {
        self.relay_transaction(transaction, token).await
    }
}

pub(crate) fn map_transport_error(error: reqwest::Error) -> WalletError {
    if error.is_timeout() {
        WalletError::Timeout
    } else if error.is_decode() {
        WalletError::NetworkError(format!("Failed to parse response: {}", error))
    } else {
        WalletError::NetworkError(format!("HTTP request failed: {}", error))
    }
}

/// Parse an Ethereum `QUANTITY` such as `"0x1bc16d674ec80000"`.
fn parse_hex_quantity(value: &str) -> WalletResult<u128> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::NetworkError("Invalid quantity format".to_string()))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| WalletError::NetworkError("Invalid quantity format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert_eq!(
            parse_hex_quantity("0x1bc16d674ec80000").unwrap(),
            2_000_000_000_000_000_000
        );
        assert!(parse_hex_quantity("1234").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    fn transaction(chain: ChainId, raw_tx: Option<&str>) -> Transaction {
        Transaction {
            chain_id: chain,
            from: "from".into(),
            to: "to".into(),
            amount: "1".into(),
            public_key: "00".into(),
            payload: "{}".into(),
            signature: "00".into(),
            raw_tx: raw_tx.map(str::to_string),
        }
    }

    #[test]
    fn relay_request_matches_server_contract() {
        let transaction = transaction(ChainId::Solana, None);
        let request = RelayRequest {
            token: None,
            chain: transaction.chain_id,
            signed_tx: transaction.relay_payload().unwrap(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chain"], "solana");
        assert!(json.get("token").is_none());
        assert!(json["signed_tx"].as_str().unwrap().contains("\"chainId\":\"solana\""));
    }

    #[test]
    fn evm_relay_carries_raw_transaction() {
        let transaction = transaction(ChainId::Polygon, Some("0xf86c"));
        let request = RelayRequest {
            token: Some("t"),
            chain: transaction.chain_id,
            signed_tx: transaction.relay_payload().unwrap(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["signed_tx"], "0xf86c");
        assert_eq!(json["token"], "t");
    }

    #[tokio::test]
    async fn evm_params_reject_non_evm_chains() {
        let client = BlockchainClient::new(NetworkConfig::default()).unwrap();
        let result = client.get_evm_params(ChainId::Ton, "EQx").await;
        assert!(matches!(result, Err(WalletError::UnsupportedChain(_))));
    }

    #[test]
    fn relay_response_parses() {
        let ok: RelayResponse =
            serde_json::from_str(r#"{"success":true,"tx_hash":"0xabc","chain":"ethereum"}"#)
                .unwrap();
        assert!(ok.success);
        assert_eq!(ok.tx_hash.as_deref(), Some("0xabc"));

        let err: RelayResponse =
            serde_json::from_str(r#"{"success":false,"message":"Invalid or expired token"}"#)
                .unwrap();
        assert!(!err.success);
        assert!(err.tx_hash.is_none());
    }

    #[test]
    fn toncenter_response_parses() {
        let body: TonCenterResponse =
            serde_json::from_str(r#"{"ok":true,"result":"1500000000"}"#).unwrap();
        assert!(body.ok);
        assert_eq!(body.result.as_deref(), Some("1500000000"));
        assert!(body.error.is_none());
    }
}
