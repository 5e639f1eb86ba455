/// Remote vault backup client
///
/// Talks to the Xipher wallet endpoints. Only the encrypted vault blob and the
/// public address map ever leave the device.
use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::blockchain_client::map_transport_error;
use crate::chains::ChainId;
use crate::config_store::NetworkConfig;
use crate::errors::{WalletError, WalletResult};
use crate::services::{RemoteVaultStore, RemoteWallet};
use crate::storage::wallet_store::parse_address_map;
use crate::storage::EncryptedVault;

pub struct SyncClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    token: &'a str,
    encrypted_seed: &'a str,
    salt: String,
    /// JSON object serialized to a string, as the server stores it verbatim.
    addresses: String,
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServerResponse<T> {
    status: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    message: Option<String>,
    data: Option<T>,
}

impl<T> ServerResponse<T> {
    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success") || self.success == Some(true)
    }

    fn error_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct StoredWallet {
    #[serde(default)]
    encrypted_seed: String,
    #[serde(default)]
    addresses: Option<AddressPayload>,
}

/// The server returns the address map either as an object or as its JSON text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddressPayload {
    Text(String),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl AddressPayload {
    fn into_map(self) -> WalletResult<BTreeMap<ChainId, String>> {
        match self {
            AddressPayload::Text(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            AddressPayload::Text(text) => parse_address_map(&text),
            AddressPayload::Object(object) => {
                parse_address_map(&serde_json::Value::Object(object).to_string())
            }
        }
    }
}

impl SyncClient {
    pub fn new(network: &NetworkConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(network.http_timeout_secs))
            .build()
            .map_err(|e| {
                WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(SyncClient {
            client,
            base_url: network.server_url().to_string(),
        })
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> WalletResult<ServerResponse<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        response.json().await.map_err(map_transport_error)
    }
}

#[async_trait::async_trait]
impl RemoteVaultStore for SyncClient {
    async fn save(
        &self,
        token: &str,
        encrypted_seed: &str,
        addresses: &BTreeMap<ChainId, String>,
    ) -> WalletResult<()> {
        let vault = EncryptedVault::from_base64(encrypted_seed)?;
        let request = SaveRequest {
            token,
            encrypted_seed,
            salt: hex::encode(vault.salt()),
            addresses: serde_json::to_string(addresses)?,
        };

        let response: ServerResponse<serde_json::Value> =
            self.post("/api/wallet/save", &request).await?;
        if !response.is_success() {
            return Err(WalletError::NetworkError(format!(
                "Wallet save rejected: {}",
                response.error_message()
            )));
        }
        log::info!("Wallet backup saved to server");
        Ok(())
    }

    async fn fetch(&self, token: &str) -> WalletResult<Option<RemoteWallet>> {
        let response: ServerResponse<StoredWallet> =
            self.post("/api/wallet/get", &GetRequest { token }).await?;
        if !response.is_success() {
            return Err(WalletError::NetworkError(format!(
                "Wallet fetch rejected: {}",
                response.error_message()
            )));
        }

        let Some(stored) = response.data else {
            return Ok(None);
        };
        if stored.encrypted_seed.is_empty() {
            return Ok(None);
        }

        let addresses = match stored.addresses {
            Some(payload) => payload.into_map()?,
            None => BTreeMap::new(),
        };
        Ok(Some(RemoteWallet {
            encrypted_seed: stored.encrypted_seed,
            addresses,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_request_encodes_addresses_as_text() {
        let mut addresses = BTreeMap::new();
        addresses.insert(ChainId::Solana, "So1ana".to_string());
        let request = SaveRequest {
            token: "t",
            encrypted_seed: "blob",
            salt: "00".repeat(16),
            addresses: serde_json::to_string(&addresses).unwrap(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["addresses"], r#"{"solana":"So1ana"}"#);
        assert_eq!(json["salt"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn fetch_response_accepts_string_addresses() {
        let body = r#"{"status":"success","data":{"encrypted_seed":"abc","salt":"","addresses":"{\"ethereum\":\"0x1\",\"dogecoin\":\"D\"}","balances":{}}}"#;
        let response: ServerResponse<StoredWallet> = serde_json::from_str(body).unwrap();
        assert!(response.is_success());
        let stored = response.data.unwrap();
        let map = stored.addresses.unwrap().into_map().unwrap();
        assert_eq!(map.get(&ChainId::Ethereum).map(String::as_str), Some("0x1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn fetch_response_accepts_object_addresses_and_null_data() {
        let body = r#"{"status":"success","data":{"encrypted_seed":"abc","addresses":{"ton":"EQx"}}}"#;
        let response: ServerResponse<StoredWallet> = serde_json::from_str(body).unwrap();
        let map = response.data.unwrap().addresses.unwrap().into_map().unwrap();
        assert_eq!(map.get(&ChainId::Ton).map(String::as_str), Some("EQx"));

        let empty: ServerResponse<StoredWallet> =
            serde_json::from_str(r#"{"status":"success","data":null}"#).unwrap();
        assert!(empty.is_success());
        assert!(empty.data.is_none());
    }

    #[test]
    fn error_response_is_not_success() {
        let response: ServerResponse<StoredWallet> =
            serde_json::from_str(r#"{"success":false,"message":"Invalid or expired token"}"#)
                .unwrap();
        assert!(!response.is_success());
        assert_eq!(response.error_message(), "Invalid or expired token");
    }
}
