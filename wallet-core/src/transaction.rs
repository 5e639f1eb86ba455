use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, Signature, TxKind, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chains::{Amount, ChainId};
use crate::crypto::ChainKeyPair;
use crate::errors::{WalletError, WalletResult};
use crate::services::EvmTxParams;

/// Canonical body covered by the signature.
///
/// Field order is fixed by declaration so the serialized bytes are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub chain: ChainId,
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    /// Amount in base units, as a decimal string.
    pub value: String,
    pub decimals: u8,
    pub timestamp: i64,
}

impl TransactionPayload {
    pub fn new(
        chain: ChainId,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Amount,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            chain,
            chain_id: chain.config().evm_chain_id,
            from: from.into(),
            to: to.into(),
            value: amount.base_units().to_string(),
            decimals: amount.decimals(),
            timestamp: timestamp.timestamp_millis(),
        }
    }

    pub fn canonical_json(&self) -> WalletResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A signed transfer ready for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub chain_id: ChainId,
    pub from: String,
    pub to: String,
    /// Human-readable amount in whole tokens.
    pub amount: String,
    pub public_key: String,
    pub payload: String,
    pub signature: String,
    /// `0x`-prefixed EIP-155 transaction for EVM chains, ready for
    /// `eth_sendRawTransaction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<String>,
}

impl Transaction {
    /// Sign `payload` with `key`. The key must belong to `payload.from`.
    pub fn sign(payload: &TransactionPayload, key: &ChainKeyPair) -> WalletResult<Self> {
        if key.address(payload.chain)? != payload.from {
            return Err(WalletError::CryptoError(
                "signing key does not match sender address".to_string(),
            ));
        }

        let canonical = payload.canonical_json()?;
        let signature = key.sign(canonical.as_bytes())?;
        let value: u128 = payload
            .value
            .parse()
            .map_err(|_| WalletError::ValidationError("Invalid amount".to_string()))?;
        let amount = Amount::from_base_units(value, payload.decimals)?;

        Ok(Self {
            chain_id: payload.chain,
            from: payload.from.clone(),
            to: payload.to.clone(),
            amount: amount.as_string(),
            public_key: key.public_key_hex(),
            payload: canonical,
            signature: hex::encode(signature),
            raw_tx: None,
        })
    }

    /// Sign an EVM transfer: the canonical payload plus the legacy EIP-155
    /// transaction built from the same fields.
    pub fn sign_evm(
        payload: &TransactionPayload,
        key: &ChainKeyPair,
        params: &EvmTxParams,
    ) -> WalletResult<Self> {
        let mut transaction = Self::sign(payload, key)?;
        transaction.raw_tx = Some(encode_legacy_transfer(payload, key, params)?);
        Ok(transaction)
    }

    pub fn verify_with(&self, key: &ChainKeyPair) -> WalletResult<bool> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| WalletError::CryptoError(format!("Invalid signature hex: {}", e)))?;
        key.verify(self.payload.as_bytes(), &signature)
    }

    /// Wire form handed to the relay service.
    pub fn to_wire(&self) -> WalletResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// What the relay forwards to the node: the raw transaction when one was
    /// built, otherwise the signed wire JSON.
    pub fn relay_payload(&self) -> WalletResult<String> {
        match &self.raw_tx {
            Some(raw) => Ok(raw.clone()),
            None => self.to_wire(),
        }
    }
}

fn encode_legacy_transfer(
    payload: &TransactionPayload,
    key: &ChainKeyPair,
    params: &EvmTxParams,
) -> WalletResult<String> {
    let ChainKeyPair::Secp256k1(signing_key) = key else {
        return Err(WalletError::CryptoError(format!(
            "{} transfers need a secp256k1 key",
            payload.chain
        )));
    };
    if payload.chain_id == 0 {
        return Err(WalletError::UnsupportedChain(payload.chain.to_string()));
    }

    let to: Address = payload
        .to
        .parse()
        .map_err(|_| WalletError::ValidationError("Invalid recipient address".to_string()))?;
    let value: u128 = payload
        .value
        .parse()
        .map_err(|_| WalletError::ValidationError("Invalid amount".to_string()))?;

    let tx = TxLegacy {
        chain_id: Some(payload.chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: params.gas_limit,
        to: TxKind::Call(to),
        value: U256::from(value),
        input: Bytes::new(),
    };

    let hash = tx.signature_hash();
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|e| WalletError::CryptoError(e.to_string()))?;
    let rs = signature.to_bytes();
    let signature = Signature::new(
        U256::from_be_slice(&rs[..32]),
        U256::from_be_slice(&rs[32..]),
        recovery_id.is_y_odd(),
    );

    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
    Ok(format!("0x{}", hex::encode(envelope.encoded_2718())))
}
