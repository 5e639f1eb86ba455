use std::collections::BTreeMap;
use std::sync::Arc;

use super::secure_store::{SecureStore, StoreBatch};
use super::vault::EncryptedVault;
use crate::chains::ChainId;
use crate::errors::WalletResult;

pub const KEY_ENCRYPTED_SEED: &str = "encrypted_seed";
pub const KEY_WALLET_ADDRESSES: &str = "wallet_addresses";
pub const KEY_HAS_WALLET: &str = "has_wallet";
pub const KEY_ADDRESSES_VERIFIED: &str = "addresses_verified";
pub const KEY_SECURITY_STATE: &str = "security_state";

/// Typed access to the wallet's persisted keys.
#[derive(Clone)]
pub struct WalletStore {
    store: Arc<dyn SecureStore>,
}

impl WalletStore {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    pub fn secure_store(&self) -> Arc<dyn SecureStore> {
        Arc::clone(&self.store)
    }

    pub fn has_wallet(&self) -> WalletResult<bool> {
        let flagged = self.store.get(KEY_HAS_WALLET)?.as_deref() == Some("true");
        Ok(flagged && self.store.get(KEY_ENCRYPTED_SEED)?.is_some())
    }

    /// Raw base64 blob exactly as stored and synced.
    pub fn vault_blob(&self) -> WalletResult<Option<String>> {
        self.store.get(KEY_ENCRYPTED_SEED)
    }

    pub fn load_vault(&self) -> WalletResult<Option<EncryptedVault>> {
        match self.vault_blob()? {
            Some(blob) => Ok(Some(EncryptedVault::from_base64(&blob)?)),
            None => Ok(None),
        }
    }

    pub fn load_addresses(&self) -> WalletResult<BTreeMap<ChainId, String>> {
        match self.store.get(KEY_WALLET_ADDRESSES)? {
            Some(json) => parse_address_map(&json),
            None => Ok(BTreeMap::new()),
        }
    }

    /// True once the stored address map was derived on this device from the
    /// vault's mnemonic. Maps adopted from a remote backup start out false.
    pub fn addresses_verified(&self) -> WalletResult<bool> {
        Ok(self.store.get(KEY_ADDRESSES_VERIFIED)?.as_deref() == Some("true"))
    }

    /// Vault, locally derived addresses and the wallet flag in one atomic write.
    pub fn save_wallet(
        &self,
        vault: &EncryptedVault,
        addresses: &BTreeMap<ChainId, String>,
    ) -> WalletResult<()> {
        self.save_wallet_blob(&vault.to_base64(), addresses, true)
    }

    pub fn save_wallet_blob(
        &self,
        blob: &str,
        addresses: &BTreeMap<ChainId, String>,
        verified: bool,
    ) -> WalletResult<()> {
        let batch = StoreBatch::new()
            .put(KEY_ENCRYPTED_SEED, blob)
            .put(KEY_WALLET_ADDRESSES, serde_json::to_string(addresses)?)
            .put(KEY_ADDRESSES_VERIFIED, verified.to_string())
            .put(KEY_HAS_WALLET, "true");
        self.store.apply(batch)
    }

    /// Replace the address map with one derived from the vault.
    pub fn save_verified_addresses(
        &self,
        addresses: &BTreeMap<ChainId, String>,
    ) -> WalletResult<()> {
        let batch = StoreBatch::new()
            .put(KEY_WALLET_ADDRESSES, serde_json::to_string(addresses)?)
            .put(KEY_ADDRESSES_VERIFIED, "true");
        self.store.apply(batch)
    }

    pub fn replace_vault(&self, vault: &EncryptedVault) -> WalletResult<()> {
        self.store.put(KEY_ENCRYPTED_SEED, &vault.to_base64())
    }

    pub fn load_security_state(&self) -> WalletResult<Option<String>> {
        self.store.get(KEY_SECURITY_STATE)
    }

    pub fn save_security_state(&self, state: &str) -> WalletResult<()> {
        self.store.put(KEY_SECURITY_STATE, state)
    }
}

/// Chain→address JSON. Entries for chains this build does not know are skipped.
pub fn parse_address_map(json: &str) -> WalletResult<BTreeMap<ChainId, String>> {
    let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
    let mut addresses = BTreeMap::new();
    for (chain, address) in raw {
        match chain.parse::<ChainId>() {
            Ok(chain) => {
                addresses.insert(chain, address);
            }
            Err(_) => log::debug!("Skipping address for unknown chain {}", chain),
        }
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySecureStore;

    #[test]
    fn has_wallet_needs_flag_and_blob() {
        let memory = Arc::new(MemorySecureStore::new());
        let store = WalletStore::new(memory.clone());
        assert!(!store.has_wallet().unwrap());

        memory.put(KEY_HAS_WALLET, "true").unwrap();
        assert!(!store.has_wallet().unwrap());

        let mut addresses = BTreeMap::new();
        addresses.insert(ChainId::Ethereum, "0xabc".to_string());
        store.save_wallet_blob("AAAA", &addresses, false).unwrap();
        assert!(store.has_wallet().unwrap());
        assert_eq!(store.load_addresses().unwrap(), addresses);
        assert!(!store.addresses_verified().unwrap());
    }

    #[test]
    fn verified_addresses_replace_adopted_map() {
        let store = WalletStore::new(Arc::new(MemorySecureStore::new()));
        let mut adopted = BTreeMap::new();
        adopted.insert(ChainId::Ethereum, "0xdead".to_string());
        store.save_wallet_blob("AAAA", &adopted, false).unwrap();

        let mut derived = BTreeMap::new();
        derived.insert(ChainId::Ethereum, "0xbeef".to_string());
        derived.insert(ChainId::Solana, "So1".to_string());
        store.save_verified_addresses(&derived).unwrap();

        assert!(store.addresses_verified().unwrap());
        assert_eq!(store.load_addresses().unwrap(), derived);
        assert_eq!(store.vault_blob().unwrap().as_deref(), Some("AAAA"));
    }

    #[test]
    fn address_map_uses_chain_names_and_skips_unknown() {
        let parsed =
            parse_address_map(r#"{"ethereum":"0x1","bitcoin":"bc1q","ton":"EQx"}"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&ChainId::Ton], "EQx");

        let mut map = BTreeMap::new();
        map.insert(ChainId::Solana, "So1".to_string());
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"solana":"So1"}"#);
    }
}
