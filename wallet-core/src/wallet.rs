//! Wallet lifecycle: create, import, send, balances and remote backup.
//!
//! Every mutating operation runs the same sequence: session gate, rate-limit
//! admission, input validation, cryptographic work, then the state update.
//! Decrypted phrases and seeds only exist inside the blocking tasks that use
//! them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock as SyncRwLock;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::chains::{Amount, ChainId};
use crate::clock::Clock;
use crate::crypto::mnemonic::DEFAULT_ENTROPY_BITS;
use crate::crypto::{self, ChainKeyPair, Mnemonic};
use crate::errors::{WalletError, WalletResult};
use crate::guard::SecurityGuard;
use crate::security::GuardPolicy;
use crate::services::{
    BalanceOracle, ChainBalance, EvmTxParams, RemoteVaultStore, RemoteWallet, TransactionRelay,
};
use crate::storage::{EncryptedVault, VaultCodec, WalletStore};
use crate::transaction::{Transaction, TransactionPayload};

const OP_CREATE: &str = "create_wallet";
const OP_IMPORT: &str = "import_wallet";
const OP_UNLOCK: &str = "unlock";
const OP_SYNC: &str = "sync";
const OP_SEND: &str = "send";
const OP_CHANGE_PASSWORD: &str = "change_password";

const PENDING_MNEMONIC: &str = "pending_mnemonic";

/// Outbound collaborators of the wallet core.
#[derive(Clone)]
pub struct WalletServices {
    pub oracle: Arc<dyn BalanceOracle>,
    pub relay: Arc<dyn TransactionRelay>,
    pub remote: Option<Arc<dyn RemoteVaultStore>>,
}

#[derive(Debug, Default)]
struct WalletState {
    has_wallet: bool,
    addresses: BTreeMap<ChainId, String>,
    /// False while `addresses` is an unchecked map from a remote backup.
    addresses_verified: bool,
    session_token: Option<String>,
}

/// Output of the blocking create/import step.
struct Provisioned {
    vault: EncryptedVault,
    addresses: BTreeMap<ChainId, String>,
}

pub struct WalletCore {
    state: RwLock<WalletState>,
    balances: SyncRwLock<BTreeMap<ChainId, ChainBalance>>,
    store: WalletStore,
    guard: SecurityGuard,
    codec: VaultCodec,
    services: WalletServices,
    clock: Arc<dyn Clock>,
}

impl WalletCore {
    pub fn new(
        store: WalletStore,
        policy: GuardPolicy,
        clock: Arc<dyn Clock>,
        services: WalletServices,
    ) -> WalletResult<Self> {
        let guard = SecurityGuard::new(policy, Arc::clone(&clock), Some(store.clone()))?;
        let has_wallet = store.has_wallet()?;
        let (addresses, addresses_verified) = if has_wallet {
            (store.load_addresses()?, store.addresses_verified()?)
        } else {
            (BTreeMap::new(), true)
        };
        log::info!(
            "Wallet core initialized (wallet present: {}, {} addresses, verified: {})",
            has_wallet,
            addresses.len(),
            addresses_verified
        );

        Ok(Self {
            state: RwLock::new(WalletState {
                has_wallet,
                addresses,
                addresses_verified,
                session_token: None,
            }),
            balances: SyncRwLock::new(BTreeMap::new()),
            store,
            guard,
            codec: VaultCodec::default(),
            services,
            clock,
        })
    }

    pub fn guard(&self) -> &SecurityGuard {
        &self.guard
    }

    pub async fn has_wallet(&self) -> bool {
        self.state.read().await.has_wallet
    }

    pub async fn addresses(&self) -> BTreeMap<ChainId, String> {
        self.state.read().await.addresses.clone()
    }

    pub async fn address(&self, chain: ChainId) -> Option<String> {
        self.state.read().await.addresses.get(&chain).cloned()
    }

    /// False after a remote restore until the vault has been opened once and
    /// the addresses re-derived from its phrase.
    pub async fn addresses_verified(&self) -> bool {
        self.state.read().await.addresses_verified
    }

    /// Token used to authenticate against the sync and relay service.
    pub async fn set_session_token(&self, token: Option<String>) {
        self.state.write().await.session_token = token.filter(|t| !t.is_empty());
    }

    /// Generate a new wallet and return its recovery phrase.
    ///
    /// The phrase is also staged for a short time so the backup screen can
    /// fetch it once through [`WalletCore::take_pending_mnemonic`].
    pub async fn create_wallet(&self, password: &SecretString) -> WalletResult<Mnemonic> {
        self.guard.require_session()?;
        self.guard.admit(OP_CREATE)?;
        self.guard
            .validator()
            .check_password(password.expose_secret())?;

        let mut state = self.state.write().await;
        let codec = self.codec;
        let owned_password = clone_secret(password);
        let (mnemonic, provisioned) = run_blocking(move || {
            let mnemonic = crypto::generate(crypto::english_wordlist(), DEFAULT_ENTROPY_BITS)?;
            let provisioned = provision(&codec, &mnemonic, &owned_password)?;
            Ok((mnemonic, provisioned))
        })
        .await?;

        self.store
            .save_wallet(&provisioned.vault, &provisioned.addresses)?;
        state.has_wallet = true;
        state.addresses = provisioned.addresses.clone();
        state.addresses_verified = true;
        let token = state.session_token.clone();
        self.balances.write().clear();
        drop(state);
        log::info!("Wallet created");

        self.guard.memory().store(
            PENDING_MNEMONIC,
            mnemonic.as_str().as_bytes(),
            self.guard.policy().pending_mnemonic_ttl,
        )?;
        self.push_backup(token.as_deref(), &provisioned).await;
        Ok(mnemonic)
    }

    /// Restore a wallet from its recovery phrase, replacing any local wallet.
    pub async fn import_wallet(
        &self,
        phrase: &SecretString,
        password: &SecretString,
    ) -> WalletResult<()> {
        self.guard.require_session()?;
        self.guard.admit(OP_IMPORT)?;
        self.guard.check_lockout(OP_IMPORT)?;

        let validator = self.guard.validator();
        let mnemonic = match validator
            .check_mnemonic_shape(phrase.expose_secret())
            .and_then(|_| Mnemonic::parse(phrase.expose_secret()))
        {
            Ok(mnemonic) => mnemonic,
            Err(err) => {
                self.guard.record_failure(OP_IMPORT);
                return Err(err);
            }
        };
        validator.check_password(password.expose_secret())?;

        let mut state = self.state.write().await;
        let codec = self.codec;
        let owned_password = clone_secret(password);
        let provisioned =
            run_blocking(move || provision(&codec, &mnemonic, &owned_password)).await?;

        self.store
            .save_wallet(&provisioned.vault, &provisioned.addresses)?;
        state.has_wallet = true;
        state.addresses = provisioned.addresses.clone();
        state.addresses_verified = true;
        let token = state.session_token.clone();
        self.balances.write().clear();
        drop(state);
        self.guard.record_success(OP_IMPORT);
        log::info!("Wallet imported");

        self.push_backup(token.as_deref(), &provisioned).await;
        Ok(())
    }

    /// Read-once access to the phrase staged by [`WalletCore::create_wallet`].
    pub fn take_pending_mnemonic(&self) -> Option<Mnemonic> {
        let bytes = self.guard.memory().take(PENDING_MNEMONIC)?;
        std::str::from_utf8(&bytes)
            .ok()
            .map(Mnemonic::from_vault_plaintext)
    }

    /// Build, sign and relay a transfer. Returns the transaction hash.
    ///
    /// [`WalletError::Timeout`] means the signed transaction may or may not
    /// have been broadcast. It is never retried here.
    pub async fn send_transaction(
        &self,
        to: &str,
        amount: &str,
        chain: ChainId,
        password: &SecretString,
    ) -> WalletResult<String> {
        self.guard.require_session()?;
        self.guard.admit(&format!("send_{}", chain))?;

        let validator = self.guard.validator();
        validator.check_address(to, chain)?;
        let amount: Amount = validator.parse_amount(amount, chain)?;
        self.guard.check_lockout(OP_SEND)?;

        {
            let mut state = self.state.write().await;
            if !state.has_wallet {
                return Err(WalletError::NotFound("wallet".to_string()));
            }
            if !state.addresses_verified {
                self.verify_addresses(&mut state, password, OP_SEND).await?;
            }
        }

        let state = self.state.read().await;
        if !state.has_wallet {
            return Err(WalletError::NotFound("wallet".to_string()));
        }
        let from = state
            .addresses
            .get(&chain)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("{} address", chain)))?;
        let token = state.session_token.clone();

        let evm = if chain.is_evm() {
            Some(self.services.relay.evm_params(chain, &from).await?)
        } else {
            None
        };
        let payload = TransactionPayload::new(chain, from, to, amount, self.clock.now());
        let transaction = self.sign_with_vault(password, payload, evm, OP_SEND).await?;
        drop(state);

        let relay = Arc::clone(&self.services.relay);
        let timeout = self.guard.policy().relay_timeout;
        match tokio::time::timeout(timeout, relay.relay(&transaction, token.as_deref())).await {
            Ok(Ok(tx_hash)) => {
                log::info!("Transaction on {} relayed", chain);
                Ok(tx_hash)
            }
            Ok(Err(WalletError::Timeout)) | Err(_) => {
                log::warn!("Relay on {} timed out; transaction status unknown", chain);
                Err(WalletError::Timeout)
            }
            Ok(Err(err)) => {
                log::error!("Relay on {} failed: {}", chain, err);
                Err(err)
            }
        }
    }

    /// Query every chain concurrently. A failing chain degrades to an
    /// unavailable zero entry without affecting the others.
    ///
    /// The state read guard is held until the cache is written, so a wallet
    /// swapped in meanwhile never gets the old wallet's balances.
    pub async fn fetch_all_balances(&self) -> BTreeMap<ChainId, ChainBalance> {
        let state = self.state.read().await;
        if !state.has_wallet {
            return BTreeMap::new();
        }

        let mut tasks = JoinSet::new();
        for (chain, address) in state.addresses.clone() {
            let oracle = Arc::clone(&self.services.oracle);
            tasks.spawn(async move { (chain, oracle.balance(chain, &address).await) });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chain, Ok(balance))) => {
                    results.insert(chain, balance);
                }
                Ok((chain, Err(err))) => {
                    log::warn!("Balance query for {} failed: {}", chain, err);
                    results.insert(chain, ChainBalance::unavailable(chain));
                }
                Err(err) => log::error!("Balance task aborted: {}", err),
            }
        }
        for chain in state.addresses.keys() {
            results
                .entry(*chain)
                .or_insert_with(|| ChainBalance::unavailable(*chain));
        }

        *self.balances.write() = results.clone();
        drop(state);
        results
    }

    /// Balances from the last [`WalletCore::fetch_all_balances`].
    pub fn balances(&self) -> BTreeMap<ChainId, ChainBalance> {
        self.balances.read().clone()
    }

    pub async fn lock(&self) {
        let _state = self.state.write().await;
        self.guard.lock_wallet();
    }

    /// Start a new session. When a wallet exists the password must open it.
    pub async fn unlock(&self, password: &SecretString) -> WalletResult<()> {
        self.guard.admit(OP_UNLOCK)?;
        self.guard.check_lockout(OP_UNLOCK)?;

        let mut state = self.state.write().await;
        if let Some(vault) = self.load_vault_for(OP_UNLOCK)? {
            let codec = self.codec;
            let owned_password = clone_secret(password);
            let rederive = !state.addresses_verified;
            let opened = run_blocking(move || {
                let mnemonic = codec.decrypt(&vault, &owned_password)?;
                if rederive {
                    derive_address_map(&mnemonic).map(Some)
                } else {
                    Ok(None)
                }
            })
            .await;
            self.settle_attempt(OP_UNLOCK, &opened);
            if let Some(derived) = opened? {
                self.accept_derived_addresses(&mut state, derived)?;
            }
        }
        self.guard.unlock_session()
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_locked()
    }

    pub fn csrf_token(&self) -> WalletResult<String> {
        self.guard.csrf_token()
    }

    pub fn validate_csrf_token(&self, token: &str) -> bool {
        self.guard.validate_csrf_token(token)
    }

    /// Re-encrypt the vault under a new password.
    pub async fn change_password(
        &self,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> WalletResult<()> {
        self.guard.require_session()?;
        self.guard.admit(OP_CHANGE_PASSWORD)?;
        self.guard
            .validator()
            .check_password(new_password.expose_secret())?;
        self.guard.check_lockout(OP_UNLOCK)?;

        let state = self.state.write().await;
        let vault = self
            .load_vault_for(OP_UNLOCK)?
            .ok_or_else(|| WalletError::NotFound("wallet".to_string()))?;
        let codec = self.codec;
        let old = clone_secret(old_password);
        let new = clone_secret(new_password);
        let reencrypted =
            run_blocking(move || codec.change_password(&vault, &old, &new)).await;
        self.settle_attempt(OP_UNLOCK, &reencrypted);
        let vault = reencrypted?;

        self.store.replace_vault(&vault)?;
        let token = state.session_token.clone();
        let addresses = state.addresses.clone();
        drop(state);
        log::info!("Wallet password changed");

        self.push_backup(token.as_deref(), &Provisioned { vault, addresses })
            .await;
        Ok(())
    }

    /// Adopt the remote backup when there is no local wallet.
    ///
    /// Returns true when a wallet was restored.
    /// A wallet created or imported while the fetch is in flight wins.
    pub async fn sync_from_server_if_needed(&self, remote_token: &str) -> WalletResult<bool> {
        if self.has_wallet().await {
            return Ok(false);
        }
        self.pull_remote(remote_token, true).await
    }

    /// Replace the local wallet with the remote backup, if one exists.
    pub async fn load_wallet_from_server(&self, token: &str) -> WalletResult<bool> {
        self.pull_remote(token, false).await
    }

    /// Upload the encrypted vault and address map.
    pub async fn save_wallet_to_server(&self, token: &str) -> WalletResult<()> {
        self.guard.require_session()?;
        self.guard.admit(OP_SYNC)?;
        let remote = self.remote()?;

        let blob = self
            .store
            .vault_blob()?
            .ok_or_else(|| WalletError::NotFound("wallet".to_string()))?;
        let addresses = self.addresses().await;
        remote.save(token, &blob, &addresses).await
    }

    async fn pull_remote(&self, token: &str, only_if_empty: bool) -> WalletResult<bool> {
        self.guard.require_session()?;
        self.guard.admit(OP_SYNC)?;
        let remote = self.remote()?;

        let Some(record) = remote.fetch(token).await? else {
            log::info!("No remote wallet backup");
            return Ok(false);
        };
        self.adopt(record, only_if_empty).await
    }

    /// Install a remote backup. Its address map stays unverified until the
    /// vault is opened with the password.
    async fn adopt(&self, record: RemoteWallet, only_if_empty: bool) -> WalletResult<bool> {
        // Reject a blob that could never decrypt before it replaces anything.
        EncryptedVault::from_base64(&record.encrypted_seed)?;

        let mut state = self.state.write().await;
        if only_if_empty && state.has_wallet {
            log::info!("Local wallet appeared during sync; remote backup ignored");
            return Ok(false);
        }
        self.store
            .save_wallet_blob(&record.encrypted_seed, &record.addresses, false)?;
        state.has_wallet = true;
        state.addresses = record.addresses;
        state.addresses_verified = false;
        self.balances.write().clear();
        drop(state);
        log::info!("Wallet restored from server backup");
        Ok(true)
    }

    /// Open the vault and replace an unverified address map with the one
    /// derived from its phrase. Caller holds the state write guard.
    async fn verify_addresses(
        &self,
        state: &mut WalletState,
        password: &SecretString,
        key: &str,
    ) -> WalletResult<()> {
        let vault = self
            .load_vault_for(key)?
            .ok_or_else(|| WalletError::NotFound("wallet".to_string()))?;
        let codec = self.codec;
        let owned_password = clone_secret(password);
        let derived = run_blocking(move || {
            let mnemonic = codec.decrypt(&vault, &owned_password)?;
            derive_address_map(&mnemonic)
        })
        .await;
        self.settle_attempt(key, &derived);
        self.accept_derived_addresses(state, derived?)
    }

    fn accept_derived_addresses(
        &self,
        state: &mut WalletState,
        derived: BTreeMap<ChainId, String>,
    ) -> WalletResult<()> {
        if derived != state.addresses {
            log::warn!("Backup address map does not match the vault; using derived addresses");
            self.balances.write().clear();
        }
        self.store.save_verified_addresses(&derived)?;
        state.addresses = derived;
        state.addresses_verified = true;
        log::info!("Wallet addresses verified against the vault");
        Ok(())
    }

    async fn push_backup(&self, token: Option<&str>, provisioned: &Provisioned) {
        let (Some(token), Some(remote)) = (token, self.services.remote.as_ref()) else {
            return;
        };
        let blob = provisioned.vault.to_base64();
        if let Err(err) = remote.save(token, &blob, &provisioned.addresses).await {
            log::warn!("Remote wallet backup failed: {}", err);
        }
    }

    fn remote(&self) -> WalletResult<Arc<dyn RemoteVaultStore>> {
        self.services
            .remote
            .clone()
            .ok_or_else(|| WalletError::NotFound("remote wallet service".to_string()))
    }

    /// Stored vault, with an unreadable blob counted as a failed attempt on `key`.
    fn load_vault_for(&self, key: &str) -> WalletResult<Option<EncryptedVault>> {
        match self.store.load_vault() {
            Err(WalletError::AuthenticationError) => {
                self.guard.record_failure(key);
                Err(WalletError::AuthenticationError)
            }
            other => other,
        }
    }

    async fn sign_with_vault(
        &self,
        password: &SecretString,
        payload: TransactionPayload,
        evm: Option<EvmTxParams>,
        key: &str,
    ) -> WalletResult<Transaction> {
        let vault = self
            .load_vault_for(key)?
            .ok_or_else(|| WalletError::NotFound("wallet".to_string()))?;
        let codec = self.codec;
        let owned_password = clone_secret(password);
        let signed = run_blocking(move || {
            let mnemonic = codec.decrypt(&vault, &owned_password)?;
            let seed = crypto::derive_seed(&mnemonic, "");
            let signing_key = ChainKeyPair::derive(&seed, payload.chain)?;
            match evm {
                Some(params) => Transaction::sign_evm(&payload, &signing_key, &params),
                None => Transaction::sign(&payload, &signing_key),
            }
        })
        .await;
        self.settle_attempt(key, &signed);
        signed
    }

    /// Feed the outcome of a password check into the failure tracker.
    fn settle_attempt<T>(&self, key: &str, outcome: &WalletResult<T>) {
        match outcome {
            Ok(_) => self.guard.record_success(key),
            Err(WalletError::AuthenticationError) => {
                log::warn!("Password rejected for {}", key);
                self.guard.record_failure(key);
            }
            Err(_) => {}
        }
    }
}

fn provision(
    codec: &VaultCodec,
    mnemonic: &Mnemonic,
    password: &SecretString,
) -> WalletResult<Provisioned> {
    let addresses = derive_address_map(mnemonic)?;
    let vault = codec.encrypt(mnemonic, password)?;
    Ok(Provisioned { vault, addresses })
}

fn derive_address_map(mnemonic: &Mnemonic) -> WalletResult<BTreeMap<ChainId, String>> {
    let seed = crypto::derive_seed(mnemonic, "");
    Ok(crypto::derive_addresses(&seed)?
        .into_iter()
        .map(|(chain, address)| (chain, address.address))
        .collect())
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

async fn run_blocking<F, T>(work: F) -> WalletResult<T>
where
    F: FnOnce() -> WalletResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WalletError::CryptoError(format!("Background task failed: {}", e)))?
}
