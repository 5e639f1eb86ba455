//! Bridge-facing facade.
//!
//! Every call returns an [`ApiResponse`] and never an `Err`; error text that
//! reaches the caller has already been sanitized and escaped.

pub mod types;

use std::sync::Arc;

use secrecy::SecretString;

use crate::chains::ChainId;
use crate::errors::{WalletError, WalletResult};
use crate::validation::ValidationResult;
use crate::wallet::WalletCore;

pub use types::{
    AddressesResponse, ApiResponse, BalanceEntry, BalancesResponse, CreateWalletResponse,
    CsrfTokenResponse, ImportWalletResponse, LockStatusResponse, SendTransactionResponse,
    ValidationResponse, WalletStatusResponse,
};

#[derive(Clone)]
pub struct WalletApi {
    core: Arc<WalletCore>,
}

impl WalletApi {
    pub fn new(core: Arc<WalletCore>) -> Self {
        Self { core }
    }

    pub async fn has_wallet(&self) -> ApiResponse<WalletStatusResponse> {
        ApiResponse::ok(WalletStatusResponse {
            has_wallet: self.core.has_wallet().await,
        })
    }

    pub async fn get_addresses(&self) -> ApiResponse<AddressesResponse> {
        let result = async {
            self.require_wallet().await?;
            Ok::<_, WalletError>(AddressesResponse {
                addresses: self.core.addresses().await,
                verified: self.core.addresses_verified().await,
            })
        }
        .await;
        ApiResponse::from_result(result)
    }

    pub async fn create_wallet(&self, password: String) -> ApiResponse<CreateWalletResponse> {
        let password = SecretString::from(password);
        let result = async {
            let mnemonic = self.core.create_wallet(&password).await?;
            Ok::<_, WalletError>(CreateWalletResponse {
                mnemonic: mnemonic.as_str().to_string(),
                word_count: mnemonic.word_count(),
                addresses: self.core.addresses().await,
            })
        }
        .await;
        ApiResponse::from_result(result)
    }

    pub async fn import_wallet(
        &self,
        mnemonic: String,
        password: String,
    ) -> ApiResponse<ImportWalletResponse> {
        let mnemonic = SecretString::from(mnemonic);
        let password = SecretString::from(password);
        let result = async {
            self.core.import_wallet(&mnemonic, &password).await?;
            Ok::<_, WalletError>(ImportWalletResponse {
                addresses: self.core.addresses().await,
            })
        }
        .await;
        ApiResponse::from_result(result)
    }

    /// Balances from the last refresh.
    pub async fn get_balances(&self) -> ApiResponse<BalancesResponse> {
        let result = async {
            self.require_wallet().await?;
            Ok::<_, WalletError>(BalancesResponse::from_balances(self.core.balances()))
        }
        .await;
        ApiResponse::from_result(result)
    }

    /// Fetch fresh balances in the background and hand them to `callback`.
    pub fn refresh_balances<F>(&self, callback: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(ApiResponse<BalancesResponse>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let balances = core.fetch_all_balances().await;
            callback(ApiResponse::ok(BalancesResponse::from_balances(balances)));
        })
    }

    pub async fn send_transaction(
        &self,
        to: String,
        amount: String,
        chain: String,
        password: String,
    ) -> ApiResponse<SendTransactionResponse> {
        let password = SecretString::from(password);
        let result = async {
            let chain: ChainId = chain.parse()?;
            let tx_hash = self
                .core
                .send_transaction(&to, &amount, chain, &password)
                .await?;
            Ok::<_, WalletError>(SendTransactionResponse { tx_hash, chain })
        }
        .await;
        ApiResponse::from_result(result)
    }

    pub fn validate_address(&self, address: &str, chain: &str) -> ApiResponse<ValidationResponse> {
        let validation = match chain.parse::<ChainId>() {
            Ok(chain) => self
                .core
                .guard()
                .validator()
                .validate_address(address, chain),
            Err(err) => ValidationResult::from(Err::<(), _>(err)),
        };
        ApiResponse::ok(validation.into())
    }

    pub fn validate_password(&self, password: &str) -> ApiResponse<ValidationResponse> {
        let validation = self.core.guard().validator().validate_password(password);
        ApiResponse::ok(validation.into())
    }

    pub fn is_locked(&self) -> ApiResponse<LockStatusResponse> {
        ApiResponse::ok(LockStatusResponse {
            locked: self.core.is_locked(),
        })
    }

    pub async fn lock(&self) -> ApiResponse<LockStatusResponse> {
        self.core.lock().await;
        self.is_locked()
    }

    pub async fn unlock(&self, password: String) -> ApiResponse<LockStatusResponse> {
        let password = SecretString::from(password);
        let result = self.core.unlock(&password).await.map(|_| LockStatusResponse {
            locked: self.core.is_locked(),
        });
        ApiResponse::from_result(result)
    }

    pub fn csrf_token(&self) -> ApiResponse<CsrfTokenResponse> {
        ApiResponse::from_result(
            self.core
                .csrf_token()
                .map(|csrf_token| CsrfTokenResponse { csrf_token }),
        )
    }

    async fn require_wallet(&self) -> WalletResult<()> {
        if self.core.has_wallet().await {
            Ok(())
        } else {
            Err(WalletError::NotFound("wallet".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::GuardPolicy;
    use crate::services::{BalanceOracle, ChainBalance, EvmTxParams, TransactionRelay};
    use crate::storage::{MemorySecureStore, WalletStore};
    use crate::transaction::Transaction;
    use crate::wallet::WalletServices;

    struct FixedOracle;

    #[async_trait::async_trait]
    impl BalanceOracle for FixedOracle {
        async fn balance(&self, chain: ChainId, _address: &str) -> WalletResult<ChainBalance> {
            if chain == ChainId::Ton {
                return Err(WalletError::NetworkError("down".into()));
            }
            Ok(ChainBalance {
                chain_id: chain,
                crypto: "1".into(),
                usd: 2.0,
                available: true,
            })
        }
    }

    struct EchoRelay;

    #[async_trait::async_trait]
    impl TransactionRelay for EchoRelay {
        async fn evm_params(&self, _chain: ChainId, _from: &str) -> WalletResult<EvmTxParams> {
            Ok(EvmTxParams {
                nonce: 0,
                gas_price: 1,
                gas_limit: 21_000,
            })
        }

        async fn relay(&self, tx: &Transaction, _token: Option<&str>) -> WalletResult<String> {
            Ok(format!("0x{}", &tx.signature[..8]))
        }
    }

    fn api() -> WalletApi {
        let services = WalletServices {
            oracle: Arc::new(FixedOracle),
            relay: Arc::new(EchoRelay),
            remote: None,
        };
        let core = WalletCore::new(
            WalletStore::new(Arc::new(MemorySecureStore::new())),
            GuardPolicy::default(),
            Arc::new(ManualClock::default()),
            services,
        )
        .unwrap();
        WalletApi::new(Arc::new(core))
    }

    #[tokio::test]
    async fn addresses_require_wallet() {
        let api = api();
        let response = api.get_addresses().await;
        assert!(!response.success);
        assert!(!api.has_wallet().await.data.unwrap().has_wallet);
    }

    #[tokio::test]
    async fn create_then_refresh_balances() {
        let api = api();
        let created = api.create_wallet("Str0ng!Pass".into()).await;
        assert!(created.success);
        let created = created.data.unwrap();
        assert_eq!(created.word_count, 12);
        assert_eq!(created.addresses.len(), 4);
        let listed = api.get_addresses().await.data.unwrap();
        assert_eq!(listed.addresses, created.addresses);
        assert!(listed.verified);

        let (tx, rx) = tokio::sync::oneshot::channel();
        api.refresh_balances(move |response| {
            let _ = tx.send(response);
        })
        .await
        .unwrap();
        let refreshed = rx.await.unwrap().data.unwrap();
        assert_eq!(refreshed.balances.len(), 4);
        assert_eq!(refreshed.total_usd, 6.0);
        assert!(refreshed
            .balances
            .iter()
            .any(|entry| entry.chain == ChainId::Ton && !entry.available));

        let cached = api.get_balances().await.data.unwrap();
        assert_eq!(cached, refreshed);
    }

    #[tokio::test]
    async fn unknown_chain_is_reported() {
        let api = api();
        let response = api
            .send_transaction("addr".into(), "1".into(), "bitcoin".into(), "x".into())
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unsupported network: bitcoin"));

        let validation = api.validate_address("addr", "bitcoin").data.unwrap();
        assert!(!validation.valid);
    }

    #[tokio::test]
    async fn lock_and_csrf() {
        let api = api();
        let token = api.csrf_token().data.unwrap().csrf_token;
        assert_eq!(token.len(), 64);

        assert!(api.lock().await.data.unwrap().locked);
        assert!(!api.csrf_token().success);

        let unlocked = api.unlock("whatever".into()).await;
        assert!(!unlocked.data.unwrap().locked);
    }

    #[test]
    fn password_validation_passes_through() {
        let api = api();
        assert!(api.validate_password("Str0ng!Pass").data.unwrap().valid);
        let weak = api.validate_password("password1").data.unwrap();
        assert!(!weak.valid);
        assert!(weak.error.is_some());
    }
}
