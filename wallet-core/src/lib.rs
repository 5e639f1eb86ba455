//! Key management and security core of the Xipher multi-chain wallet.

pub mod api;
pub mod app_state;
pub mod blockchain_client;
pub mod chains;
pub mod clock;
pub mod config_store;
pub mod crypto;
pub mod errors;
pub mod guard;
pub mod rate_limit;
pub mod secure_memory;
pub mod security;
pub mod services;
pub mod session;
pub mod storage;
pub mod sync_client;
pub mod transaction;
pub mod validation;
pub mod wallet;

// Re-export common types
pub use api::types::*;
pub use api::WalletApi;
pub use app_state::{SharedWalletContext, WalletContext};
pub use blockchain_client::BlockchainClient;
pub use chains::{Amount, ChainAddress, ChainId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{ConfigStore, NetworkConfig, WalletConfig};
pub use errors::{ErrorKind, WalletError, WalletResult};
pub use guard::SecurityGuard;
pub use security::{Environment, GuardPolicy, SecurityConfig};
pub use services::{
    BalanceOracle, ChainBalance, EvmTxParams, RemoteVaultStore, RemoteWallet, TransactionRelay,
};
pub use session::SessionManager;
pub use storage::{EncryptedVault, FileSecureStore, MemorySecureStore, SecureStore, WalletStore};
pub use sync_client::SyncClient;
pub use transaction::{Transaction, TransactionPayload};
pub use validation::{InputValidator, ValidationResult};
pub use wallet::{WalletCore, WalletServices};
