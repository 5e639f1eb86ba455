pub mod paths;
pub mod secure_store;
pub mod vault;
pub mod wallet_store;

pub use paths::WalletPaths;
pub use secure_store::{FileSecureStore, MemorySecureStore, SecureStore, StoreBatch};
pub use vault::{decrypt_vault, encrypt_vault, EncryptedVault, VaultCodec};
pub use wallet_store::WalletStore;
