use std::path::PathBuf;
use std::sync::Arc;

use crate::blockchain_client::BlockchainClient;
use crate::clock::{Clock, SystemClock};
use crate::config_store::{ConfigStore, WalletConfig};
use crate::errors::WalletResult;
use crate::security::{GuardPolicy, SecurityConfig};
use crate::storage::{FileSecureStore, WalletPaths, WalletStore};
use crate::sync_client::SyncClient;
use crate::wallet::{WalletCore, WalletServices};

/// Everything the bridge needs, built once per data directory.
pub struct WalletContext {
    paths: WalletPaths,
    config_store: ConfigStore,
    security: SecurityConfig,
    core: Arc<WalletCore>,
}

impl WalletContext {
    /// Wire the production stack: file-backed secure store, persisted network
    /// configuration and the HTTP chain and sync clients.
    pub fn initialize(root_dir: PathBuf) -> WalletResult<Self> {
        let security = SecurityConfig::from_env()?;
        let paths = WalletPaths::new(&root_dir)?;
        paths.ensure_directories()?;

        let config_store = ConfigStore::from_paths(&paths);
        let config = config_store.load_or_default(security.environment().as_str())?;
        let chain_client = Arc::new(BlockchainClient::new(config.network.clone())?);
        let services = WalletServices {
            oracle: chain_client.clone(),
            relay: chain_client,
            remote: Some(Arc::new(SyncClient::new(&config.network)?)),
        };

        Self::assemble(paths, config_store, security, Arc::new(SystemClock), services)
    }

    /// Same layout as [`WalletContext::initialize`] with caller-supplied
    /// services and clock.
    pub fn with_services(
        root_dir: PathBuf,
        security: SecurityConfig,
        clock: Arc<dyn Clock>,
        services: WalletServices,
    ) -> WalletResult<Self> {
        let paths = WalletPaths::new(&root_dir)?;
        paths.ensure_directories()?;
        let config_store = ConfigStore::from_paths(&paths);
        config_store.load_or_default(security.environment().as_str())?;
        Self::assemble(paths, config_store, security, clock, services)
    }

    fn assemble(
        paths: WalletPaths,
        config_store: ConfigStore,
        security: SecurityConfig,
        clock: Arc<dyn Clock>,
        services: WalletServices,
    ) -> WalletResult<Self> {
        let policy = GuardPolicy::from_config(&security)?;
        let secure_store = FileSecureStore::open(paths.secure_store_file())?;
        let store = WalletStore::new(Arc::new(secure_store));
        let core = Arc::new(WalletCore::new(store, policy, clock, services)?);
        log::info!(
            "Wallet context ready in {} mode",
            security.environment().as_str()
        );

        Ok(Self {
            paths,
            config_store,
            security,
            core,
        })
    }

    pub fn core(&self) -> Arc<WalletCore> {
        Arc::clone(&self.core)
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    pub fn environment(&self) -> &str {
        self.security.environment().as_str()
    }

    /// Network configuration as persisted. Changes apply on the next start.
    pub fn load_config(&self) -> WalletResult<WalletConfig> {
        self.config_store.load_or_default(self.environment())
    }

    pub fn update_config<F>(&self, updater: F) -> WalletResult<WalletConfig>
    where
        F: FnOnce(&mut WalletConfig) -> WalletResult<()>,
    {
        self.config_store.update(self.environment(), updater)
    }

    pub fn paths(&self) -> &WalletPaths {
        &self.paths
    }
}

/// Shared wallet context handed to the bridge.
#[derive(Clone)]
pub struct SharedWalletContext(pub Arc<WalletContext>);

impl SharedWalletContext {
    pub fn new(inner: WalletContext) -> Self {
        Self(Arc::new(inner))
    }

    pub fn core(&self) -> Arc<WalletCore> {
        self.0.core()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Environment;
    use tempfile::TempDir;

    #[test]
    fn initialize_creates_layout_and_config() {
        let temp = TempDir::new().unwrap();
        let context = WalletContext::initialize(temp.path().to_path_buf()).unwrap();

        assert!(context.paths().config_file().exists());
        let config = context.load_config().unwrap();
        assert_eq!(config.network.server_url(), "https://xipher.io");

        let updated = context
            .update_config(|config| {
                config.network.http_timeout_secs = 5;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.network.http_timeout_secs, 5);
        assert_eq!(context.load_config().unwrap().network.http_timeout_secs, 5);
    }

    #[test]
    fn environment_comes_from_security_config() {
        let temp = TempDir::new().unwrap();
        let context = WalletContext::initialize(temp.path().to_path_buf()).unwrap();
        let expected = SecurityConfig::from_env().unwrap();
        assert_eq!(context.environment(), expected.environment().as_str());
        assert_ne!(Environment::Test.as_str(), Environment::Production.as_str());
    }
}
