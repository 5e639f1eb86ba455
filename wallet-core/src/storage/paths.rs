use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{WalletError, WalletResult};

/// Manages filesystem paths used by the wallet core.
#[derive(Debug, Clone)]
pub struct WalletPaths {
    /// Root directory for wallet data.
    root_dir: PathBuf,
    /// Encrypted key-value store (vault blob, addresses, guard state).
    secure_store_file: PathBuf,
    /// Path to persisted wallet configuration.
    config_file: PathBuf,
}

impl WalletPaths {
    pub const SECURE_STORE_FILENAME: &'static str = "wallet.store";
    pub const CONFIG_FILENAME: &'static str = "wallet.config";

    /// Create a new path manager rooted at the provided directory.
    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Wallet root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            secure_store_file: root_dir.join(Self::SECURE_STORE_FILENAME),
            config_file: root_dir.join(Self::CONFIG_FILENAME),
            root_dir,
        })
    }

    pub fn ensure_directories(&self) -> WalletResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        Ok(())
    }

    pub fn secure_store_file(&self) -> &Path {
        &self.secure_store_file
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wallet_paths_creation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = WalletPaths::new(temp_dir.path()).unwrap();

        assert_eq!(
            paths.secure_store_file(),
            temp_dir.path().join(WalletPaths::SECURE_STORE_FILENAME)
        );
        assert_eq!(paths.config_file(), temp_dir.path().join("wallet.config"));
    }

    #[test]
    fn test_empty_root_directory_rejected() {
        match WalletPaths::new("") {
            Err(WalletError::StorageError(msg)) => assert!(msg.contains("cannot be empty")),
            other => panic!("Expected StorageError for empty root, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = WalletPaths::new(temp_dir.path().join("nested").join("wallet")).unwrap();

        paths.ensure_directories().unwrap();
        assert!(paths.root_dir().exists());
    }
}
