//! Platform-backed encrypted key-value store abstraction.
//!
//! Hosts with a native keystore implement [`SecureStore`] directly. The file
//! store persists the whole map in one atomic write so multi-key updates are
//! never observed half-applied.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use blake3::Hasher as Blake3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

const STORE_VERSION: u16 = 1;

/// Ordered set of writes applied atomically.
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    ops: Vec<(String, Option<String>)>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push((key.into(), Some(value.into())));
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push((key.into(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn apply_to(self, map: &mut BTreeMap<String, String>) {
        for (key, value) in self.ops {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

pub trait SecureStore: Send + Sync {
    fn get(&self, key: &str) -> WalletResult<Option<String>>;

    /// Apply every write in `batch` or none of them.
    fn apply(&self, batch: StoreBatch) -> WalletResult<()>;

    fn put(&self, key: &str, value: &str) -> WalletResult<()> {
        self.apply(StoreBatch::new().put(key, value))
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        self.apply(StoreBatch::new().remove(key))
    }
}

/// Process-local store for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemorySecureStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn apply(&self, batch: StoreBatch) -> WalletResult<()> {
        batch.apply_to(&mut self.entries.lock());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    version: u16,
    checksum: [u8; 32],
    entries: BTreeMap<String, String>,
}

/// JSON file store with an integrity checksum and atomic replace.
#[derive(Debug)]
pub struct FileSecureStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileSecureStore {
    pub fn open(path: impl AsRef<Path>) -> WalletResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            read_envelope(&path)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecureStore for FileSecureStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn apply(&self, batch: StoreBatch) -> WalletResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        batch.apply_to(&mut next);
        write_envelope(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

fn read_envelope(path: &Path) -> WalletResult<BTreeMap<String, String>> {
    let bytes = fs::read(path)?;
    let envelope: StoreEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version != STORE_VERSION {
        return Err(WalletError::StorageError(format!(
            "Unsupported secure store version {}",
            envelope.version
        )));
    }
    if checksum(&envelope.entries)? != envelope.checksum {
        return Err(WalletError::StorageError(
            "Secure store integrity verification failed".to_string(),
        ));
    }
    Ok(envelope.entries)
}

fn write_envelope(path: &Path, entries: &BTreeMap<String, String>) -> WalletResult<()> {
    let envelope = StoreEnvelope {
        version: STORE_VERSION,
        checksum: checksum(entries)?,
        entries: entries.clone(),
    };
    let serialized = serde_json::to_vec(&envelope)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("new");
    {
        let mut file = create_private_file(&tmp_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> WalletResult<File> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> WalletResult<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

fn checksum(entries: &BTreeMap<String, String>) -> WalletResult<[u8; 32]> {
    let encoded = serde_json::to_vec(entries)?;
    let mut hasher = Blake3::new();
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}
