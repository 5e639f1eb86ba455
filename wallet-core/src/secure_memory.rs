//! Short-lived in-process secrets.
//!
//! Values are XOR-masked with a random per-entry pad and held in zeroizing
//! buffers. The mask only keeps plaintext out of casual memory dumps; it is
//! not encryption. Never used for the long-term vault.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};

const PAD_LEN: usize = 32;

struct MaskedEntry {
    pad: Zeroizing<[u8; PAD_LEN]>,
    masked: Zeroizing<Vec<u8>>,
    expires_at: DateTime<Utc>,
}

impl MaskedEntry {
    fn seal(value: &[u8], expires_at: DateTime<Utc>) -> WalletResult<Self> {
        let mut pad = Zeroizing::new([0u8; PAD_LEN]);
        OsRng
            .try_fill_bytes(pad.as_mut())
            .map_err(|e| WalletError::EntropySource(e.to_string()))?;
        let masked = Zeroizing::new(xor_with_pad(value, &pad));
        Ok(Self {
            pad,
            masked,
            expires_at,
        })
    }

    fn open(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(xor_with_pad(&self.masked, &self.pad))
    }
}

pub struct SecureMemory {
    entries: Mutex<HashMap<String, MaskedEntry>>,
    clock: Arc<dyn Clock>,
}

impl SecureMemory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn store(&self, key: &str, value: &[u8], ttl: Duration) -> WalletResult<()> {
        let entry = MaskedEntry::seal(value, self.clock.now() + ttl)?;
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    /// Copy of the value if present and unexpired. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<Zeroizing<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.open()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Read-once access: the entry is removed whether or not it had expired.
    pub fn take(&self, key: &str) -> Option<Zeroizing<Vec<u8>>> {
        let now = self.clock.now();
        let entry = self.entries.lock().remove(key)?;
        if entry.expires_at > now {
            Some(entry.open())
        } else {
            None
        }
    }

    pub fn clear_key(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear_all(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            log::debug!("Clearing {} ephemeral secrets", entries.len());
        }
        entries.clear();
    }

    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn xor_with_pad(data: &[u8], pad: &[u8; PAD_LEN]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ pad[i % PAD_LEN])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn memory() -> (SecureMemory, ManualClock) {
        let clock = ManualClock::default();
        (SecureMemory::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn values_are_masked_at_rest() {
        let (memory, _) = memory();
        let secret = b"abandon abandon abandon abandon abandon about";
        memory.store("pending", secret, Duration::seconds(60)).unwrap();

        let entries = memory.entries.lock();
        let entry = entries.get("pending").unwrap();
        assert_ne!(entry.masked.as_slice(), secret.as_slice());
        drop(entries);

        assert_eq!(memory.get("pending").unwrap().as_slice(), secret.as_slice());
    }

    #[test]
    fn entries_expire() {
        let (memory, clock) = memory();
        memory.store("a", b"1", Duration::seconds(60)).unwrap();
        memory.store("b", b"2", Duration::seconds(120)).unwrap();

        clock.advance(Duration::seconds(60));
        assert!(memory.get("a").is_none());
        assert_eq!(memory.purge_expired(), 0);
        assert_eq!(memory.len(), 1);

        clock.advance(Duration::seconds(60));
        assert_eq!(memory.purge_expired(), 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn take_is_read_once() {
        let (memory, _) = memory();
        memory.store("pending", b"words", Duration::seconds(60)).unwrap();
        assert_eq!(memory.take("pending").unwrap().as_slice(), b"words");
        assert!(memory.take("pending").is_none());
    }

    #[test]
    fn clear_operations_remove_entries() {
        let (memory, _) = memory();
        memory.store("a", b"1", Duration::seconds(60)).unwrap();
        memory.store("b", b"2", Duration::seconds(60)).unwrap();
        memory.clear_key("a");
        assert!(memory.get("a").is_none());
        memory.clear_all();
        assert!(memory.is_empty());
    }
}
