use std::fmt;
use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::Mnemonic;
use crate::errors::{WalletError, WalletResult};

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Password-encrypted recovery phrase.
///
/// Persisted as `base64(salt ‖ iv ‖ ciphertext ‖ tag)`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedVault {
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
    /// Ciphertext with the GCM tag appended.
    sealed: Vec<u8>,
}

impl EncryptedVault {
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.sealed[..self.sealed.len() - TAG_LEN]
    }

    pub fn auth_tag(&self) -> &[u8] {
        &self.sealed[self.sealed.len() - TAG_LEN..]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + self.sealed.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.sealed);
        out
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Malformed input is reported as an authentication failure so callers
    /// cannot tell corruption from a wrong password.
    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        if bytes.len() < SALT_LEN + IV_LEN + TAG_LEN {
            return Err(WalletError::AuthenticationError);
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[SALT_LEN..SALT_LEN + IV_LEN]);
        Ok(Self {
            salt,
            iv,
            sealed: bytes[SALT_LEN + IV_LEN..].to_vec(),
        })
    }

    pub fn from_base64(encoded: &str) -> WalletResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| WalletError::AuthenticationError)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for EncryptedVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedVault")
            .field("salt", &hex::encode(self.salt))
            .field("iv", &hex::encode(self.iv))
            .field("ciphertext_len", &self.ciphertext().len())
            .finish()
    }
}

/// PBKDF2-HMAC-SHA256 key derivation plus AES-256-GCM.
#[derive(Debug, Clone, Copy)]
pub struct VaultCodec {
    iterations: NonZeroU32,
}

impl Default for VaultCodec {
    fn default() -> Self {
        Self {
            iterations: NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl VaultCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encrypt(
        &self,
        mnemonic: &Mnemonic,
        password: &SecretString,
    ) -> WalletResult<EncryptedVault> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .and_then(|_| OsRng.try_fill_bytes(&mut iv))
            .map_err(|e| WalletError::EntropySource(e.to_string()))?;

        let key = self.derive_key(password, &salt);
        let sealed = encrypt_aes_gcm(&key, iv, mnemonic.as_str().as_bytes())?;
        Ok(EncryptedVault { salt, iv, sealed })
    }

    pub fn decrypt(
        &self,
        vault: &EncryptedVault,
        password: &SecretString,
    ) -> WalletResult<Mnemonic> {
        let key = self.derive_key(password, &vault.salt);
        let plaintext = decrypt_aes_gcm(&key, vault.iv, &vault.sealed)?;
        let phrase = std::str::from_utf8(&plaintext).map_err(|_| WalletError::AuthenticationError)?;
        Ok(Mnemonic::from_vault_plaintext(phrase))
    }

    /// Re-encrypt under `new_password` with a fresh salt and IV.
    pub fn change_password(
        &self,
        vault: &EncryptedVault,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> WalletResult<EncryptedVault> {
        let mnemonic = self.decrypt(vault, old_password)?;
        self.encrypt(&mnemonic, new_password)
    }

    fn derive_key(&self, password: &SecretString, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            password.expose_secret().as_bytes(),
            key.as_mut(),
        );
        key
    }
}

pub fn encrypt_vault(mnemonic: &Mnemonic, password: &SecretString) -> WalletResult<EncryptedVault> {
    VaultCodec::default().encrypt(mnemonic, password)
}

pub fn decrypt_vault(vault: &EncryptedVault, password: &SecretString) -> WalletResult<Mnemonic> {
    VaultCodec::default().decrypt(vault, password)
}

fn encrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> WalletResult<Vec<u8>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Encryption failure".to_string()))?;
    Ok(in_out)
}

fn decrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
    sealed: &[u8],
) -> WalletResult<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    if sealed.len() < aead::AES_256_GCM.tag_len() {
        return Err(WalletError::AuthenticationError);
    }

    let mut in_out = Zeroizing::new(sealed.to_vec());
    let plaintext_len = key
        .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::AuthenticationError)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}
