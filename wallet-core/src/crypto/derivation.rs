//! Hierarchical-deterministic key derivation for every supported chain.
//!
//! EVM chains use BIP-32 over secp256k1 and share one key. Solana and TON use
//! SLIP-0010 hardened ed25519 derivation.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

use bip32::{DerivationPath, XPrv};
use ed25519_dalek::{Signer, Verifier};
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature};
use ring::pbkdf2;
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::mnemonic::Mnemonic;
use super::ton;
use crate::chains::{ChainAddress, ChainId, CurveKind};
use crate::errors::{WalletError, WalletResult};

pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";
pub const SOLANA_DERIVATION_PATH: [u32; 4] = [44, 501, 0, 0];
pub const TON_DERIVATION_PATH: [u32; 3] = [44, 607, 0];

const SEED_ROUNDS: NonZeroU32 = match NonZeroU32::new(2048) {
    Some(rounds) => rounds,
    None => panic!("seed rounds must be non-zero"),
};
const SEED_SALT_PREFIX: &str = "mnemonic";
const ED25519_CURVE_KEY: &[u8] = b"ed25519 seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;

type HmacSha512 = Hmac<Sha512>;

/// 64-byte BIP-39 seed. Lives only for the duration of a derivation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Seed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic" + passphrase`.
pub fn derive_seed(mnemonic: &Mnemonic, passphrase: &str) -> Seed {
    let mut salt = Zeroizing::new(String::with_capacity(
        SEED_SALT_PREFIX.len() + passphrase.len(),
    ));
    salt.push_str(SEED_SALT_PREFIX);
    salt.push_str(passphrase);

    let mut out = [0u8; 64];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        SEED_ROUNDS,
        salt.as_bytes(),
        mnemonic.as_str().as_bytes(),
        &mut out,
    );
    let seed = Seed(out);
    out.zeroize();
    seed
}

/// Chain signing key derived from a seed.
pub enum ChainKeyPair {
    Secp256k1(k256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl ChainKeyPair {
    /// Derive the signing key for `chain` at its fixed account path.
    pub fn derive(seed: &Seed, chain: ChainId) -> WalletResult<Self> {
        match chain.curve() {
            CurveKind::Secp256k1 => {
                let path: DerivationPath = EVM_DERIVATION_PATH
                    .parse()
                    .map_err(|e: bip32::Error| WalletError::CryptoError(e.to_string()))?;
                let xprv = XPrv::derive_from_path(seed.as_bytes(), &path)
                    .map_err(|e| WalletError::CryptoError(e.to_string()))?;
                Ok(ChainKeyPair::Secp256k1(xprv.private_key().clone()))
            }
            CurveKind::Ed25519 => {
                let path: &[u32] = match chain {
                    ChainId::Ton => &TON_DERIVATION_PATH,
                    _ => &SOLANA_DERIVATION_PATH,
                };
                let secret = slip10_ed25519(seed.as_bytes(), path)?;
                Ok(ChainKeyPair::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &secret,
                )))
            }
        }
    }

    /// Compressed SEC1 point for secp256k1, raw 32 bytes for ed25519.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            ChainKeyPair::Secp256k1(key) => key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
            ChainKeyPair::Ed25519(key) => key.verifying_key().to_bytes().to_vec(),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Receive address of this key on `chain`.
    pub fn address(&self, chain: ChainId) -> WalletResult<String> {
        match (self, chain.curve()) {
            (ChainKeyPair::Secp256k1(key), CurveKind::Secp256k1) => {
                let point = key.verifying_key().to_encoded_point(false);
                let hash = Keccak256::digest(&point.as_bytes()[1..]);
                Ok(to_checksum_address(&hash[12..]))
            }
            (ChainKeyPair::Ed25519(key), CurveKind::Ed25519) => {
                let public = key.verifying_key().to_bytes();
                match chain {
                    ChainId::Ton => Ok(ton::wallet_address(&public, true)),
                    _ => Ok(bs58::encode(public).into_string()),
                }
            }
            _ => Err(WalletError::CryptoError(format!(
                "key curve does not match {}",
                chain
            ))),
        }
    }

    /// Sign `payload`.
    ///
    /// secp256k1 signs the Keccak-256 digest and returns `r ‖ s ‖ v` with
    /// `v = 27 + recovery id`; ed25519 signs the payload directly.
    pub fn sign(&self, payload: &[u8]) -> WalletResult<Vec<u8>> {
        match self {
            ChainKeyPair::Secp256k1(key) => {
                let digest = Keccak256::digest(payload);
                let (signature, recovery_id) = key
                    .sign_prehash_recoverable(&digest)
                    .map_err(|e| WalletError::CryptoError(e.to_string()))?;
                let mut out = signature.to_bytes().to_vec();
                out.push(27 + recovery_id.to_byte());
                Ok(out)
            }
            ChainKeyPair::Ed25519(key) => Ok(key.sign(payload).to_bytes().to_vec()),
        }
    }

    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> WalletResult<bool> {
        match self {
            ChainKeyPair::Secp256k1(key) => {
                if signature.len() != 65 {
                    return Ok(false);
                }
                let parsed = EcdsaSignature::from_slice(&signature[..64])
                    .map_err(|e| WalletError::CryptoError(e.to_string()))?;
                if RecoveryId::from_byte(signature[64].wrapping_sub(27)).is_none() {
                    return Ok(false);
                }
                let digest = Keccak256::digest(payload);
                Ok(key.verifying_key().verify_prehash(&digest, &parsed).is_ok())
            }
            ChainKeyPair::Ed25519(key) => {
                let bytes: [u8; 64] = match signature.try_into() {
                    Ok(bytes) => bytes,
                    Err(_) => return Ok(false),
                };
                let parsed = ed25519_dalek::Signature::from_bytes(&bytes);
                Ok(key.verifying_key().verify(payload, &parsed).is_ok())
            }
        }
    }
}

impl fmt::Debug for ChainKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let curve = match self {
            ChainKeyPair::Secp256k1(_) => "secp256k1",
            ChainKeyPair::Ed25519(_) => "ed25519",
        };
        f.debug_struct("ChainKeyPair")
            .field("curve", &curve)
            .field("public_key", &self.public_key_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub fn derive_signing_key(seed: &Seed, chain: ChainId) -> WalletResult<ChainKeyPair> {
    ChainKeyPair::derive(seed, chain)
}

pub fn derive_address(seed: &Seed, chain: ChainId) -> WalletResult<ChainAddress> {
    let address = ChainKeyPair::derive(seed, chain)?.address(chain)?;
    Ok(ChainAddress {
        chain_id: chain,
        address,
    })
}

/// Addresses for every supported chain. EVM chains are derived once and shared.
pub fn derive_addresses(seed: &Seed) -> WalletResult<BTreeMap<ChainId, ChainAddress>> {
    let mut addresses = BTreeMap::new();
    let evm = ChainKeyPair::derive(seed, ChainId::Ethereum)?.address(ChainId::Ethereum)?;

    for chain in ChainId::ALL {
        let address = if chain.is_evm() {
            evm.clone()
        } else {
            ChainKeyPair::derive(seed, chain)?.address(chain)?
        };
        addresses.insert(
            chain,
            ChainAddress {
                chain_id: chain,
                address,
            },
        );
    }

    Ok(addresses)
}

/// EIP-55 mixed-case rendering of a 20-byte address.
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn slip10_ed25519(seed: &[u8], path: &[u32]) -> WalletResult<Zeroizing<[u8; 32]>> {
    let mut node = hmac_sha512(ED25519_CURVE_KEY, seed)?;

    for index in path {
        let mut data = Zeroizing::new([0u8; 37]);
        data[1..33].copy_from_slice(&node[..32]);
        data[33..].copy_from_slice(&(index | HARDENED_OFFSET).to_be_bytes());
        node = hmac_sha512(&node[32..], &data[..])?;
    }

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&node[..32]);
    Ok(key)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> WalletResult<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| WalletError::CryptoError(format!("HMAC init failed: {}", e)))?;
    mac.update(data);
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
