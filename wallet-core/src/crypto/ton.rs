//! TON wallet-v3R2 addresses.
//!
//! The address of a wallet contract is the representation hash of its
//! StateInit cell (code + initial data). Both cells are small enough to hash
//! directly without a general BoC serializer.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::errors::{WalletError, WalletResult};

/// Representation hash of the standard wallet-v3R2 code cell.
const WALLET_V3R2_CODE_HASH: [u8; 32] = [
    0x84, 0xda, 0xfa, 0x44, 0x9f, 0x98, 0xa6, 0x98, 0x77, 0x89, 0xba, 0x23, 0x23, 0x58, 0x07,
    0x2b, 0xc0, 0xf7, 0x6d, 0xc4, 0x52, 0x40, 0x02, 0xa5, 0xd0, 0x91, 0x8b, 0x9a, 0x75, 0xd2,
    0xd5, 0x99,
];
const WALLET_V3R2_CODE_DEPTH: u16 = 0;

/// Default subwallet id for workchain 0.
pub const DEFAULT_WALLET_ID: u32 = 698_983_191;
pub const BASECHAIN: i8 = 0;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;
const USER_FRIENDLY_LEN: usize = 36;

/// Decoded user-friendly address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TonAddress {
    pub workchain: i8,
    pub hash: [u8; 32],
    pub bounceable: bool,
    pub testnet: bool,
}

impl TonAddress {
    pub fn to_user_friendly(&self) -> String {
        let mut tag = if self.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if self.testnet {
            tag |= TAG_TESTNET;
        }

        let mut raw = [0u8; USER_FRIENDLY_LEN];
        raw[0] = tag;
        raw[1] = self.workchain as u8;
        raw[2..34].copy_from_slice(&self.hash);
        let crc = crc16_xmodem(&raw[..34]);
        raw[34..].copy_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(raw)
    }
}

/// Mainnet user-friendly address of the v3R2 wallet owned by `public_key`.
pub fn wallet_address(public_key: &[u8; 32], bounceable: bool) -> String {
    TonAddress {
        workchain: BASECHAIN,
        hash: state_init_hash(public_key, DEFAULT_WALLET_ID),
        bounceable,
        testnet: false,
    }
    .to_user_friendly()
}

/// Decode and verify a 48-character user-friendly address (tag and CRC).
pub fn parse_user_friendly(address: &str) -> WalletResult<TonAddress> {
    let invalid = || WalletError::ValidationError("Invalid TON address".to_string());

    let raw = URL_SAFE.decode(address).map_err(|_| invalid())?;
    if raw.len() != USER_FRIENDLY_LEN {
        return Err(invalid());
    }

    let expected = crc16_xmodem(&raw[..34]);
    let actual = u16::from_be_bytes([raw[34], raw[35]]);
    if expected != actual {
        return Err(WalletError::ValidationError(
            "TON address checksum mismatch".to_string(),
        ));
    }

    let testnet = raw[0] & TAG_TESTNET != 0;
    let bounceable = match raw[0] & !TAG_TESTNET {
        TAG_BOUNCEABLE => true,
        TAG_NON_BOUNCEABLE => false,
        _ => return Err(invalid()),
    };

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&raw[2..34]);
    Ok(TonAddress {
        workchain: raw[1] as i8,
        hash,
        bounceable,
        testnet,
    })
}

/// CRC-16/XMODEM (poly 0x1021, init 0).
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

// data cell: seqno:uint32 wallet_id:uint32 public_key:bits256, no refs
fn data_cell_hash(public_key: &[u8; 32], wallet_id: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00, 80]);
    hasher.update(0u32.to_be_bytes());
    hasher.update(wallet_id.to_be_bytes());
    hasher.update(public_key);
    hasher.finalize().into()
}

// StateInit: split_depth=0 special=0 code=1 data=1 library=0, two refs
fn state_init_hash(public_key: &[u8; 32], wallet_id: u32) -> [u8; 32] {
    let data_hash = data_cell_hash(public_key, wallet_id);

    let mut hasher = Sha256::new();
    hasher.update([0x02, 0x01, 0x34]);
    hasher.update(WALLET_V3R2_CODE_DEPTH.to_be_bytes());
    hasher.update(0u16.to_be_bytes());
    hasher.update(WALLET_V3R2_CODE_HASH);
    hasher.update(data_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_xmodem_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31c3);
    }

    #[test]
    fn bounceable_flag_selects_prefix() {
        let key = [7u8; 32];
        let bounceable = wallet_address(&key, true);
        let plain = wallet_address(&key, false);
        assert!(bounceable.starts_with("EQ"));
        assert!(plain.starts_with("UQ"));
        assert_eq!(bounceable.len(), 48);

        let a = parse_user_friendly(&bounceable).unwrap();
        let b = parse_user_friendly(&plain).unwrap();
        assert_eq!(a.hash, b.hash);
        assert!(a.bounceable && !b.bounceable);
    }

    #[test]
    fn distinct_keys_give_distinct_addresses() {
        assert_ne!(wallet_address(&[1u8; 32], true), wallet_address(&[2u8; 32], true));
    }

    #[test]
    fn corrupted_addresses_are_rejected() {
        let address = wallet_address(&[9u8; 32], true);
        let mut chars: Vec<char> = address.chars().collect();
        chars[10] = if chars[10] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(parse_user_friendly(&tampered).is_err());
        assert!(parse_user_friendly("EQshort").is_err());
    }
}
