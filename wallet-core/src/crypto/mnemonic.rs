//! BIP-39 recovery phrases.
//!
//! Entropy (128–256 bits) is extended by the leading `ENT/32` bits of its
//! SHA-256 digest and split into 11-bit word indices.

use std::fmt;

use arrayvec::ArrayVec;
use bip39::Language;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{WalletError, WalletResult};

/// 2048-entry word list indexed by 11-bit values.
pub type Wordlist = [&'static str; 2048];

pub const ALLOWED_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];
pub const DEFAULT_ENTROPY_BITS: usize = 128;

const MAX_ENTROPY_BYTES: usize = 32;
const MAX_WORDS: usize = 24;
const BITS_PER_WORD: usize = 11;

pub fn english_wordlist() -> &'static Wordlist {
    Language::English.word_list()
}

/// A recovery phrase. Zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic(String);

impl Mnemonic {
    /// Parse and fully verify a phrase against the English list.
    pub fn parse(phrase: &str) -> WalletResult<Self> {
        Self::parse_in(phrase, english_wordlist())
    }

    /// Normalizes case and whitespace, then checks word count, list membership
    /// and the embedded checksum.
    pub fn parse_in(phrase: &str, wordlist: &Wordlist) -> WalletResult<Self> {
        let normalized = Zeroizing::new(normalize_phrase(phrase));
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

        if !ALLOWED_WORD_COUNTS.contains(&words.len()) {
            return Err(WalletError::ValidationError(format!(
                "Recovery phrase must contain 12, 15, 18, 21 or 24 words, found {}",
                words.len()
            )));
        }

        let mut indices: ArrayVec<u16, MAX_WORDS> = ArrayVec::new();
        for (position, word) in words.iter().enumerate() {
            let index = word_index(wordlist, word).ok_or_else(|| {
                WalletError::ValidationError(format!(
                    "Word {} is not in the recovery word list",
                    position + 1
                ))
            })?;
            indices.push(index);
        }

        verify_checksum(&indices)?;
        Ok(Mnemonic(words.join(" ")))
    }

    /// Wrap a phrase recovered from an authenticated vault. Word list and
    /// checksum are not re-checked so blobs written by older clients still open.
    pub(crate) fn from_vault_plaintext(phrase: &str) -> Self {
        Mnemonic(normalize_phrase(phrase))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn words(&self) -> Vec<&str> {
        self.0.split(' ').collect()
    }

    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic([REDACTED; {} words])", self.word_count())
    }
}

/// Generate a fresh phrase from `entropy_bits` of OS randomness.
pub fn generate(wordlist: &Wordlist, entropy_bits: usize) -> WalletResult<Mnemonic> {
    if !matches!(entropy_bits, 128 | 160 | 192 | 224 | 256) {
        return Err(WalletError::ValidationError(format!(
            "Unsupported entropy size: {} bits",
            entropy_bits
        )));
    }

    let mut entropy = Zeroizing::new([0u8; MAX_ENTROPY_BYTES]);
    let len = entropy_bits / 8;
    OsRng
        .try_fill_bytes(&mut entropy[..len])
        .map_err(|e| WalletError::EntropySource(e.to_string()))?;

    entropy_to_mnemonic(&entropy[..len], wordlist)
}

/// Deterministic core of [`generate`].
pub fn entropy_to_mnemonic(entropy: &[u8], wordlist: &Wordlist) -> WalletResult<Mnemonic> {
    if !matches!(entropy.len(), 16 | 20 | 24 | 28 | 32) {
        return Err(WalletError::ValidationError(format!(
            "Unsupported entropy length: {} bytes",
            entropy.len()
        )));
    }

    let entropy_bits = entropy.len() * 8;
    let checksum_bits = entropy_bits / 32;
    let word_count = (entropy_bits + checksum_bits) / BITS_PER_WORD;

    // entropy ‖ first checksum byte; at most 8 checksum bits are consumed
    let mut stream: ArrayVec<u8, { MAX_ENTROPY_BYTES + 1 }> = ArrayVec::new();
    stream
        .try_extend_from_slice(entropy)
        .map_err(|_| WalletError::CryptoError("entropy buffer overflow".to_string()))?;
    stream.push(Sha256::digest(entropy)[0]);

    let mut phrase = String::with_capacity(word_count * 9);
    for word in 0..word_count {
        let index = read_bits(&stream, word * BITS_PER_WORD, BITS_PER_WORD);
        if word > 0 {
            phrase.push(' ');
        }
        phrase.push_str(wordlist[index as usize]);
    }

    stream.as_mut_slice().zeroize();
    Ok(Mnemonic(phrase))
}

/// Lowercase, single-space separated form used for validation and seeding.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_index(wordlist: &Wordlist, word: &str) -> Option<u16> {
    wordlist
        .iter()
        .position(|candidate| *candidate == word)
        .map(|i| i as u16)
}

fn verify_checksum(indices: &[u16]) -> WalletResult<()> {
    let total_bits = indices.len() * BITS_PER_WORD;
    let checksum_bits = total_bits / 33;
    let entropy_bytes = (total_bits - checksum_bits) / 8;

    let mut packed = Zeroizing::new([0u8; MAX_ENTROPY_BYTES + 1]);
    for (word, &index) in indices.iter().enumerate() {
        for bit in 0..BITS_PER_WORD {
            if (index >> (BITS_PER_WORD - 1 - bit)) & 1 == 1 {
                let position = word * BITS_PER_WORD + bit;
                packed[position / 8] |= 0x80 >> (position % 8);
            }
        }
    }

    let expected = Sha256::digest(&packed[..entropy_bytes])[0] >> (8 - checksum_bits);
    let actual = packed[entropy_bytes] >> (8 - checksum_bits);
    if expected != actual {
        return Err(WalletError::ValidationError(
            "Recovery phrase checksum mismatch".to_string(),
        ));
    }
    Ok(())
}

fn read_bits(stream: &[u8], start: usize, count: usize) -> u16 {
    let mut value = 0u16;
    for offset in 0..count {
        let position = start + offset;
        let bit = (stream[position / 8] >> (7 - position % 8)) & 1;
        value = (value << 1) | bit as u16;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    #[test]
    fn zero_entropy_matches_reference_vector() {
        let mnemonic = entropy_to_mnemonic(&[0u8; 16], english_wordlist()).unwrap();
        assert_eq!(mnemonic.as_str(), normalize_phrase(ABANDON_ABOUT));
    }

    #[test]
    fn generated_phrases_agree_with_bip39_crate() {
        let entropy = [0x7fu8; 32];
        let ours = entropy_to_mnemonic(&entropy, english_wordlist()).unwrap();
        let reference = bip39::Mnemonic::from_entropy(&entropy).unwrap();
        assert_eq!(ours.as_str(), reference.to_string());
        assert_eq!(ours.word_count(), 24);
    }

    #[test]
    fn generate_produces_fresh_twelve_word_phrases() {
        let first = generate(english_wordlist(), DEFAULT_ENTROPY_BITS).unwrap();
        let second = generate(english_wordlist(), DEFAULT_ENTROPY_BITS).unwrap();
        assert_eq!(first.word_count(), 12);
        assert_ne!(first, second);
        assert!(Mnemonic::parse(first.as_str()).is_ok());
    }

    #[test]
    fn generate_rejects_odd_entropy_sizes() {
        assert!(generate(english_wordlist(), 100).is_err());
        for bits in [160, 192, 224, 256] {
            let phrase = generate(english_wordlist(), bits).unwrap();
            assert_eq!(phrase.word_count(), (bits + bits / 32) / 11);
        }
    }

    #[test]
    fn parse_normalizes_and_verifies_checksum() {
        let parsed = Mnemonic::parse("  Abandon abandon abandon abandon abandon abandon\nabandon abandon abandon abandon abandon ABOUT ").unwrap();
        assert_eq!(parsed.as_str(), normalize_phrase(ABANDON_ABOUT));

        let bad_checksum = "abandon abandon abandon abandon abandon abandon \
                            abandon abandon abandon abandon abandon abandon";
        let err = Mnemonic::parse(bad_checksum).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(msg) if msg.contains("checksum")));
    }

    #[test]
    fn parse_rejects_unknown_words_without_echoing_them() {
        let phrase = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon zzzzzz";
        let err = Mnemonic::parse(phrase).unwrap_err();
        match err {
            WalletError::ValidationError(msg) => {
                assert!(msg.contains("Word 12"));
                assert!(!msg.contains("zzzzzz"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn debug_output_is_redacted() {
        let mnemonic = entropy_to_mnemonic(&[0u8; 16], english_wordlist()).unwrap();
        let rendered = format!("{:?}", mnemonic);
        assert!(!rendered.contains("abandon"));
    }
}
