use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::chains::{unit_scale, Amount, ChainId};
use crate::crypto::derivation::to_checksum_address;
use crate::crypto::mnemonic::{english_wordlist, normalize_phrase, ALLOWED_WORD_COUNTS};
use crate::crypto::ton;
use crate::errors::{WalletError, WalletResult};

static EVM_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("valid EVM address regex"));
static SOLANA_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid Solana address regex")
});
static TON_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(EQ|UQ)[A-Za-z0-9_-]{46}$").expect("valid TON address regex"));
static SEED_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+$").expect("valid seed word regex"));

const MAX_INPUT_LEN: usize = 1000;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 256;
const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";
const COMMON_PASSWORD_FRAGMENTS: [&str; 6] =
    ["password", "12345678", "qwerty", "admin", "letmein", "welcome"];
const MALICIOUS_MARKERS: [&str; 6] = [
    "<script",
    "javascript:",
    "data:text/html",
    "vbscript:",
    "onload=",
    "onerror=",
];

/// Smallest and largest transferable amounts, in whole tokens.
pub const MIN_AMOUNT: &str = "0.000001";
pub const MAX_AMOUNT_WHOLE: u128 = 1_000_000;

/// Outcome of a validator; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }
}

impl<T> From<WalletResult<T>> for ValidationResult {
    fn from(result: WalletResult<T>) -> Self {
        match result {
            Ok(_) => ValidationResult::ok(),
            Err(WalletError::ValidationError(msg)) => ValidationResult::invalid(msg),
            Err(other) => ValidationResult::invalid(other.sanitized()),
        }
    }
}

/// Input validation for addresses, amounts, passwords and recovery phrases.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        InputValidator
    }

    pub fn validate_address(&self, address: &str, chain: ChainId) -> ValidationResult {
        self.check_address(address, chain).into()
    }

    pub fn validate_amount(&self, amount: &str, chain: ChainId) -> ValidationResult {
        self.parse_amount(amount, chain).into()
    }

    pub fn validate_password(&self, password: &str) -> ValidationResult {
        self.check_password(password).into()
    }

    pub fn validate_mnemonic(&self, phrase: &str) -> ValidationResult {
        self.check_mnemonic_shape(phrase).into()
    }

    /// Format plus checksum: EIP-55 for mixed-case EVM input, 32-byte key for
    /// Solana, tag and CRC for TON.
    pub fn check_address(&self, address: &str, chain: ChainId) -> WalletResult<()> {
        check_basic_security(address)?;
        let address = address.trim();
        if address.is_empty() {
            return Err(WalletError::ValidationError(
                "Address cannot be empty".to_string(),
            ));
        }

        match chain {
            ChainId::Ethereum | ChainId::Polygon => {
                if !EVM_ADDRESS_RE.is_match(address) {
                    return Err(invalid_address(chain));
                }
                let body = &address[2..];
                let mixed_case = body.chars().any(|c| c.is_ascii_lowercase())
                    && body.chars().any(|c| c.is_ascii_uppercase());
                if mixed_case {
                    let raw = hex::decode(body).map_err(|_| invalid_address(chain))?;
                    if to_checksum_address(&raw) != address {
                        return Err(WalletError::ValidationError(
                            "Address checksum mismatch".to_string(),
                        ));
                    }
                }
            }
            ChainId::Solana => {
                if !SOLANA_ADDRESS_RE.is_match(address) {
                    return Err(invalid_address(chain));
                }
                let decoded = bs58::decode(address)
                    .into_vec()
                    .map_err(|_| invalid_address(chain))?;
                if decoded.len() != 32 {
                    return Err(invalid_address(chain));
                }
            }
            ChainId::Ton => {
                if !TON_ADDRESS_RE.is_match(address) {
                    return Err(invalid_address(chain));
                }
                ton::parse_user_friendly(address)?;
            }
        }

        Ok(())
    }

    /// Parse a user-entered amount into base units.
    ///
    /// Accepts `,` as the decimal separator. Bounds are compared in integer
    /// base units.
    pub fn parse_amount(&self, amount: &str, chain: ChainId) -> WalletResult<Amount> {
        check_basic_security(amount)?;
        let normalized = amount.trim().replace(',', ".");
        if normalized.is_empty() {
            return Err(WalletError::ValidationError(
                "Amount cannot be empty".to_string(),
            ));
        }

        let decimals = chain.decimals();
        let parsed = Amount::parse_decimal(&normalized, decimals)?;
        if parsed.is_zero() {
            return Err(WalletError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }

        let min = Amount::parse_decimal(MIN_AMOUNT, decimals)
            .map(|a| a.base_units())
            .unwrap_or(1);
        if parsed.base_units() < min {
            return Err(WalletError::ValidationError(format!(
                "Minimum amount is {}",
                MIN_AMOUNT
            )));
        }

        let max = MAX_AMOUNT_WHOLE.saturating_mul(unit_scale(decimals));
        if parsed.base_units() > max {
            return Err(WalletError::ValidationError(format!(
                "Maximum amount is {}",
                MAX_AMOUNT_WHOLE
            )));
        }

        Ok(parsed)
    }

    /// Password strength. All missing character classes are reported together.
    pub fn check_password(&self, password: &str) -> WalletResult<()> {
        if password.is_empty() {
            return Err(WalletError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }
        if password.chars().count() > MAX_PASSWORD_LEN {
            return Err(WalletError::ValidationError(
                "Password too long".to_string(),
            ));
        }

        let lower = password.to_lowercase();
        if COMMON_PASSWORD_FRAGMENTS
            .iter()
            .any(|fragment| lower.contains(fragment))
        {
            return Err(WalletError::ValidationError(
                "Password is too common".to_string(),
            ));
        }

        let mut problems = Vec::new();
        if password.chars().count() < MIN_PASSWORD_LEN {
            problems.push("at least 8 characters");
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            problems.push("a lowercase letter");
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            problems.push("an uppercase letter");
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            problems.push("a digit");
        }
        if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
            problems.push("a special character");
        }

        if !problems.is_empty() {
            return Err(WalletError::ValidationError(format!(
                "Password needs {}",
                problems.join(", ")
            )));
        }
        Ok(())
    }

    /// Word count, lowercase alphabetic tokens and word list membership.
    /// The BIP-39 checksum is checked by `Mnemonic::parse`.
    pub fn check_mnemonic_shape(&self, phrase: &str) -> WalletResult<()> {
        let normalized = zeroize::Zeroizing::new(normalize_phrase(phrase));
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

        if !ALLOWED_WORD_COUNTS.contains(&words.len()) {
            return Err(WalletError::ValidationError(
                "Recovery phrase must contain 12, 15, 18, 21 or 24 words".to_string(),
            ));
        }

        let wordlist = english_wordlist();
        for (position, word) in words.iter().enumerate() {
            if !SEED_WORD_RE.is_match(word) || !wordlist.contains(word) {
                return Err(WalletError::ValidationError(format!(
                    "Word {} is not a valid recovery word",
                    position + 1
                )));
            }
        }
        Ok(())
    }
}

/// Escape text for inclusion in HTML or a JS string literal.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(c),
        }
    }
    out
}

/// Equal-length comparison whose running time does not depend on where the
/// inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn check_basic_security(input: &str) -> WalletResult<()> {
    if input.len() > MAX_INPUT_LEN {
        return Err(WalletError::ValidationError("Input too long".to_string()));
    }
    let lower = input.to_lowercase();
    if MALICIOUS_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Err(WalletError::ValidationError(
            "Input contains potentially malicious content".to_string(),
        ));
    }
    Ok(())
}

fn invalid_address(chain: ChainId) -> WalletError {
    WalletError::ValidationError(format!("Invalid {} address", chain.config().name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_addresses_check_case_and_checksum() {
        let v = InputValidator::new();
        assert!(v
            .check_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", ChainId::Ethereum)
            .is_ok());
        assert!(v
            .check_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", ChainId::Polygon)
            .is_ok());
        // one flipped case letter
        assert!(v
            .check_address("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", ChainId::Ethereum)
            .is_err());
        assert!(!v.validate_address("0x123", ChainId::Ethereum).valid);
    }

    #[test]
    fn solana_addresses_decode_to_public_keys() {
        let v = InputValidator::new();
        let key = bs58::encode([3u8; 32]).into_string();
        assert!(v.check_address(&key, ChainId::Solana).is_ok());
        assert!(v.check_address("0OIl", ChainId::Solana).is_err());
    }

    #[test]
    fn ton_addresses_require_valid_crc() {
        let v = InputValidator::new();
        let good = ton::wallet_address(&[5u8; 32], true);
        assert!(v.check_address(&good, ChainId::Ton).is_ok());
        let bad = format!("EQ{}", "A".repeat(46));
        assert!(v.check_address(&bad, ChainId::Ton).is_err());
    }

    #[test]
    fn amounts_accept_comma_and_respect_bounds() {
        let v = InputValidator::new();
        let amount = v.parse_amount("1,5", ChainId::Solana).unwrap();
        assert_eq!(amount.base_units(), 1_500_000_000);

        assert!(v.parse_amount("0.000001", ChainId::Ethereum).is_ok());
        assert!(v.parse_amount("0.0000009", ChainId::Ethereum).is_err());
        assert!(v.parse_amount("1000000", ChainId::Ton).is_ok());
        assert!(v.parse_amount("1000000.000000001", ChainId::Ton).is_err());
        assert!(v.parse_amount("0", ChainId::Ton).is_err());
        assert!(v.parse_amount("-1", ChainId::Ton).is_err());
        assert!(v.parse_amount("1e3", ChainId::Ton).is_err());
        assert!(v.parse_amount("0.0000000001", ChainId::Solana).is_err());
    }

    #[test]
    fn password_rules() {
        let v = InputValidator::new();
        assert!(v.validate_password("Str0ng!Pass").valid);
        let weak = v.validate_password("short");
        assert!(!weak.valid);
        let message = weak.error.unwrap();
        assert!(message.contains("8 characters") && message.contains("digit"));
        assert!(!v.validate_password("MyPassword1!").valid);
        assert!(!v.validate_password("Qwerty!234").valid);
        assert!(!v.validate_password("").valid);
    }

    #[test]
    fn mnemonic_shape_rules() {
        let v = InputValidator::new();
        let good = "abandon abandon abandon abandon abandon abandon \
                    abandon abandon abandon abandon abandon about";
        assert!(v.validate_mnemonic(good).valid);
        assert!(!v.validate_mnemonic("abandon abandon").valid);
        let bad_token = "abandon abandon abandon abandon abandon abandon \
                         abandon abandon abandon abandon abandon ab0ut";
        assert!(!v.validate_mnemonic(bad_token).valid);

        // valid words, but 13 is not an allowed length
        let thirteen = format!("{} about", "abandon ".repeat(12).trim_end());
        assert_eq!(thirteen.split(' ').count(), 13);
        assert!(matches!(
            v.check_mnemonic_shape(&thirteen),
            Err(WalletError::ValidationError(_))
        ));
        assert!(!v.validate_mnemonic(&thirteen).valid);
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'`=/&"#),
            "&lt;a href&#x3D;&quot;x&quot;&gt;&#x27;&#x60;&#x3D;&#x2F;&amp;"
        );
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn malicious_input_is_rejected() {
        let v = InputValidator::new();
        let result = v.validate_address("<script>alert(1)</script>", ChainId::Ethereum);
        assert!(!result.valid);
    }
}
