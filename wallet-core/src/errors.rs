use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::escape_html;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalletError {
    // Input errors
    ValidationError(String),
    UnsupportedChain(String),

    // Credential errors
    AuthenticationError,

    // Admission errors
    RateLimited { retry_after_secs: u64 },
    LockedOut { retry_after_secs: u64 },
    SessionLocked,

    // Cryptographic errors
    EntropySource(String),
    CryptoError(String),

    // Network errors
    NetworkError(String),
    Timeout,

    // Storage errors
    StorageError(String),
    NotFound(String),
}

/// Coarse error categories shared with bridge callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    RateLimit,
    Locked,
    Crypto,
    Network,
    Timeout,
    Storage,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::ValidationError(_) | WalletError::UnsupportedChain(_) => {
                ErrorKind::Validation
            }
            WalletError::AuthenticationError => ErrorKind::Authentication,
            WalletError::RateLimited { .. } => ErrorKind::RateLimit,
            WalletError::LockedOut { .. } | WalletError::SessionLocked => ErrorKind::Locked,
            WalletError::EntropySource(_) | WalletError::CryptoError(_) => ErrorKind::Crypto,
            WalletError::NetworkError(_) => ErrorKind::Network,
            WalletError::Timeout => ErrorKind::Timeout,
            WalletError::StorageError(_) | WalletError::NotFound(_) => ErrorKind::Storage,
        }
    }

    /// Transient errors resolve on their own or on caller retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit | ErrorKind::Locked | ErrorKind::Network | ErrorKind::Timeout
        )
    }

    /// Message safe to hand to a bridge caller: internal detail is dropped and
    /// the remainder is markup-escaped.
    pub fn sanitized(&self) -> String {
        let message = match self {
            WalletError::ValidationError(msg) => msg.clone(),
            WalletError::UnsupportedChain(chain) => format!("Unsupported network: {}", chain),
            WalletError::AuthenticationError => "Invalid password".to_string(),
            WalletError::RateLimited { retry_after_secs } => format!(
                "Too many attempts, retry in {} seconds",
                retry_after_secs
            ),
            WalletError::LockedOut { retry_after_secs } => format!(
                "Too many failed attempts, retry in {} seconds",
                retry_after_secs
            ),
            WalletError::SessionLocked => "Wallet is locked".to_string(),
            WalletError::EntropySource(_) => "Secure random source unavailable".to_string(),
            WalletError::CryptoError(_) => "Cryptographic operation failed".to_string(),
            WalletError::NetworkError(_) => "Network error, please retry".to_string(),
            WalletError::Timeout => {
                "Request timed out; the transaction status is unknown".to_string()
            }
            WalletError::StorageError(_) => "Wallet storage error".to_string(),
            WalletError::NotFound(what) => format!("Not found: {}", what),
        };
        escape_html(&message)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::UnsupportedChain(chain) => write!(f, "Unsupported chain: {}", chain),

            WalletError::AuthenticationError => write!(f, "Authentication failed"),

            WalletError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited, retry after {}s", retry_after_secs)
            }
            WalletError::LockedOut { retry_after_secs } => {
                write!(f, "Locked out, retry after {}s", retry_after_secs)
            }
            WalletError::SessionLocked => write!(f, "Wallet session is locked"),

            WalletError::EntropySource(msg) => write!(f, "Entropy source error: {}", msg),
            WalletError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),

            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::Timeout => write!(f, "Operation timed out"),

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::NotFound(error.to_string()),
            _ => WalletError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::StorageError(format!("JSON error: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_messages_hide_internal_detail() {
        let err = WalletError::NetworkError("connect to 10.0.0.1:443 refused".into());
        assert!(!err.sanitized().contains("10.0.0.1"));

        let err = WalletError::CryptoError("aead key rejected".into());
        assert_eq!(err.sanitized(), "Cryptographic operation failed");
    }

    #[test]
    fn sanitized_messages_are_escaped() {
        let err = WalletError::ValidationError("<script>alert(1)</script>".into());
        let message = err.sanitized();
        assert!(!message.contains('<'));
        assert!(message.contains("&lt;script&gt;"));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(WalletError::AuthenticationError.kind(), ErrorKind::Authentication);
        assert_eq!(WalletError::SessionLocked.kind(), ErrorKind::Locked);
        assert_eq!(
            WalletError::UnsupportedChain("doge".into()).kind(),
            ErrorKind::Validation
        );
        assert!(WalletError::Timeout.is_retryable());
        assert!(!WalletError::AuthenticationError.is_retryable());
    }
}
