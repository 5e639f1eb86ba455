use crate::errors::{WalletError, WalletResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const KEY_LOG_LEVEL: &str = "LOG_LEVEL";
pub const KEY_RATE_LIMIT_MAX_REQUESTS: &str = "RATE_LIMIT_MAX_REQUESTS";
pub const KEY_RATE_LIMIT_WINDOW_SECONDS: &str = "RATE_LIMIT_WINDOW_SECONDS";
pub const KEY_RATE_LIMIT_BLOCK_SECONDS: &str = "RATE_LIMIT_BLOCK_SECONDS";
pub const KEY_MAX_FAILED_ATTEMPTS: &str = "MAX_FAILED_ATTEMPTS";
pub const KEY_LOCKOUT_MINUTES: &str = "LOCKOUT_MINUTES";
pub const KEY_SESSION_TIMEOUT: &str = "SESSION_TIMEOUT_MINUTES";
pub const KEY_CSRF_TOKEN_TTL: &str = "CSRF_TOKEN_TTL_SECONDS";
pub const KEY_PENDING_MNEMONIC_TTL: &str = "PENDING_MNEMONIC_TTL_SECONDS";
pub const KEY_RELAY_TIMEOUT: &str = "RELAY_TIMEOUT_SECONDS";

const ENVIRONMENT_VAR: &str = "XIPHER_ENVIRONMENT";

/// Environment types for different security configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Security configuration manager
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    environment: Environment,
    config_map: HashMap<String, String>,
}

impl SecurityConfig {
    /// Create a new security configuration
    pub fn new(environment: Environment) -> Self {
        let mut config = SecurityConfig {
            environment,
            config_map: HashMap::new(),
        };

        // Load default configuration based on environment
        config.load_defaults();
        config
    }

    /// Load configuration from environment variables
    pub fn from_env() -> WalletResult<Self> {
        let env_str =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "production".to_string());
        let environment = match env_str.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" | "testing" => Environment::Test,
            _ => Environment::Production,
        };

        Self::from_environment(environment)
    }

    /// Construct a configuration for the provided environment and apply overrides.
    pub fn from_environment(environment: Environment) -> WalletResult<Self> {
        let mut config = Self::new(environment);
        config.apply_overrides(|var| std::env::var(var).ok());
        config.validate_required_configs()?;
        Ok(config)
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<&String> {
        self.config_map.get(key)
    }

    /// Get a required configuration value
    pub fn get_required(&self, key: &str) -> WalletResult<&String> {
        self.config_map.get(key).ok_or_else(|| {
            WalletError::ValidationError(format!("Required config key '{}' not found", key))
        })
    }

    /// Retrieve an unsigned 32-bit value with a default fallback.
    pub fn get_u32_with_default(&self, key: &str, default: u32) -> WalletResult<u32> {
        match self.config_map.get(key) {
            Some(value) => parse_u32_value(value, key),
            None => Ok(default),
        }
    }

    /// Set a configuration value (for testing purposes)
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config_map.insert(key.into(), value.into());
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Every guard knob must be present and numeric.
    pub fn validate_required_configs(&self) -> WalletResult<()> {
        let numeric_keys = [
            KEY_RATE_LIMIT_MAX_REQUESTS,
            KEY_RATE_LIMIT_WINDOW_SECONDS,
            KEY_RATE_LIMIT_BLOCK_SECONDS,
            KEY_MAX_FAILED_ATTEMPTS,
            KEY_LOCKOUT_MINUTES,
            KEY_SESSION_TIMEOUT,
            KEY_CSRF_TOKEN_TTL,
            KEY_PENDING_MNEMONIC_TTL,
            KEY_RELAY_TIMEOUT,
        ];

        self.get_required(KEY_LOG_LEVEL)?;
        for key in numeric_keys {
            let value = self.get_required(key).map_err(|_| {
                WalletError::ValidationError(format!(
                    "Required configuration key '{}' is missing for {} environment",
                    key,
                    self.environment.as_str()
                ))
            })?;
            if parse_u32_value(value, key)? == 0 {
                return Err(WalletError::ValidationError(format!(
                    "Configuration key '{}' must be positive",
                    key
                )));
            }
        }

        Ok(())
    }

    fn load_defaults(&mut self) {
        let defaults: [(&str, &str); 9] = [
            (KEY_RATE_LIMIT_MAX_REQUESTS, "30"),
            (KEY_RATE_LIMIT_WINDOW_SECONDS, "60"),
            (KEY_RATE_LIMIT_BLOCK_SECONDS, "300"),
            (KEY_MAX_FAILED_ATTEMPTS, "5"),
            (KEY_LOCKOUT_MINUTES, "30"),
            (KEY_SESSION_TIMEOUT, "15"),
            (KEY_CSRF_TOKEN_TTL, "300"),
            (KEY_PENDING_MNEMONIC_TTL, "60"),
            (KEY_RELAY_TIMEOUT, "30"),
        ];
        for (key, value) in defaults {
            self.config_map.insert(key.to_string(), value.to_string());
        }

        match self.environment {
            Environment::Production => {
                self.config_map
                    .insert(KEY_LOG_LEVEL.to_string(), "INFO".to_string());
            }
            Environment::Development => {
                self.config_map
                    .insert(KEY_LOG_LEVEL.to_string(), "DEBUG".to_string());
                self.config_map
                    .insert(KEY_SESSION_TIMEOUT.to_string(), "60".to_string());
            }
            Environment::Test => {
                self.config_map
                    .insert(KEY_LOG_LEVEL.to_string(), "WARN".to_string());
                self.config_map
                    .insert(KEY_RELAY_TIMEOUT.to_string(), "5".to_string());
            }
        }
    }

    /// Apply `XIPHER_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_mappings = [
            ("XIPHER_LOG_LEVEL", KEY_LOG_LEVEL),
            ("XIPHER_RATE_LIMIT_MAX_REQUESTS", KEY_RATE_LIMIT_MAX_REQUESTS),
            ("XIPHER_RATE_LIMIT_WINDOW", KEY_RATE_LIMIT_WINDOW_SECONDS),
            ("XIPHER_RATE_LIMIT_BLOCK", KEY_RATE_LIMIT_BLOCK_SECONDS),
            ("XIPHER_MAX_FAILED_ATTEMPTS", KEY_MAX_FAILED_ATTEMPTS),
            ("XIPHER_LOCKOUT_MINUTES", KEY_LOCKOUT_MINUTES),
            ("XIPHER_SESSION_TIMEOUT", KEY_SESSION_TIMEOUT),
            ("XIPHER_CSRF_TOKEN_TTL", KEY_CSRF_TOKEN_TTL),
            ("XIPHER_PENDING_MNEMONIC_TTL", KEY_PENDING_MNEMONIC_TTL),
            ("XIPHER_RELAY_TIMEOUT", KEY_RELAY_TIMEOUT),
        ];

        for (env_var, config_key) in &env_mappings {
            if let Some(value) = lookup(env_var) {
                if value.trim().is_empty() {
                    log::warn!("Environment variable {} is empty", env_var);
                    continue;
                }

                // no newlines or control characters
                if value.chars().any(|c| c.is_control()) {
                    log::warn!(
                        "Environment variable {} contains control characters, ignoring",
                        env_var
                    );
                    continue;
                }

                self.config_map
                    .insert(config_key.to_string(), value.trim().to_string());
                log::debug!(
                    "Loaded configuration {} from environment variable {}",
                    config_key,
                    env_var
                );
            }
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::new(Environment::Production)
    }
}

fn parse_u32_value(value: &str, key: &str) -> WalletResult<u32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WalletError::ValidationError(format!(
            "Configuration key '{}' cannot be empty",
            key
        )));
    }

    trimmed.parse::<u32>().map_err(|_| {
        WalletError::ValidationError(format!(
            "Invalid numeric value '{}' for key '{}'",
            value, key
        ))
    })
}

/// Typed limits for the security guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    pub max_requests: u32,
    pub rate_window: Duration,
    pub rate_block: Duration,
    pub max_failed_attempts: u32,
    pub lockout: Duration,
    pub session_timeout: Duration,
    pub csrf_ttl: Duration,
    pub pending_mnemonic_ttl: Duration,
    pub relay_timeout: std::time::Duration,
}

impl GuardPolicy {
    pub fn from_config(config: &SecurityConfig) -> WalletResult<Self> {
        let defaults = GuardPolicy::default();
        let seconds = |key: &str, default: Duration| -> WalletResult<Duration> {
            let value = config.get_u32_with_default(key, default.num_seconds() as u32)?;
            Ok(Duration::seconds(i64::from(value.max(1))))
        };
        let minutes = |key: &str, default: Duration| -> WalletResult<Duration> {
            let value = config.get_u32_with_default(key, default.num_minutes() as u32)?;
            Ok(Duration::minutes(i64::from(value.max(1))))
        };

        let relay_secs = config.get_u32_with_default(
            KEY_RELAY_TIMEOUT,
            defaults.relay_timeout.as_secs() as u32,
        )?;

        Ok(Self {
            max_requests: config
                .get_u32_with_default(KEY_RATE_LIMIT_MAX_REQUESTS, defaults.max_requests)?
                .max(1),
            rate_window: seconds(KEY_RATE_LIMIT_WINDOW_SECONDS, defaults.rate_window)?,
            rate_block: seconds(KEY_RATE_LIMIT_BLOCK_SECONDS, defaults.rate_block)?,
            max_failed_attempts: config
                .get_u32_with_default(KEY_MAX_FAILED_ATTEMPTS, defaults.max_failed_attempts)?
                .max(1),
            lockout: minutes(KEY_LOCKOUT_MINUTES, defaults.lockout)?,
            session_timeout: minutes(KEY_SESSION_TIMEOUT, defaults.session_timeout)?,
            csrf_ttl: seconds(KEY_CSRF_TOKEN_TTL, defaults.csrf_ttl)?,
            pending_mnemonic_ttl: seconds(KEY_PENDING_MNEMONIC_TTL, defaults.pending_mnemonic_ttl)?,
            relay_timeout: std::time::Duration::from_secs(u64::from(relay_secs.max(1))),
        })
    }
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            max_requests: 30,
            rate_window: Duration::seconds(60),
            rate_block: Duration::minutes(5),
            max_failed_attempts: 5,
            lockout: Duration::minutes(30),
            session_timeout: Duration::minutes(15),
            csrf_ttl: Duration::minutes(5),
            pending_mnemonic_ttl: Duration::seconds(60),
            relay_timeout: std::time::Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_defaults_match_guard_defaults() {
        let config = SecurityConfig::new(Environment::Production);
        assert!(config.validate_required_configs().is_ok());
        let policy = GuardPolicy::from_config(&config).unwrap();
        assert_eq!(policy, GuardPolicy::default());
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut config = SecurityConfig::new(Environment::Test);
        config.apply_overrides(|var| match var {
            "XIPHER_MAX_FAILED_ATTEMPTS" => Some("3".to_string()),
            "XIPHER_SESSION_TIMEOUT" => Some(" 2 ".to_string()),
            "XIPHER_LOG_LEVEL" => Some("bad\nvalue".to_string()),
            _ => None,
        });
        let policy = GuardPolicy::from_config(&config).unwrap();
        assert_eq!(policy.max_failed_attempts, 3);
        assert_eq!(policy.session_timeout, Duration::minutes(2));
        assert_eq!(policy.relay_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.get(KEY_LOG_LEVEL).unwrap(), "WARN");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut config = SecurityConfig::new(Environment::Production);
        config.set(KEY_LOCKOUT_MINUTES, "thirty");
        assert!(config.validate_required_configs().is_err());
        assert!(GuardPolicy::from_config(&config).is_err());

        config.set(KEY_LOCKOUT_MINUTES, "0");
        assert!(config.validate_required_configs().is_err());
    }

    #[test]
    fn environment_detection() {
        let config = SecurityConfig::new(Environment::Development);
        assert!(!config.is_production());
        assert_eq!(config.get(KEY_LOG_LEVEL).unwrap(), "DEBUG");
    }
}
