//! Per-operation rate limiting and failure lockout.
//!
//! Each key moves Open → Blocked → Open. A key is blocked either for making
//! more than `max_requests` calls inside one window, or for reaching
//! `max_failed_attempts` consecutive failures.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};
use crate::security::GuardPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub window_start: Option<DateTime<Utc>>,
    pub request_count: u32,
    pub failed_attempts: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitRecord {
    fn is_locked_out(&self, max_failed_attempts: u32) -> bool {
        self.failed_attempts >= max_failed_attempts
    }

    /// Drop an elapsed block. A finished lockout also clears its failure count.
    fn expire(&mut self, now: DateTime<Utc>, max_failed_attempts: u32) {
        if let Some(until) = self.blocked_until {
            if until <= now {
                self.blocked_until = None;
                if self.is_locked_out(max_failed_attempts) {
                    self.failed_attempts = 0;
                }
            }
        }
    }

    fn is_persistent(&self) -> bool {
        self.failed_attempts > 0 || self.blocked_until.is_some()
    }
}

pub struct RateLimiter {
    records: Mutex<HashMap<String, RateLimitRecord>>,
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window: Duration,
    block: Duration,
    max_failed_attempts: u32,
    lockout: Duration,
}

impl RateLimiter {
    pub fn new(policy: &GuardPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            max_requests: policy.max_requests,
            window: policy.rate_window,
            block: policy.rate_block,
            max_failed_attempts: policy.max_failed_attempts,
            lockout: policy.lockout,
        }
    }

    /// Count one request against `key` and admit or reject it.
    pub fn check(&self, key: &str) -> WalletResult<()> {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_default();
        record.expire(now, self.max_failed_attempts);

        if let Some(until) = record.blocked_until {
            return Err(self.blocked_error(record, until, now));
        }

        let window_expired = record
            .window_start
            .map_or(true, |start| now - start > self.window);
        if window_expired {
            record.window_start = Some(now);
            record.request_count = 0;
        }

        record.request_count += 1;
        if record.request_count > self.max_requests {
            let until = now + self.block;
            record.blocked_until = Some(until);
            log::warn!("Rate limit exceeded for {}", key);
            return Err(WalletError::RateLimited {
                retry_after_secs: retry_after(until, now),
            });
        }

        Ok(())
    }

    /// Reject while `key` is locked out. Does not count as a request.
    pub fn check_lockout(&self, key: &str) -> WalletResult<()> {
        let now = self.clock.now();
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            record.expire(now, self.max_failed_attempts);
            if let Some(until) = record.blocked_until {
                if record.is_locked_out(self.max_failed_attempts) {
                    return Err(WalletError::LockedOut {
                        retry_after_secs: retry_after(until, now),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns true when this failure triggered a lockout.
    pub fn record_failure(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_default();
        record.expire(now, self.max_failed_attempts);

        record.failed_attempts = record.failed_attempts.saturating_add(1);
        if record.is_locked_out(self.max_failed_attempts) {
            record.blocked_until = Some(now + self.lockout);
            log::warn!("Locked out {} after {} failures", key, record.failed_attempts);
            return true;
        }
        false
    }

    /// Returns true when there was anything to reset.
    pub fn reset_failures(&self, key: &str) -> bool {
        let mut records = self.records.lock();
        match records.get_mut(key) {
            Some(record) if record.failed_attempts > 0 => {
                record.failed_attempts = 0;
                true
            }
            _ => false,
        }
    }

    pub fn failed_attempts(&self, key: &str) -> u32 {
        self.records
            .lock()
            .get(key)
            .map_or(0, |record| record.failed_attempts)
    }

    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(key).cloned()
    }

    /// JSON of every record carrying failures or a block.
    pub fn snapshot(&self) -> WalletResult<String> {
        let records = self.records.lock();
        let persistent: HashMap<&String, &RateLimitRecord> = records
            .iter()
            .filter(|(_, record)| record.is_persistent())
            .collect();
        Ok(serde_json::to_string(&persistent)?)
    }

    /// Merge a snapshot produced by [`RateLimiter::snapshot`].
    pub fn restore(&self, snapshot: &str) -> WalletResult<()> {
        let restored: HashMap<String, RateLimitRecord> = serde_json::from_str(snapshot)?;
        let mut records = self.records.lock();
        for (key, record) in restored {
            records.insert(key, record);
        }
        Ok(())
    }

    fn blocked_error(
        &self,
        record: &RateLimitRecord,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> WalletError {
        let retry_after_secs = retry_after(until, now);
        if record.is_locked_out(self.max_failed_attempts) {
            WalletError::LockedOut { retry_after_secs }
        } else {
            WalletError::RateLimited { retry_after_secs }
        }
    }
}

fn retry_after(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let remaining = (until - now).num_milliseconds().max(0) as u64;
    remaining.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        let limiter = RateLimiter::new(&GuardPolicy::default(), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn thirty_first_request_is_blocked_for_cooldown() {
        let (limiter, clock) = limiter();
        for _ in 0..30 {
            limiter.check("create_wallet").unwrap();
        }
        let err = limiter.check("create_wallet").unwrap_err();
        assert_eq!(err, WalletError::RateLimited { retry_after_secs: 300 });

        // other keys are unaffected
        assert!(limiter.check("import_wallet").is_ok());

        clock.advance(Duration::seconds(299));
        assert!(limiter.check("create_wallet").is_err());
        clock.advance(Duration::seconds(1));
        assert!(limiter.check("create_wallet").is_ok());
    }

    #[test]
    fn window_resets_after_sixty_seconds() {
        let (limiter, clock) = limiter();
        for _ in 0..30 {
            limiter.check("sync").unwrap();
        }
        clock.advance(Duration::seconds(61));
        assert!(limiter.check("sync").is_ok());
    }

    #[test]
    fn five_failures_lock_for_thirty_minutes() {
        let (limiter, clock) = limiter();
        for _ in 0..4 {
            assert!(!limiter.record_failure("unlock"));
        }
        assert!(limiter.check_lockout("unlock").is_ok());
        assert!(limiter.record_failure("unlock"));

        let err = limiter.check_lockout("unlock").unwrap_err();
        assert_eq!(err, WalletError::LockedOut { retry_after_secs: 1800 });
        assert!(matches!(
            limiter.check("unlock"),
            Err(WalletError::LockedOut { .. })
        ));

        clock.advance(Duration::minutes(30));
        assert!(limiter.check_lockout("unlock").is_ok());
        assert_eq!(limiter.failed_attempts("unlock"), 0);
    }

    #[test]
    fn success_resets_failure_counter() {
        let (limiter, _) = limiter();
        limiter.record_failure("send");
        limiter.record_failure("send");
        assert!(limiter.reset_failures("send"));
        assert_eq!(limiter.failed_attempts("send"), 0);
        assert!(!limiter.reset_failures("send"));
    }

    #[test]
    fn snapshot_restores_lockout() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure("unlock");
        }
        limiter.check("sync").unwrap();
        let snapshot = limiter.snapshot().unwrap();
        assert!(!snapshot.contains("sync"));

        let restored = RateLimiter::new(&GuardPolicy::default(), Arc::new(clock.clone()));
        restored.restore(&snapshot).unwrap();
        assert!(matches!(
            restored.check_lockout("unlock"),
            Err(WalletError::LockedOut { .. })
        ));
    }
}
