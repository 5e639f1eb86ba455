use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::WalletResult;
use crate::rate_limit::RateLimiter;
use crate::secure_memory::SecureMemory;
use crate::security::GuardPolicy;
use crate::session::SessionManager;
use crate::storage::WalletStore;
use crate::validation::InputValidator;

/// Rate limiting, lockout, session, validation and ephemeral memory behind
/// one handle. Failure counters are written through to the secure store so
/// a lockout survives a restart.
pub struct SecurityGuard {
    policy: GuardPolicy,
    limiter: RateLimiter,
    session: SessionManager,
    memory: SecureMemory,
    validator: InputValidator,
    persistence: Option<WalletStore>,
}

impl SecurityGuard {
    pub fn new(
        policy: GuardPolicy,
        clock: Arc<dyn Clock>,
        persistence: Option<WalletStore>,
    ) -> WalletResult<Self> {
        let limiter = RateLimiter::new(&policy, Arc::clone(&clock));
        if let Some(store) = &persistence {
            if let Some(snapshot) = store.load_security_state()? {
                if let Err(err) = limiter.restore(&snapshot) {
                    log::warn!("Discarding unreadable security state: {}", err);
                }
            }
        }

        let session = SessionManager::new(
            Arc::clone(&clock),
            policy.session_timeout,
            policy.csrf_ttl,
        );
        let guard = Self {
            policy,
            limiter,
            session,
            memory: SecureMemory::new(clock),
            validator: InputValidator::new(),
            persistence,
        };
        guard.session.start()?;
        Ok(guard)
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    pub fn memory(&self) -> &SecureMemory {
        &self.memory
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Rate-limit admission for `key`.
    pub fn admit(&self, key: &str) -> WalletResult<()> {
        let result = self.limiter.check(key);
        if result.is_err() {
            self.persist();
        }
        result
    }

    pub fn check_lockout(&self, key: &str) -> WalletResult<()> {
        self.limiter.check_lockout(key)
    }

    pub fn record_failure(&self, key: &str) {
        self.limiter.record_failure(key);
        self.persist();
    }

    pub fn record_success(&self, key: &str) {
        if self.limiter.reset_failures(key) {
            self.persist();
        }
    }

    pub fn failed_attempts(&self, key: &str) -> u32 {
        self.limiter.failed_attempts(key)
    }

    pub fn is_session_valid(&self) -> bool {
        self.session.is_session_valid()
    }

    pub fn require_session(&self) -> WalletResult<()> {
        self.session.require_valid()
    }

    pub fn update_activity(&self) {
        self.session.update_activity();
    }

    /// Force the locked state and purge every ephemeral secret.
    pub fn lock_wallet(&self) {
        self.session.lock();
        self.memory.clear_all();
        log::info!("Wallet locked");
    }

    pub fn unlock_session(&self) -> WalletResult<()> {
        self.session.start()?;
        log::info!("Wallet unlocked");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        if self.session.is_locked() {
            self.memory.clear_all();
            return true;
        }
        false
    }

    pub fn csrf_token(&self) -> WalletResult<String> {
        self.session.csrf_token()
    }

    pub fn validate_csrf_token(&self, token: &str) -> bool {
        self.session.validate_csrf_token(token)
    }

    fn persist(&self) {
        let Some(store) = &self.persistence else {
            return;
        };
        let result = self
            .limiter
            .snapshot()
            .and_then(|snapshot| store.save_security_state(&snapshot));
        if let Err(err) = result {
            log::error!("Failed to persist security state: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::WalletError;
    use crate::storage::MemorySecureStore;
    use chrono::Duration;

    fn guard_with_store(clock: &ManualClock, store: &WalletStore) -> SecurityGuard {
        SecurityGuard::new(
            GuardPolicy::default(),
            Arc::new(clock.clone()),
            Some(store.clone()),
        )
        .unwrap()
    }

    #[test]
    fn lockout_survives_restart() {
        let clock = ManualClock::default();
        let store = WalletStore::new(Arc::new(MemorySecureStore::new()));

        let guard = guard_with_store(&clock, &store);
        for _ in 0..5 {
            guard.record_failure("unlock");
        }
        drop(guard);

        let restarted = guard_with_store(&clock, &store);
        assert!(matches!(
            restarted.check_lockout("unlock"),
            Err(WalletError::LockedOut { .. })
        ));

        clock.advance(Duration::minutes(31));
        assert!(restarted.check_lockout("unlock").is_ok());
    }

    #[test]
    fn lock_purges_ephemeral_memory() {
        let clock = ManualClock::default();
        let guard = SecurityGuard::new(GuardPolicy::default(), Arc::new(clock), None).unwrap();
        guard
            .memory()
            .store("pending_mnemonic", b"words", Duration::seconds(60))
            .unwrap();
        assert!(!guard.is_locked());

        guard.lock_wallet();
        assert!(guard.is_locked());
        assert!(guard.memory().is_empty());
        assert_eq!(guard.require_session(), Err(WalletError::SessionLocked));

        guard.unlock_session().unwrap();
        assert!(guard.require_session().is_ok());
    }

    #[test]
    fn session_expiry_purges_memory() {
        let clock = ManualClock::default();
        let guard =
            SecurityGuard::new(GuardPolicy::default(), Arc::new(clock.clone()), None).unwrap();
        guard
            .memory()
            .store("pending_mnemonic", b"words", Duration::hours(1))
            .unwrap();
        clock.advance(Duration::minutes(16));
        assert!(guard.is_locked());
        assert!(guard.memory().is_empty());
    }
}
