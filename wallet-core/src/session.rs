use parking_lot::RwLock;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};
use crate::validation::constant_time_eq;

const CSRF_TOKEN_BYTES: usize = 32;

struct CsrfToken {
    value: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionState {
    session_id: Option<String>,
    last_activity: Option<DateTime<Utc>>,
    locked: bool,
    csrf: Option<CsrfToken>,
}

/// Tracks the interactive session: activity timeout, explicit lock and the
/// anti-forgery token handed to the bridge.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    csrf_ttl: Duration,
}

impl SessionManager {
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration, csrf_ttl: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            clock,
            timeout,
            csrf_ttl,
        }
    }

    /// Begin a fresh unlocked session with a new id and token.
    pub fn start(&self) -> WalletResult<String> {
        let now = self.clock.now();
        let token = self.issue_csrf(now)?;
        let session_id = uuid::Uuid::new_v4().to_string();

        let mut state = self.state.write();
        state.session_id = Some(session_id.clone());
        state.last_activity = Some(now);
        state.locked = false;
        state.csrf = Some(token);
        log::debug!("Session started");
        Ok(session_id)
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    pub fn update_activity(&self) {
        let now = self.clock.now();
        self.state.write().last_activity = Some(now);
    }

    /// True iff a session exists, is not locked and has seen activity within
    /// the timeout. An expired session is locked as a side effect.
    pub fn is_session_valid(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write();
        if state.session_id.is_none() || state.locked {
            return false;
        }
        let fresh = state
            .last_activity
            .map_or(false, |last| now - last < self.timeout);
        if !fresh {
            state.locked = true;
            state.csrf = None;
            log::info!("Session expired after inactivity");
        }
        fresh
    }

    /// Gate for mutating operations; refreshes activity on success.
    pub fn require_valid(&self) -> WalletResult<()> {
        if !self.is_session_valid() {
            return Err(WalletError::SessionLocked);
        }
        self.update_activity();
        Ok(())
    }

    pub fn lock(&self) {
        let mut state = self.state.write();
        state.locked = true;
        state.csrf = None;
    }

    pub fn is_locked(&self) -> bool {
        !self.is_session_valid()
    }

    /// Current anti-forgery token, reissued when missing or stale.
    pub fn csrf_token(&self) -> WalletResult<String> {
        if !self.is_session_valid() {
            return Err(WalletError::SessionLocked);
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        let stale = state
            .csrf
            .as_ref()
            .map_or(true, |token| token.expires_at <= now);
        if stale {
            state.csrf = Some(self.issue_csrf(now)?);
        }
        Ok(state
            .csrf
            .as_ref()
            .map(|token| token.value.to_string())
            .unwrap_or_default())
    }

    /// Constant-time comparison; expired tokens never validate.
    pub fn validate_csrf_token(&self, candidate: &str) -> bool {
        let now = self.clock.now();
        let state = self.state.read();
        match &state.csrf {
            Some(token) if token.expires_at > now => {
                constant_time_eq(token.value.as_bytes(), candidate.as_bytes())
            }
            _ => false,
        }
    }

    fn issue_csrf(&self, now: DateTime<Utc>) -> WalletResult<CsrfToken> {
        let mut bytes = Zeroizing::new([0u8; CSRF_TOKEN_BYTES]);
        OsRng
            .try_fill_bytes(bytes.as_mut())
            .map_err(|e| WalletError::EntropySource(e.to_string()))?;
        Ok(CsrfToken {
            value: Zeroizing::new(hex::encode(bytes.as_ref())),
            expires_at: now + self.csrf_ttl,
        })
    }
}
