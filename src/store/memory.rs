//! In-process state store. Everything is lost when the process exits.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{RateLimitState, StateStore, StoreError, TokenState};

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    rate_limits: RwLock<RateLimitState>,
    tokens: RwLock<TokenState>,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail. Used to exercise the swallow path.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Forget all state, as a restart of the medium would.
    pub fn clear(&self) {
        *self.rate_limits.write() = RateLimitState::default();
        *self.tokens.write() = TokenState::default();
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl StateStore for MemoryStateStore {
    fn load_rate_limits(&self) -> RateLimitState {
        self.rate_limits.read().clone()
    }

    fn save_rate_limits(&self, state: &RateLimitState) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.rate_limits.write() = state.clone();
        Ok(())
    }

    fn load_tokens(&self) -> TokenState {
        self.tokens.read().clone()
    }

    fn save_tokens(&self, state: &TokenState) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.tokens.write() = state.clone();
        Ok(())
    }
}
