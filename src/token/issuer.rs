//! Single-use, expiring reset tokens.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::clock::Millis;
use crate::config::TokensConfig;
use crate::store::{StateStore, TokenRecord, TokenState};

use super::generator::TokenGenerator;
use super::TokenError;

/// Issues, validates and consumes reset tokens.
///
/// Like [`crate::ratelimit::RateLimiter`], every mutating call writes the
/// snapshot back through the store before returning and swallows save
/// failures.
pub struct TokenIssuer {
    ttl: Millis,
    revoke_previous: bool,
    generator: TokenGenerator,
    store: Arc<dyn StateStore>,
}

impl TokenIssuer {
    pub fn new(config: &TokensConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            ttl: Millis::try_from(config.ttl().as_millis()).unwrap_or(Millis::MAX),
            revoke_previous: config.revoke_previous,
            generator: TokenGenerator::new(config.token_bytes),
            store,
        }
    }

    /// Token lifetime in milliseconds.
    pub fn ttl(&self) -> Millis {
        self.ttl
    }

    /// Create a token for `identity` valid until `now + ttl`.
    ///
    /// Expired tokens of every identity are pruned first. Only the token
    /// string leaves this function.
    pub fn issue(
        &self,
        identity: &str,
        state: &mut TokenState,
        now: Millis,
    ) -> Result<String, TokenError> {
        let token = self.generator.generate()?;

        let pruned = state.prune_expired(now);
        if pruned > 0 {
            trace!(pruned, "Pruned expired tokens");
        }

        if self.revoke_previous {
            if let Some(records) = state.tokens.get_mut(identity) {
                for record in records.iter_mut().filter(|r| r.is_valid_at(now)) {
                    record.consumed = true;
                }
            }
        }

        let expires_at = now.saturating_add(self.ttl);
        state.push(TokenRecord::new(&token, identity, now, expires_at));
        debug!(identity, expires_at, "Issued reset token");

        self.persist(state);
        Ok(token)
    }

    /// True iff a matching token exists, is unexpired and unconsumed.
    pub fn validate(&self, identity: &str, token: &str, state: &TokenState, now: Millis) -> bool {
        state
            .find(identity, token)
            .map(|record| record.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Mark a token consumed. Does not re-validate; consuming twice is a
    /// no-op. Returns whether a matching token was found.
    pub fn consume(&self, identity: &str, token: &str, state: &mut TokenState, now: Millis) -> bool {
        let Some(record) = state.find_mut(identity, token) else {
            debug!(identity, "No matching token to consume");
            return false;
        };

        if !record.consumed {
            record.consumed = true;
            trace!(identity, age_ms = now - record.created_at, "Consumed reset token");
        }
        self.persist(state);
        true
    }

    /// Validate then consume in one step.
    pub fn redeem(&self, identity: &str, token: &str, state: &mut TokenState, now: Millis) -> bool {
        if !self.validate(identity, token, state, now) {
            return false;
        }
        self.consume(identity, token, state, now)
    }

    /// Drop expired tokens and persist. Returns the number removed.
    pub fn prune(&self, state: &mut TokenState, now: Millis) -> usize {
        let pruned = state.prune_expired(now);
        self.persist(state);
        pruned
    }

    fn persist(&self, state: &TokenState) {
        if let Err(e) = self.store.save_tokens(state) {
            warn!(error = %e, "Failed to persist token state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MILLIS_PER_HOUR;
    use crate::store::MemoryStateStore;

    const START: Millis = 1_700_000_000_000;

    fn create_issuer(revoke_previous: bool) -> (TokenIssuer, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let config = TokensConfig {
            revoke_previous,
            ..TokensConfig::default()
        };
        (TokenIssuer::new(&config, store.clone()), store)
    }

    #[test]
    fn test_issue_persists_record() {
        let (issuer, store) = create_issuer(false);
        let mut state = TokenState::default();

        let token = issuer.issue("a@x.com", &mut state, START).unwrap();

        let saved = store.load_tokens();
        let record = saved.find("a@x.com", &token).unwrap();
        assert_eq!(record.created_at, START);
        assert_eq!(record.expires_at, START + MILLIS_PER_HOUR);
        assert!(!record.consumed);
        assert_ne!(record.token_hash, token);
    }

    #[test]
    fn test_token_valid_until_expiry() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        let token = issuer.issue("a@x.com", &mut state, START).unwrap();
        let expiry = START + issuer.ttl();

        assert!(issuer.validate("a@x.com", &token, &state, START));
        assert!(issuer.validate("a@x.com", &token, &state, expiry - 1));
        assert!(!issuer.validate("a@x.com", &token, &state, expiry));
    }

    #[test]
    fn test_token_bound_to_identity() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        let token = issuer.issue("a@x.com", &mut state, START).unwrap();

        assert!(!issuer.validate("b@x.com", &token, &state, START));
        assert!(!issuer.validate("a@x.com", "not-a-token", &state, START));
    }

    #[test]
    fn test_consume_is_single_use() {
        let (issuer, store) = create_issuer(false);
        let mut state = TokenState::default();
        let token = issuer.issue("a@x.com", &mut state, START).unwrap();

        assert!(issuer.validate("a@x.com", &token, &state, START + 1));
        assert!(issuer.consume("a@x.com", &token, &mut state, START + 1));
        assert!(!issuer.validate("a@x.com", &token, &state, START + 2));

        // Second consume is a no-op
        assert!(issuer.consume("a@x.com", &token, &mut state, START + 2));
        assert!(store.load_tokens().find("a@x.com", &token).unwrap().consumed);
    }

    #[test]
    fn test_redeem_rejects_second_use() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        let token = issuer.issue("a@x.com", &mut state, START).unwrap();

        assert!(issuer.redeem("a@x.com", &token, &mut state, START + 1));
        assert!(!issuer.redeem("a@x.com", &token, &mut state, START + 2));
    }

    #[test]
    fn test_consume_unknown_token() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        assert!(!issuer.consume("a@x.com", "missing", &mut state, START));
    }

    #[test]
    fn test_multiple_live_tokens_by_default() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        let first = issuer.issue("a@x.com", &mut state, START).unwrap();
        let second = issuer.issue("a@x.com", &mut state, START + 1).unwrap();

        assert!(issuer.validate("a@x.com", &first, &state, START + 2));
        assert!(issuer.validate("a@x.com", &second, &state, START + 2));
        assert_eq!(state.live_count("a@x.com", START + 2), 2);
    }

    #[test]
    fn test_revoke_previous_leaves_one_live_token() {
        let (issuer, _) = create_issuer(true);
        let mut state = TokenState::default();
        let first = issuer.issue("a@x.com", &mut state, START).unwrap();
        let second = issuer.issue("a@x.com", &mut state, START + 1).unwrap();

        assert!(!issuer.validate("a@x.com", &first, &state, START + 2));
        assert!(issuer.validate("a@x.com", &second, &state, START + 2));
    }

    #[test]
    fn test_issue_prunes_expired_tokens() {
        let (issuer, _) = create_issuer(false);
        let mut state = TokenState::default();
        let old = issuer.issue("b@x.com", &mut state, START).unwrap();

        issuer
            .issue("a@x.com", &mut state, START + issuer.ttl())
            .unwrap();

        assert!(state.find("b@x.com", &old).is_none());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_oversized_ttl_saturates_instead_of_wrapping() {
        let config = TokensConfig {
            ttl_secs: u64::MAX,
            ..TokensConfig::default()
        };
        let issuer = TokenIssuer::new(&config, Arc::new(MemoryStateStore::new()));
        assert_eq!(issuer.ttl(), Millis::MAX);

        let mut state = TokenState::default();
        let token = issuer.issue("a@x.com", &mut state, START).unwrap();
        assert!(issuer.validate("a@x.com", &token, &state, START + 1));
    }

    #[test]
    fn test_issue_survives_failed_save() {
        let (issuer, store) = create_issuer(false);
        store.set_fail_saves(true);
        let mut state = TokenState::default();

        let token = issuer.issue("a@x.com", &mut state, START).unwrap();

        assert!(issuer.validate("a@x.com", &token, &state, START));
        assert!(store.load_tokens().is_empty());
    }
}
