//! Persisted record types: rate-limit timestamps and reset tokens.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

use crate::clock::Millis;

/// Whether `ts` still falls inside a window of `window` ms ending at `now`.
///
/// Open on the window boundary: a timestamp exactly `window` old is expired.
/// Timestamps ahead of `now` count while they are less than one window in
/// the future; anything further out cannot come from a real clock.
pub fn in_window(ts: Millis, now: Millis, window: Millis) -> bool {
    let age = now.saturating_sub(ts);
    age < window && age > window.saturating_neg()
}

/// Hex SHA-256 digest of a reset token. Only digests are stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admitted-request timestamps, per identity and across all identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Identity -> chronological request timestamps
    #[serde(default)]
    pub users: BTreeMap<String, Vec<Millis>>,
    /// Every admitted request, chronological
    #[serde(default)]
    pub global: Vec<Millis>,
}

impl RateLimitState {
    /// Timestamps recorded for one identity.
    pub fn history(&self, identity: &str) -> &[Millis] {
        self.users.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of entries in `timestamps` still inside the window.
    pub fn count_recent(timestamps: &[Millis], now: Millis, window: Millis) -> usize {
        timestamps
            .iter()
            .filter(|ts| in_window(**ts, now, window))
            .count()
    }

    /// Append `now` for the identity and the global sequence.
    pub fn append(&mut self, identity: &str, now: Millis) {
        self.users.entry(identity.to_string()).or_default().push(now);
        self.global.push(now);
    }

    /// Drop every timestamp older than the window. Identities left with no
    /// history are removed. Returns the number of timestamps dropped.
    pub fn prune(&mut self, now: Millis, window: Millis) -> usize {
        let before = self.len();
        self.global.retain(|ts| in_window(*ts, now, window));
        self.users.retain(|_, timestamps| {
            timestamps.retain(|ts| in_window(*ts, now, window));
            !timestamps.is_empty()
        });
        before - self.len()
    }

    /// Total number of stored timestamps.
    pub fn len(&self) -> usize {
        self.global.len() + self.users.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.users.is_empty()
    }
}

/// A single-use password reset token, stored by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_hash: String,
    pub identity: String,
    pub created_at: Millis,
    pub expires_at: Millis,
    #[serde(default)]
    pub consumed: bool,
}

impl TokenRecord {
    pub fn new(token: &str, identity: &str, created_at: Millis, expires_at: Millis) -> Self {
        Self {
            token_hash: hash_token(token),
            identity: identity.to_string(),
            created_at,
            expires_at,
            consumed: false,
        }
    }

    /// Constant-time comparison of `token`'s digest with the stored one.
    pub fn matches(&self, token: &str) -> bool {
        let presented = hash_token(token);
        if presented.len() != self.token_hash.len() {
            return false;
        }
        presented.as_bytes().ct_eq(self.token_hash.as_bytes()).into()
    }

    /// Valid iff not yet expired and never consumed.
    pub fn is_valid_at(&self, now: Millis) -> bool {
        now < self.expires_at && !self.consumed
    }

    pub fn is_expired_at(&self, now: Millis) -> bool {
        self.expires_at <= now
    }
}

/// Reset tokens keyed by owning identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    #[serde(default)]
    pub tokens: BTreeMap<String, Vec<TokenRecord>>,
}

impl TokenState {
    pub fn find(&self, identity: &str, token: &str) -> Option<&TokenRecord> {
        self.tokens
            .get(identity)?
            .iter()
            .find(|record| record.matches(token))
    }

    pub fn find_mut(&mut self, identity: &str, token: &str) -> Option<&mut TokenRecord> {
        self.tokens
            .get_mut(identity)?
            .iter_mut()
            .find(|record| record.matches(token))
    }

    pub fn push(&mut self, record: TokenRecord) {
        self.tokens
            .entry(record.identity.clone())
            .or_default()
            .push(record);
    }

    /// Tokens of `identity` that are still redeemable at `now`.
    pub fn live_count(&self, identity: &str, now: Millis) -> usize {
        self.tokens
            .get(identity)
            .map(|records| records.iter().filter(|r| r.is_valid_at(now)).count())
            .unwrap_or(0)
    }

    /// Drop expired tokens for every identity. Returns the number removed.
    pub fn prune_expired(&mut self, now: Millis) -> usize {
        let before = self.len();
        self.tokens.retain(|_, records| {
            records.retain(|record| !record.is_expired_at(now));
            !records.is_empty()
        });
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
