//! Sliding-window rate limiter for recovery requests.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::clock::Millis;
use crate::store::{in_window, RateLimitState, StateStore};

use super::decision::{hours_until, Decision, DenyReason, RateLimitPolicy};

/// Applies the global cap, the per-identity cap and the minimum interval
/// to a rate-limit snapshot.
///
/// `check` is pure. `record` mutates the snapshot it is handed and writes
/// it back through the store before returning.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn StateStore>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn StateStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Decide whether `identity` may make a request at `now`.
    ///
    /// Policies are evaluated in order and the first failure wins.
    pub fn check(&self, identity: &str, state: &RateLimitState, now: Millis) -> Decision {
        let window = self.policy.window;

        let global = RateLimitState::count_recent(&state.global, now, window);
        trace!(global, limit = self.policy.global_max, "Global request count");
        if global >= self.policy.global_max {
            debug!(identity, global, "Global recovery limit reached");
            return Decision::Denied {
                reason: DenyReason::GlobalLimit,
                retry_after_hours: None,
            };
        }

        let history = state.history(identity);
        let recent = RateLimitState::count_recent(history, now, window);
        if recent >= self.policy.user_max {
            debug!(identity, recent, "Per-identity recovery limit reached");
            return Decision::Denied {
                reason: DenyReason::UserLimit,
                retry_after_hours: None,
            };
        }

        let last = history
            .iter()
            .copied()
            .filter(|ts| in_window(*ts, now, window))
            .max();
        if let Some(last) = last {
            // A timestamp ahead of `now` means the clock went backwards;
            // treat it as having just happened.
            let elapsed = now.saturating_sub(last).max(0);
            if elapsed < self.policy.min_interval {
                let retry_after_hours = hours_until(self.policy.min_interval - elapsed);
                debug!(identity, elapsed, retry_after_hours, "Recovery request too soon");
                return Decision::Denied {
                    reason: DenyReason::Interval,
                    retry_after_hours: Some(retry_after_hours),
                };
            }
        }

        Decision::Allowed
    }

    /// Count an admitted request, prune expired history and persist.
    ///
    /// A failed save is logged and swallowed; the in-memory snapshot
    /// still reflects the request.
    pub fn record(&self, identity: &str, state: &mut RateLimitState, now: Millis) {
        state.append(identity, now);
        let pruned = state.prune(now, self.policy.window);
        trace!(identity, pruned, "Recorded recovery request");

        if let Err(e) = self.store.save_rate_limits(state) {
            warn!(identity, error = %e, "Failed to persist rate limit state");
        }
    }

    /// Drop expired history and persist. Returns the number of timestamps removed.
    pub fn prune(&self, state: &mut RateLimitState, now: Millis) -> usize {
        let pruned = state.prune(now, self.policy.window);
        if let Err(e) = self.store.save_rate_limits(state) {
            warn!(error = %e, "Failed to persist pruned rate limit state");
        }
        pruned
    }
}
