//! Request-level orchestration of rate limiting, lookup, issuance and delivery.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, Millis};
use crate::config::{DeliveryConfig, GateConfig};
use crate::error::RecoveryError;
use crate::ratelimit::{Decision, RateLimitPolicy, RateLimiter};
use crate::store::{RateLimitState, StateStore};
use crate::token::TokenIssuer;

use super::lookup::IdentityLookup;
use super::message::compose;
use super::notifier::Notifier;
use super::normalize_email;

/// A recovery request that was admitted and delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAccepted {
    pub identity: String,
    pub expires_at: Millis,
    pub ttl: Millis,
}

/// Counts of entries removed by [`RecoveryGate::prune`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub rate_entries: usize,
    pub tokens: usize,
}

/// Decides whether a recovery request is admitted and, if so, issues a
/// token and hands it to the notifier.
///
/// Every load/mutate/save cycle against the store runs under `state_lock`.
/// The lock is released while the identity lookup and the notifier run.
pub struct RecoveryGate {
    limiter: RateLimiter,
    issuer: TokenIssuer,
    store: Arc<dyn StateStore>,
    lookup: Arc<dyn IdentityLookup>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    delivery: DeliveryConfig,
    lookup_timeout: Duration,
    state_lock: Mutex<()>,
}

impl RecoveryGate {
    pub fn new(
        config: &GateConfig,
        store: Arc<dyn StateStore>,
        lookup: Arc<dyn IdentityLookup>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(RateLimitPolicy::from(&config.limits), store.clone()),
            issuer: TokenIssuer::new(&config.tokens, store.clone()),
            store,
            lookup,
            notifier,
            clock,
            delivery: config.delivery.clone(),
            lookup_timeout: config.identity.lookup_timeout(),
            state_lock: Mutex::new(()),
        }
    }

    /// Token lifetime in milliseconds.
    pub fn token_ttl(&self) -> Millis {
        self.issuer.ttl()
    }

    /// Handle one recovery request for `email`.
    ///
    /// Rate budget is only spent once the identity is known to exist and a
    /// token has been issued. A delivery failure leaves the token stored.
    #[instrument(skip(self, email))]
    pub async fn request_recovery(&self, email: &str) -> Result<RecoveryAccepted, RecoveryError> {
        let identity = normalize_email(email)?;

        {
            let _guard = self.state_lock.lock().await;
            let now = self.clock.now_millis();
            let limits = self.store.load_rate_limits();
            self.ensure_allowed(&identity, &limits, now)?;
        }

        match timeout(self.lookup_timeout, self.lookup.lookup(&identity)).await {
            Err(_) => {
                warn!(identity = %identity, timeout = ?self.lookup_timeout, "Identity lookup timed out");
                return Err(RecoveryError::Internal);
            }
            Ok(Err(e)) => {
                warn!(identity = %identity, error = %e, "Identity lookup failed");
                return Err(RecoveryError::Internal);
            }
            Ok(Ok(false)) => {
                info!(identity = %identity, "Recovery requested for unknown identity");
                return Err(RecoveryError::NotFound);
            }
            Ok(Ok(true)) => {}
        }

        // Another request may have been admitted while the lock was released,
        // so the limits are checked again against a fresh snapshot.
        let (token, now) = {
            let _guard = self.state_lock.lock().await;
            let now = self.clock.now_millis();
            let mut limits = self.store.load_rate_limits();
            self.ensure_allowed(&identity, &limits, now)?;

            let mut tokens = self.store.load_tokens();
            let token = self.issuer.issue(&identity, &mut tokens, now).map_err(|e| {
                error!(identity = %identity, error = %e, "Failed to issue reset token");
                RecoveryError::Internal
            })?;
            self.limiter.record(&identity, &mut limits, now);
            (token, now)
        };

        let ttl = self.issuer.ttl();
        let message = compose(&self.delivery, &identity, &token, ttl).map_err(|e| {
            error!(error = %e, "Failed to build recovery link");
            RecoveryError::Internal
        })?;

        match timeout(self.delivery.timeout(), self.notifier.send(&message)).await {
            Err(_) => {
                warn!(identity = %identity, "Recovery email delivery timed out");
                return Err(RecoveryError::Delivery { status: 500 });
            }
            Ok(Err(e)) => {
                warn!(identity = %identity, status = e.status, error = %e.message, "Recovery email rejected");
                let status = if (400..=599).contains(&e.status) { e.status } else { 500 };
                return Err(RecoveryError::Delivery { status });
            }
            Ok(Ok(())) => {}
        }

        let expires_at = now.saturating_add(ttl);
        info!(identity = %identity, expires_at, "Recovery email sent");
        Ok(RecoveryAccepted {
            identity,
            expires_at,
            ttl,
        })
    }

    /// Redeem a token: valid tokens are consumed, anything else is rejected.
    #[instrument(skip(self, email, token))]
    pub async fn redeem(&self, email: &str, token: &str) -> Result<String, RecoveryError> {
        let identity = normalize_email(email)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(RecoveryError::Validation("token is required"));
        }

        let _guard = self.state_lock.lock().await;
        let now = self.clock.now_millis();
        let mut tokens = self.store.load_tokens();
        if !self.issuer.redeem(&identity, token, &mut tokens, now) {
            info!(identity = %identity, "Rejected invalid reset token");
            return Err(RecoveryError::InvalidToken);
        }

        info!(identity = %identity, "Reset token redeemed");
        Ok(identity)
    }

    /// Drop expired rate-limit history and tokens.
    pub async fn prune(&self) -> PruneReport {
        let _guard = self.state_lock.lock().await;
        let now = self.clock.now_millis();

        let mut limits = self.store.load_rate_limits();
        let rate_entries = self.limiter.prune(&mut limits, now);
        let mut tokens = self.store.load_tokens();
        let pruned_tokens = self.issuer.prune(&mut tokens, now);

        let report = PruneReport {
            rate_entries,
            tokens: pruned_tokens,
        };
        info!(rate_entries, tokens = pruned_tokens, "Pruned expired state");
        report
    }

    fn ensure_allowed(
        &self,
        identity: &str,
        limits: &RateLimitState,
        now: Millis,
    ) -> Result<(), RecoveryError> {
        match self.limiter.check(identity, limits, now) {
            Decision::Allowed => Ok(()),
            Decision::Denied {
                reason,
                retry_after_hours,
            } => {
                debug!(identity, %reason, ?retry_after_hours, "Recovery request rate limited");
                Err(RecoveryError::RateLimited {
                    reason,
                    retry_after_hours,
                })
            }
        }
    }
}
