//! Rate limit policy and decision types.

use std::fmt;
use std::time::Duration;

use crate::clock::{Millis, MILLIS_PER_HOUR};
use crate::config::LimitsConfig;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Too many admitted requests across all identities
    GlobalLimit,
    /// Too many admitted requests for this identity
    UserLimit,
    /// Previous admitted request of this identity is too recent
    Interval,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::GlobalLimit => "global_limit",
            DenyReason::UserLimit => "user_limit",
            DenyReason::Interval => "interval",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied {
        reason: DenyReason,
        /// Whole hours until the request would pass; only for `Interval`
        retry_after_hours: Option<u64>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// The three limits, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub global_max: usize,
    pub user_max: usize,
    pub min_interval: Millis,
    pub window: Millis,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for RateLimitPolicy {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            global_max: config.global_max,
            user_max: config.user_max,
            min_interval: to_millis(config.min_interval()),
            window: to_millis(config.window()),
        }
    }
}

fn to_millis(duration: Duration) -> Millis {
    Millis::try_from(duration.as_millis()).unwrap_or(Millis::MAX)
}

/// `ceil(remaining / 1h)`, never less than one hour for a positive wait.
pub fn hours_until(remaining: Millis) -> u64 {
    if remaining <= 0 {
        return 0;
    }
    ((remaining + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR) as u64
}
