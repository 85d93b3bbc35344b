//! Rate limiting of recovery requests.

mod decision;
mod limiter;

pub use decision::{hours_until, Decision, DenyReason, RateLimitPolicy};
pub use limiter::RateLimiter;
