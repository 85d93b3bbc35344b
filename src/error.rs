//! Error types for the recovery gate.

use thiserror::Error;

use crate::ratelimit::DenyReason;

/// Main error type for process-level failures (configuration, I/O).
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for process-level operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Request outcomes that end in a user-visible failure.
///
/// Each variant carries just enough to render a templated response.
/// Internal details stay in the logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("no account for identity")]
    NotFound,

    #[error("rate limited: {reason}")]
    RateLimited {
        reason: DenyReason,
        retry_after_hours: Option<u64>,
    },

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("delivery failed with status {status}")]
    Delivery { status: u16 },

    #[error("internal error")]
    Internal,
}

impl RecoveryError {
    /// HTTP-style status code for this outcome.
    pub fn status(&self) -> u16 {
        match self {
            RecoveryError::MethodNotAllowed => 405,
            RecoveryError::Validation(_) | RecoveryError::InvalidToken => 400,
            RecoveryError::NotFound => 404,
            RecoveryError::RateLimited { .. } => 429,
            RecoveryError::Delivery { status } => *status,
            RecoveryError::Internal => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryError::MethodNotAllowed => "method_not_allowed",
            RecoveryError::Validation(_) => "validation_error",
            RecoveryError::NotFound => "not_found",
            RecoveryError::RateLimited { reason, .. } => reason.as_str(),
            RecoveryError::InvalidToken => "invalid_token",
            RecoveryError::Delivery { .. } => "delivery_failed",
            RecoveryError::Internal => "internal_error",
        }
    }

    /// Message shown to the requester.
    pub fn public_message(&self) -> String {
        match self {
            RecoveryError::MethodNotAllowed => "Only POST is supported.".to_string(),
            RecoveryError::Validation(detail) => format!("Invalid request: {}", detail),
            RecoveryError::NotFound => "No account is registered with that email address.".to_string(),
            RecoveryError::RateLimited { reason, retry_after_hours } => match reason {
                DenyReason::GlobalLimit => {
                    "Too many recovery requests right now. Please try again later.".to_string()
                }
                DenyReason::UserLimit => {
                    "Recovery request limit reached for this account. Please try again tomorrow."
                        .to_string()
                }
                DenyReason::Interval => {
                    let hours = retry_after_hours.unwrap_or(1);
                    format!(
                        "Please wait about {} hour{} before requesting another recovery email.",
                        hours,
                        if hours == 1 { "" } else { "s" }
                    )
                }
            },
            RecoveryError::InvalidToken => "The recovery link is invalid or has expired.".to_string(),
            RecoveryError::Delivery { .. } => {
                "The recovery email could not be sent. Please try again later.".to_string()
            }
            RecoveryError::Internal => "An internal error occurred.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RecoveryError::MethodNotAllowed.status(), 405);
        assert_eq!(RecoveryError::Validation("email is required").status(), 400);
        assert_eq!(RecoveryError::NotFound.status(), 404);
        assert_eq!(
            RecoveryError::RateLimited {
                reason: DenyReason::UserLimit,
                retry_after_hours: None
            }
            .status(),
            429
        );
        assert_eq!(RecoveryError::Delivery { status: 502 }.status(), 502);
        assert_eq!(RecoveryError::Internal.status(), 500);
    }

    #[test]
    fn test_rate_limit_codes_follow_reason() {
        let err = RecoveryError::RateLimited {
            reason: DenyReason::GlobalLimit,
            retry_after_hours: None,
        };
        assert_eq!(err.code(), "global_limit");
    }

    #[test]
    fn test_interval_message_includes_wait() {
        let err = RecoveryError::RateLimited {
            reason: DenyReason::Interval,
            retry_after_hours: Some(3),
        };
        assert!(err.public_message().contains("3 hours"));

        let err = RecoveryError::RateLimited {
            reason: DenyReason::Interval,
            retry_after_hours: Some(1),
        };
        assert!(err.public_message().contains("1 hour "));
    }

    #[test]
    fn test_internal_message_does_not_leak() {
        assert_eq!(RecoveryError::Internal.public_message(), "An internal error occurred.");
    }
}
