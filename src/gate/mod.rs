//! The recovery gate and its external collaborators.

mod handler;
mod lookup;
mod message;
mod notifier;
mod recovery;

pub use handler::{handle, GateResponse, ResponseBody, Route};
pub use lookup::{DirectoryLookup, IdentityLookup, LookupError};
pub use message::{compose, describe_ttl, recovery_link};
pub use notifier::{DeliveryError, Notifier, OutboxNotifier, RecoveryMessage};
pub use recovery::{PruneReport, RecoveryAccepted, RecoveryGate};

use crate::error::RecoveryError;

/// Normalize an email into an identity key: trimmed and lowercased.
///
/// Rejects empty input, embedded whitespace, and anything that is not a
/// single `@` between a non-empty local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Result<String, RecoveryError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(RecoveryError::Validation("email is required"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(RecoveryError::Validation("email is malformed"));
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(RecoveryError::Validation("email is malformed"));
    };
    let domain_ok = domain
        .split('.')
        .all(|label| !label.is_empty())
        && domain.contains('.');
    if local.is_empty() || !domain_ok {
        return Err(RecoveryError::Validation("email is malformed"));
    }

    Ok(email.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  A@X.com ").unwrap(), "a@x.com");
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert_eq!(
            normalize_email("   "),
            Err(RecoveryError::Validation("email is required"))
        );
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        for bad in ["a", "@x.com", "a@", "a@@x.com", "a@b@x.com", "a b@x.com", "a@x", "a@x..com", "a@.com"] {
            assert_eq!(
                normalize_email(bad),
                Err(RecoveryError::Validation("email is malformed")),
                "{} should be rejected",
                bad
            );
        }
    }
}
