//! Plain-text recovery message carrying the reset link.

use url::Url;

use crate::clock::{Millis, MILLIS_PER_HOUR};
use crate::config::DeliveryConfig;

use super::notifier::RecoveryMessage;

const MILLIS_PER_MINUTE: Millis = 60_000;

/// Human-readable token lifetime, e.g. "1 hour", "24 hours", "30 minutes".
pub fn describe_ttl(ttl: Millis) -> String {
    if ttl >= MILLIS_PER_HOUR && ttl % MILLIS_PER_HOUR == 0 {
        plural(ttl / MILLIS_PER_HOUR, "hour")
    } else {
        let minutes = (ttl + MILLIS_PER_MINUTE - 1) / MILLIS_PER_MINUTE;
        plural(minutes.max(1), "minute")
    }
}

fn plural(n: Millis, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// `{link_base}?email=..&token=..`
pub fn recovery_link(link_base: &str, email: &str, token: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(link_base, &[("email", email), ("token", token)])
}

pub fn compose(
    config: &DeliveryConfig,
    email: &str,
    token: &str,
    ttl: Millis,
) -> Result<RecoveryMessage, url::ParseError> {
    let link = recovery_link(&config.link_base, email, token)?;
    let body = format!(
        "A password reset was requested for this account.\n\n\
         Open the link below to choose a new password. It can be used once \
         and expires in {}.\n\n{}\n\n\
         If you did not request this, you can ignore this email.\n",
        describe_ttl(ttl),
        link
    );

    Ok(RecoveryMessage {
        to: email.to_string(),
        from: config.sender.clone(),
        subject: config.subject.clone(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ttl() {
        assert_eq!(describe_ttl(MILLIS_PER_HOUR), "1 hour");
        assert_eq!(describe_ttl(24 * MILLIS_PER_HOUR), "24 hours");
        assert_eq!(describe_ttl(30 * MILLIS_PER_MINUTE), "30 minutes");
        assert_eq!(describe_ttl(90 * MILLIS_PER_MINUTE), "90 minutes");
        assert_eq!(describe_ttl(1), "1 minute");
    }

    #[test]
    fn test_link_encodes_email() {
        let link = recovery_link("https://x.com/reset", "a+b@x.com", "abc123").unwrap();
        assert_eq!(
            link.as_str(),
            "https://x.com/reset?email=a%2Bb%40x.com&token=abc123"
        );
    }

    #[test]
    fn test_compose_uses_config() {
        let config = DeliveryConfig {
            sender: "support@x.com".to_string(),
            subject: "Reset your password".to_string(),
            link_base: "https://x.com/reset".to_string(),
            ..DeliveryConfig::default()
        };

        let message = compose(&config, "a@x.com", "tok", MILLIS_PER_HOUR).unwrap();

        assert_eq!(message.to, "a@x.com");
        assert_eq!(message.from, "support@x.com");
        assert_eq!(message.subject, "Reset your password");
        assert!(message.body.contains("https://x.com/reset?email=a%40x.com&token=tok"));
        assert!(message.body.contains("expires in 1 hour"));
    }

    #[test]
    fn test_compose_rejects_bad_base() {
        let config = DeliveryConfig {
            link_base: "not a url".to_string(),
            ..DeliveryConfig::default()
        };
        assert!(compose(&config, "a@x.com", "tok", MILLIS_PER_HOUR).is_err());
    }
}
