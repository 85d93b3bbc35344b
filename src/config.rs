//! Configuration management for the recovery gate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};

/// Prefix for environment overrides, e.g. `RECOVERY_GATE_LIMITS__USER_MAX`.
pub const ENV_PREFIX: &str = "RECOVERY_GATE";

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Main configuration for the recovery gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Rate limiting policy
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Reset token policy
    #[serde(default)]
    pub tokens: TokensConfig,

    /// State persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Account directory used for identity lookup
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Outbound recovery email delivery
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum admitted requests across all identities per window
    #[serde(default = "default_global_max")]
    pub global_max: usize,

    /// Maximum admitted requests per identity per window
    #[serde(default = "default_user_max")]
    pub user_max: usize,

    /// Minimum time between two admitted requests of one identity, in seconds
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Sliding window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            global_max: default_global_max(),
            user_max: default_user_max(),
            min_interval_secs: default_min_interval(),
            window_secs: default_window(),
        }
    }
}

fn default_global_max() -> usize {
    300
}

fn default_user_max() -> usize {
    2
}

fn default_min_interval() -> u64 {
    4 * 3600
}

fn default_window() -> u64 {
    24 * 3600
}

/// Reset token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,

    /// Random bytes per token (at least 32)
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,

    /// Consume all earlier live tokens of an identity when a new one is issued
    #[serde(default)]
    pub revoke_previous: bool,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl(),
            token_bytes: default_token_bytes(),
            revoke_previous: false,
        }
    }
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_token_bytes() -> usize {
    32
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

/// State persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Directory holding the state files when `backend` is `file`
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: default_state_dir(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_state_dir() -> PathBuf {
    std::env::temp_dir().join("recovery-gate")
}

/// Identity lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// YAML list of registered account emails
    #[serde(default)]
    pub accounts_path: Option<PathBuf>,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            accounts_path: None,
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

fn default_lookup_timeout() -> u64 {
    3000
}

/// Delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Spool directory picked up by the external mailer
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,

    #[serde(default = "default_sender")]
    pub sender: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Base URL of the password reset page
    #[serde(default = "default_link_base")]
    pub link_base: String,

    #[serde(default = "default_delivery_timeout")]
    pub timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            outbox_dir: default_outbox_dir(),
            sender: default_sender(),
            subject: default_subject(),
            link_base: default_link_base(),
            timeout_ms: default_delivery_timeout(),
        }
    }
}

fn default_outbox_dir() -> PathBuf {
    std::env::temp_dir().join("recovery-gate").join("outbox")
}

fn default_sender() -> String {
    "no-reply@localhost".to_string()
}

fn default_subject() -> String {
    "Password recovery".to_string()
}

fn default_link_base() -> String {
    "http://localhost:8080/reset-password".to_string()
}

fn default_delivery_timeout() -> u64 {
    5000
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

impl TokensConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl IdentityConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl GateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GateConfig =
            serde_yaml::from_str(&contents).map_err(|e| GateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `RECOVERY_GATE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: GateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the gate cannot enforce meaningfully.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.global_max == 0 || limits.user_max == 0 {
            return Err(GateError::Config("limits must be greater than zero".into()));
        }
        if limits.window_secs == 0 {
            return Err(GateError::Config("window_secs must be greater than zero".into()));
        }
        if limits.window_secs > MAX_DURATION_SECS || self.tokens.ttl_secs > MAX_DURATION_SECS {
            return Err(GateError::Config(format!(
                "durations must not exceed {} seconds",
                MAX_DURATION_SECS
            )));
        }
        if limits.min_interval_secs > limits.window_secs {
            return Err(GateError::Config(
                "min_interval_secs must not exceed window_secs".into(),
            ));
        }
        if self.tokens.ttl_secs == 0 {
            return Err(GateError::Config("tokens.ttl_secs must be greater than zero".into()));
        }
        if self.tokens.token_bytes < 32 {
            return Err(GateError::Config("tokens.token_bytes must be at least 32".into()));
        }
        url::Url::parse(&self.delivery.link_base)
            .map_err(|e| GateError::Config(format!("delivery.link_base is not a URL: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = GateConfig::default();
        assert_eq!(config.limits.global_max, 300);
        assert_eq!(config.limits.user_max, 2);
        assert_eq!(config.limits.min_interval(), Duration::from_secs(4 * 3600));
        assert_eq!(config.limits.window(), Duration::from_secs(24 * 3600));
        assert_eq!(config.tokens.ttl(), Duration::from_secs(3600));
        assert!(!config.tokens.revoke_previous);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
limits:
  user_max: 5
tokens:
  ttl_secs: 86400
storage:
  backend: memory
"#;
        let config: GateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.user_max, 5);
        assert_eq!(config.limits.global_max, 300);
        assert_eq!(config.tokens.ttl_secs, 86400);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_validate_rejects_short_tokens() {
        let mut config = GateConfig::default();
        config.tokens.token_bytes = 16;
        assert!(matches!(config.validate(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_interval_longer_than_window() {
        let mut config = GateConfig::default();
        config.limits.min_interval_secs = config.limits.window_secs + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_durations() {
        let mut config = GateConfig::default();
        config.tokens.ttl_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(GateError::Config(_))));

        let mut config = GateConfig::default();
        config.limits.window_secs = MAX_DURATION_SECS + 1;
        config.limits.min_interval_secs = MAX_DURATION_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.tokens.ttl_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_link_base() {
        let mut config = GateConfig::default();
        config.delivery.link_base = "reset-password".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.yaml");
        std::fs::write(&path, "limits:\n  global_max: 10\n").unwrap();

        let config = GateConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.limits.global_max, 10);
    }

    #[test]
    fn test_load_layers_environment_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.yaml");
        std::fs::write(&path, "limits:\n  global_max: 50\n  user_max: 3\n").unwrap();

        std::env::set_var("RECOVERY_GATE_LIMITS__USER_MAX", "7");
        let config = GateConfig::load(Some(&path));
        std::env::remove_var("RECOVERY_GATE_LIMITS__USER_MAX");

        let config = config.unwrap();
        assert_eq!(config.limits.global_max, 50);
        assert_eq!(config.limits.user_max, 7);
        assert_eq!(config.tokens.ttl_secs, 3600);
    }
}
