//! Identity lookup: does an email belong to an existing account?

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::error::{GateError, Result};

use super::normalize_email;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("account directory unavailable: {0}")]
    Unavailable(String),
}

/// External account directory.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Whether `email` (already normalized) names an existing account.
    async fn lookup(&self, email: &str) -> std::result::Result<bool, LookupError>;
}

/// Account directory read from a YAML list of email addresses.
///
/// ```yaml
/// - alice@example.com
/// - bob@example.com
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectoryLookup {
    accounts: HashSet<String>,
}

impl DirectoryLookup {
    /// Build a directory from raw addresses. Malformed entries are skipped.
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accounts = accounts
            .into_iter()
            .filter_map(|email| normalize_email(email.as_ref()).ok())
            .collect();
        Self { accounts }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let accounts: Vec<String> = serde_yaml::from_str(&contents)
            .map_err(|e| GateError::Config(format!("Failed to parse account directory: {}", e)))?;

        let directory = Self::new(accounts);
        info!(path = %path.display(), accounts = directory.len(), "Account directory loaded");
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl IdentityLookup for DirectoryLookup {
    async fn lookup(&self, email: &str) -> std::result::Result<bool, LookupError> {
        Ok(self.accounts.contains(email))
    }
}
