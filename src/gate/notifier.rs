//! Outbound delivery of recovery messages.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A message ready for delivery.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

// The body carries the reset link.
impl fmt::Debug for RecoveryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryMessage")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("subject", &self.subject)
            .field("body", &"<redacted>")
            .finish()
    }
}

/// The delivery service rejected or failed to accept a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("delivery failed ({status}): {message}")]
pub struct DeliveryError {
    pub status: u16,
    pub message: String,
}

impl DeliveryError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// External email delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &RecoveryMessage) -> Result<(), DeliveryError>;
}

/// Drops each message as a JSON file into a spool directory for an
/// external mailer to pick up.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, message: &RecoveryMessage) -> Result<(), DeliveryError> {
        let content = serde_json::to_vec_pretty(message)
            .map_err(|e| DeliveryError::new(500, e.to_string()))?;

        let name = format!(
            "{}-{}.json",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let target = self.dir.join(&name);
        let tmp = self.dir.join(format!(".{}.tmp", name));

        let spooled = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&tmp, &content).await?;
            tokio::fs::rename(&tmp, &target).await
        }
        .await;

        if let Err(e) = spooled {
            let _ = tokio::fs::remove_file(&tmp).await;
            warn!(dir = %self.dir.display(), error = %e, "Failed to spool recovery message");
            return Err(DeliveryError::new(500, "outbox unavailable"));
        }

        debug!(to = %message.to, file = %name, "Recovery message spooled");
        Ok(())
    }
}
