//! Durable-but-ephemeral state for the gate.
//!
//! Two independent records are kept: rate-limit timestamps and reset
//! tokens. Loads never fail; a missing or corrupt medium reads as empty
//! state. Saves report errors, which callers log and swallow.
//!
//! Stores are not transactional. Callers must serialize each
//! load/mutate/save cycle; [`crate::gate::RecoveryGate`] holds a single
//! lock around every cycle it runs.

mod file;
mod memory;
mod records;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use records::{in_window, RateLimitState, TokenRecord, TokenState};

use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

/// Failure to persist a snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for rate-limit and token snapshots.
pub trait StateStore: Send + Sync {
    /// Current rate-limit snapshot, or empty state if none is readable.
    fn load_rate_limits(&self) -> RateLimitState;

    /// Replace the rate-limit snapshot.
    fn save_rate_limits(&self, state: &RateLimitState) -> Result<(), StoreError>;

    /// Current token snapshot, or empty state if none is readable.
    fn load_tokens(&self) -> TokenState;

    /// Replace the token snapshot.
    fn save_tokens(&self, state: &TokenState) -> Result<(), StoreError>;
}

/// Build the store selected by configuration.
pub fn from_config(config: &StorageConfig) -> Arc<dyn StateStore> {
    match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStateStore::new()),
        StorageBackend::File => Arc::new(FileStateStore::new(&config.dir)),
    }
}
