//! Reset token issuance and redemption.

mod generator;
mod issuer;

pub use generator::{TokenGenerator, MIN_TOKEN_BYTES};
pub use issuer::TokenIssuer;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// The OS random source could not produce bytes
    #[error("entropy source failed: {0}")]
    Entropy(String),
}
