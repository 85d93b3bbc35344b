//! Random reset token generation.

use rand::rngs::OsRng;
use rand::RngCore;

use super::TokenError;

/// 256 bits.
pub const MIN_TOKEN_BYTES: usize = 32;

/// Generates hex-encoded tokens from the operating system CSPRNG.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    token_bytes: usize,
}

impl TokenGenerator {
    /// Create a generator; lengths below [`MIN_TOKEN_BYTES`] are raised to it.
    pub fn new(token_bytes: usize) -> Self {
        Self {
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
        }
    }

    pub fn token_bytes(&self) -> usize {
        self.token_bytes
    }

    pub fn generate(&self) -> Result<String, TokenError> {
        let mut random_bytes = vec![0u8; self.token_bytes];
        OsRng
            .try_fill_bytes(&mut random_bytes)
            .map_err(|e| TokenError::Entropy(e.to_string()))?;
        Ok(hex::encode(random_bytes))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(MIN_TOKEN_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_distinct() {
        let generator = TokenGenerator::default();
        let first = generator.generate().unwrap();
        let second = generator.generate().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_token_length_is_hex_of_bytes() {
        let generator = TokenGenerator::new(48);
        let token = generator.generate().unwrap();
        assert_eq!(token.len(), 96);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_lengths_are_raised() {
        let generator = TokenGenerator::new(8);
        assert_eq!(generator.token_bytes(), MIN_TOKEN_BYTES);
        assert_eq!(generator.generate().unwrap().len(), 64);
    }
}
