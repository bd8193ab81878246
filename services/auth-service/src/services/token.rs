//! Opaque bearer token generation and at-rest hashing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Smallest number of random bytes a token may carry.
pub const MIN_TOKEN_BYTES: usize = 32;

/// Generates session tokens and derives the digests the store keeps.
#[derive(Debug, Clone, Copy)]
pub struct TokenCodec {
    token_bytes: usize,
}

impl TokenCodec {
    /// Codec producing tokens with the minimum entropy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            token_bytes: MIN_TOKEN_BYTES,
        }
    }

    /// Codec with a custom token length, clamped to at least [`MIN_TOKEN_BYTES`].
    #[must_use]
    pub const fn with_token_bytes(token_bytes: usize) -> Self {
        let token_bytes = if token_bytes < MIN_TOKEN_BYTES {
            MIN_TOKEN_BYTES
        } else {
            token_bytes
        };
        Self { token_bytes }
    }

    /// A fresh URL-safe token from the thread-local CSPRNG.
    #[must_use]
    pub fn generate(self) -> String {
        let mut bytes = vec![0u8; self.token_bytes];
        rand::rng().fill(&mut bytes[..]);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// One-way digest of a token, hex encoded. This is what gets persisted.
    #[must_use]
    pub fn hash(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length() {
        let codec = TokenCodec::with_token_bytes(64);
        // 64 bytes -> 86 base64 characters without padding
        assert_eq!(codec.generate().len(), 86);
    }

    #[test]
    fn test_short_length_is_clamped() {
        let codec = TokenCodec::with_token_bytes(8);
        assert_eq!(codec.generate().len(), 43);
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let codec = TokenCodec::new();
        let tokens: HashSet<String> = (0..1000).map(|_| codec.generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_hash_is_stable_and_not_the_token() {
        let token = TokenCodec::new().generate();
        let digest = TokenCodec::hash(&token);
        assert_eq!(digest, TokenCodec::hash(&token));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, token);
    }
}
