//! Argon2id password hashing.

use crate::config::PasswordConfig;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Argon2, Params, PasswordHasher as _,
};

/// Error raised when hashing cannot be performed.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Empty passwords are never hashed.
    #[error("password cannot be empty")]
    Empty,
    /// Argon2 parameters were rejected.
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),
    /// The hasher failed.
    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Salted password hashing with constant-time verification.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Hasher with argon2 default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hasher with explicit argon2id parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if argon2 rejects the parameters.
    pub fn with_params(
        memory_cost: u32,
        time_cost: u32,
        parallelism: u32,
        output_len: Option<usize>,
    ) -> Result<Self, PasswordError> {
        let params = Params::new(memory_cost, time_cost, parallelism, output_len)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        Ok(Self { argon2 })
    }

    /// Hasher configured from the `password` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if argon2 rejects the configured parameters.
    pub fn from_config(config: &PasswordConfig) -> Result<Self, PasswordError> {
        Self::with_params(
            config.memory_cost,
            config.time_cost,
            config.parallelism,
            Some(config.hash_length),
        )
    }

    /// Produce a PHC string for storage.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input or a hasher failure.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Verify a password against a stored PHC string.
    ///
    /// Malformed hashes verify as `false`.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        if password.is_empty() || hash.is_empty() {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn roughly the same time as a real verification.
    ///
    /// Called when no account matched, so the response time does not tell a
    /// caller whether the identifier exists.
    pub fn verify_dummy(&self, password: &str) {
        let salt = SaltString::generate(&mut OsRng);
        let _ = self.argon2.hash_password(password.as_bytes(), &salt);
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
