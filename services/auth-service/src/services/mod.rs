//! Core services: token codec, password hashing and the session manager.

pub mod password;
pub mod session;
pub mod token;

pub use password::{PasswordError, PasswordHasher};
pub use session::{
    AuthGrant, AuthSessionManager, Credentials, IssuedTokens, RequestMeta, ValidatedSession,
};
pub use token::TokenCodec;
