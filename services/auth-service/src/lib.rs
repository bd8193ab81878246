//! Auth service for the inspection platform.
//!
//! Issues and rotates bearer token pairs, persists and revokes sessions, and
//! compiles per-request, company-scoped abilities.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ability;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod services;
pub mod store;

// Re-export key types for convenience
pub use ability::{Ability, AbilityEngine, Action, ResourceScope, Rule, Subject};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthServiceConfig;
pub use error::{AuthError, AuthResult, StoreError};
pub use models::{AuthUser, CompanyId, Responsibility, Role, Session, User, UserId, UserStatus};
pub use services::{AuthSessionManager, Credentials, PasswordHasher, RequestMeta, TokenCodec};
pub use store::{InMemorySessionStore, InMemoryUserDirectory, SessionStore, UserDirectory};
