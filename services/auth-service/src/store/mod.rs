//! Persistence seams for sessions and identities.
//!
//! The session manager only talks to these traits. Every mutation is a single
//! atomic operation against the backing store; in particular
//! [`SessionStore::rotate`] is a compare-and-swap on the refresh token digest.

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::models::{NewSession, RotatedTokens, Session, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{InMemorySessionStore, InMemoryUserDirectory};
pub use postgres::{PgSessionStore, PgUserDirectory};

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Conflict`] if either token digest already exists.
    async fn create(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Look up a session by access token digest.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn find_by_access_hash(&self, hash: &str) -> Result<Option<Session>, StoreError>;

    /// Look up a session by refresh token digest.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn find_by_refresh_hash(&self, hash: &str) -> Result<Option<Session>, StoreError>;

    /// Replace both tokens and both expiries of a live session.
    ///
    /// Succeeds only when the stored refresh digest still equals
    /// `expected_refresh_hash` and the session is not revoked. Returns `None`
    /// when another caller won the race or the session was revoked meanwhile.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn rotate(
        &self,
        session_id: Uuid,
        expected_refresh_hash: &str,
        tokens: RotatedTokens,
    ) -> Result<Option<Session>, StoreError>;

    /// Set `revoked_at` if it is not already set. Returns whether this call revoked it.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn revoke(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Revoke every live session of a user. Returns how many were revoked.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Read-only view of the external identity store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Active user with this email, case-insensitive.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Active user with this username.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Any user by id, regardless of status.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError`] when the backing store is unreachable.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
}
