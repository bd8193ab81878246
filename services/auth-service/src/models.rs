//! Identity and session records shared by the session manager, the stores
//! and the ability engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a user in the identity store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Tenant identifier. Every scoped rule is bound to one company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    /// Wrap a company identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account status as recorded by the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// The user may authenticate.
    #[default]
    Active,
    /// The user is disabled; sessions stop working.
    Inactive,
}

impl UserStatus {
    /// Parse the stored column value. Anything unrecognised is inactive.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ACTIVE") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

/// Primary role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform administrator, unrestricted.
    Admin,
    /// Ordinary company user; access shaped by responsibility.
    User,
}

impl Role {
    /// Parse the stored column value.
    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            _ => None,
        }
    }

    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

/// Secondary classification of an ordinary user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Responsibility {
    /// Full access to every company-scoped subject.
    Engineer,
    /// Business entities plus report maintenance, no report creation.
    Secretary,
    /// Read-only access except for daily maintenance records.
    Operator,
}

impl Responsibility {
    /// Parse the stored column value.
    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ENGINEER" => Some(Self::Engineer),
            "SECRETARY" => Some(Self::Secretary),
            "OPERATOR" => Some(Self::Operator),
            _ => None,
        }
    }

    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Engineer => "ENGINEER",
            Self::Secretary => "SECRETARY",
            Self::Operator => "OPERATOR",
        }
    }
}

/// A user record as read from the identity store, including the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Optional alternative login name.
    pub username: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Account status.
    pub status: UserStatus,
    /// Primary role; `None` when the record carries no usable role.
    pub role: Option<Role>,
    /// Responsibility tier for ordinary users.
    pub responsibility: Option<Responsibility>,
    /// Owning company; `None` denies every scoped rule.
    pub company_id: Option<CompanyId>,
}

impl User {
    /// Whether the account may authenticate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Project the record into the sanitized form handed to handlers.
    #[must_use]
    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            name: self.name.clone(),
            status: self.status,
            role: self.role,
            responsibility: self.responsibility,
            company_id: self.company_id.clone(),
        }
    }
}

/// Authenticated user as seen by request handlers. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// User identifier.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Optional alternative login name.
    pub username: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Account status.
    pub status: UserStatus,
    /// Primary role.
    pub role: Option<Role>,
    /// Responsibility tier.
    pub responsibility: Option<Responsibility>,
    /// Owning company.
    pub company_id: Option<CompanyId>,
}

/// Lifecycle position of a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Access token is usable.
    Authenticated,
    /// Access token lapsed; the refresh token may still work.
    Expired,
    /// Permanently dead.
    Revoked,
}

/// A persisted session. Token columns hold SHA-256 digests, never raw tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier, stable across rotations.
    pub id: Uuid,
    /// Owning user.
    pub user_id: UserId,
    /// Digest of the current access token.
    pub access_token_hash: String,
    /// Digest of the current refresh token.
    pub refresh_token_hash: String,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
    /// Set once on revocation, never cleared.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Requester user agent at login.
    pub user_agent: Option<String>,
    /// Requester IP address at login.
    pub ip_address: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session has been revoked.
    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Classify the session. Revocation wins over any expiry.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_revoked() {
            SessionState::Revoked
        } else if now > self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Authenticated
        }
    }

    /// Whether the refresh token is past its expiry.
    #[must_use]
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.refresh_expires_at
    }
}

/// Everything needed to insert a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Owning user.
    pub user_id: UserId,
    /// Digest of the access token.
    pub access_token_hash: String,
    /// Digest of the refresh token.
    pub refresh_token_hash: String,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
    /// Requester user agent.
    pub user_agent: Option<String>,
    /// Requester IP address.
    pub ip_address: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Replacement token pair written by a rotation.
#[derive(Debug, Clone)]
pub struct RotatedTokens {
    /// Digest of the new access token.
    pub access_token_hash: String,
    /// Digest of the new refresh token.
    pub refresh_token_hash: String,
    /// New access token expiry.
    pub expires_at: DateTime<Utc>,
    /// New refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
}
