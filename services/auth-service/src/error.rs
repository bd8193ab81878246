//! Error taxonomy for the auth core.

use thiserror::Error;

/// Failure raised by a persistence adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database reported an error.
    #[error("database error: {0}")]
    Database(String),
    /// A uniqueness constraint was violated.
    #[error("conflicting record: {0}")]
    Conflict(String),
    /// The store could not be reached in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

/// Request-scoped authentication and authorization failures.
///
/// Every variant maps to one HTTP status and one stable reason code; none of
/// them is fatal to the process.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password. Deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// No token was presented, or it could not be read.
    #[error("authentication required")]
    Unauthenticated,
    /// The presented token matches no session.
    #[error("session not found")]
    SessionNotFound,
    /// The session was revoked.
    #[error("session revoked")]
    SessionRevoked,
    /// The access token is past its expiry.
    #[error("access token expired")]
    AccessTokenExpired,
    /// The refresh token is past its expiry.
    #[error("refresh token expired")]
    RefreshTokenExpired,
    /// The owning user is no longer active.
    #[error("user inactive")]
    UserInactive,
    /// The ability denied the requested action.
    #[error("forbidden")]
    Forbidden,
    /// Malformed input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Store or hashing failure; details are logged, not returned.
    #[error("internal error: {0}")]
    Internal(#[from] StoreError),
    /// A configured lifetime cannot be applied to the current time.
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl AuthError {
    /// Stable machine-readable reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated => "unauthenticated",
            Self::SessionNotFound => "session_not_found",
            Self::SessionRevoked => "session_revoked",
            Self::AccessTokenExpired => "access_token_expired",
            Self::RefreshTokenExpired => "refresh_token_expired",
            Self::UserInactive => "user_inactive",
            Self::Forbidden => "forbidden",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) | Self::Misconfigured(_) => "internal_error",
        }
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::InvalidCredentials
            | Self::Unauthenticated
            | Self::SessionNotFound
            | Self::SessionRevoked
            | Self::AccessTokenExpired
            | Self::RefreshTokenExpired
            | Self::UserInactive => 401,
            Self::Forbidden => 403,
            Self::Internal(_) | Self::Misconfigured(_) => 500,
        }
    }

    /// Whether this is a server-side failure rather than a credential problem.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Misconfigured(_))
    }

    /// Whether the client should drop its credentials.
    #[must_use]
    pub const fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound
                | Self::SessionRevoked
                | Self::RefreshTokenExpired
                | Self::UserInactive
                | Self::Unauthenticated
        )
    }
}

/// Result alias for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
