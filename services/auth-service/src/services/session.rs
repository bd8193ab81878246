//! Session lifecycle: login, validation, rotation and logout.
//!
//! The manager holds no per-session state of its own. Everything lives in the
//! injected [`SessionStore`], so any number of managers may run concurrently
//! against the same store.

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthServiceConfig, ConfigError};
use crate::error::{AuthError, AuthResult};
use crate::models::{AuthUser, NewSession, RotatedTokens, Session, SessionState, User, UserId};
use crate::services::password::PasswordHasher;
use crate::services::token::TokenCodec;
use crate::store::{SessionStore, UserDirectory};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Login input. The identifier is tried as an email first, then as a username.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Email or username.
    pub identifier: String,
    /// Plaintext password.
    pub password: String,
}

/// Audit metadata recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Requester `User-Agent`.
    pub user_agent: Option<String>,
    /// Requester IP address.
    pub ip_address: Option<String>,
}

/// A raw token pair handed to the client. Only this struct ever holds raw tokens.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Session the pair belongs to.
    pub session_id: Uuid,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    /// New token pair.
    pub tokens: IssuedTokens,
    /// Sanitized user.
    pub user: AuthUser,
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    /// Session identifier.
    pub session_id: Uuid,
    /// Sanitized user.
    pub user: AuthUser,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Orchestrates the session state machine over a [`SessionStore`].
#[derive(Clone)]
pub struct AuthSessionManager {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    passwords: PasswordHasher,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for AuthSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessionManager")
            .field("codec", &self.codec)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthSessionManager {
    /// Manager with 15 minute access tokens and 7 day refresh tokens.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            sessions,
            users,
            passwords: PasswordHasher::new(),
            codec: TokenCodec::new(),
            clock: Arc::new(SystemClock),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }

    /// Manager configured from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a token lifetime is out of range or the password
    /// parameters are invalid.
    pub fn from_config(
        config: &AuthServiceConfig,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Result<Self, ConfigError> {
        let access_ttl = config.session.access_ttl()?;
        let refresh_ttl = config.session.refresh_ttl()?;
        Ok(Self::new(sessions, users)
            .with_password_hasher(PasswordHasher::from_config(&config.password)?)
            .with_codec(TokenCodec::with_token_bytes(config.session.token_bytes))
            .with_ttls(access_ttl, refresh_ttl))
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the password hasher.
    #[must_use]
    pub const fn with_password_hasher(mut self, passwords: PasswordHasher) -> Self {
        self.passwords = passwords;
        self
    }

    /// Replace the token codec.
    #[must_use]
    pub const fn with_codec(mut self, codec: TokenCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Override token lifetimes.
    #[must_use]
    pub const fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Current server time as seen by this manager.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Access and refresh expiries for a pair issued at `now`.
    fn expiries(&self, now: DateTime<Utc>) -> AuthResult<(DateTime<Utc>, DateTime<Utc>)> {
        let access = now.checked_add_signed(self.access_ttl);
        let refresh = now.checked_add_signed(self.refresh_ttl);
        access.zip(refresh).ok_or_else(|| {
            AuthError::Misconfigured("token lifetime overflows the calendar".into())
        })
    }

    /// `Anonymous -> Authenticated`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidRequest`] for blank input, [`AuthError::InvalidCredentials`]
    /// for an unknown identifier or a wrong password.
    pub async fn login(&self, credentials: Credentials, meta: RequestMeta) -> AuthResult<AuthGrant> {
        let identifier = credentials.identifier.trim();
        if identifier.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::InvalidRequest(
                "identifier and password are required".into(),
            ));
        }

        let Some(user) = self.find_login_user(identifier).await? else {
            self.passwords.verify_dummy(&credentials.password);
            warn!("login rejected: no active account matched");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(&credentials.password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let now = self.clock.now();
        let (expires_at, refresh_expires_at) = self.expiries(now)?;
        let access_token = self.codec.generate();
        let refresh_token = self.codec.generate();
        let session = self
            .sessions
            .create(NewSession {
                user_id: user.id,
                access_token_hash: TokenCodec::hash(&access_token),
                refresh_token_hash: TokenCodec::hash(&refresh_token),
                expires_at,
                refresh_expires_at,
                user_agent: meta.user_agent,
                ip_address: meta.ip_address,
                created_at: now,
            })
            .await?;

        info!(user_id = %user.id, session_id = %session.id, "session created");
        Ok(AuthGrant {
            tokens: IssuedTokens {
                session_id: session.id,
                access_token,
                refresh_token,
                expires_at: session.expires_at,
                refresh_expires_at: session.refresh_expires_at,
            },
            user: user.to_auth_user(),
        })
    }

    async fn find_login_user(&self, identifier: &str) -> AuthResult<Option<User>> {
        if let Some(user) = self.users.find_active_by_email(identifier).await? {
            return Ok(Some(user));
        }
        Ok(self.users.find_active_by_username(identifier).await?)
    }

    /// Resolve an access token to its user.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`AuthError::Unauthenticated`] (no token),
    /// [`AuthError::SessionNotFound`], [`AuthError::SessionRevoked`],
    /// [`AuthError::AccessTokenExpired`], [`AuthError::UserInactive`].
    pub async fn validate(&self, access_token: Option<&str>) -> AuthResult<ValidatedSession> {
        let token = present(access_token).ok_or(AuthError::Unauthenticated)?;
        let session = self
            .sessions
            .find_by_access_hash(&TokenCodec::hash(token))
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        match session.state(self.clock.now()) {
            SessionState::Revoked => return Err(AuthError::SessionRevoked),
            SessionState::Expired => return Err(AuthError::AccessTokenExpired),
            SessionState::Authenticated => {}
        }

        let user = self.active_owner(&session).await?.ok_or(AuthError::UserInactive)?;
        Ok(ValidatedSession {
            session_id: session.id,
            user: user.to_auth_user(),
            expires_at: session.expires_at,
        })
    }

    /// Rotate both tokens of the session owning `refresh_token`.
    ///
    /// The old pair stops working the moment the rotation commits. Of two
    /// concurrent calls with the same refresh token, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`], [`AuthError::SessionNotFound`] (unknown,
    /// already rotated, or lost a race), [`AuthError::SessionRevoked`],
    /// [`AuthError::RefreshTokenExpired`] and [`AuthError::UserInactive`]. The
    /// last two revoke the session as a side effect.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AuthResult<AuthGrant> {
        let token = present(refresh_token).ok_or(AuthError::Unauthenticated)?;
        let presented_hash = TokenCodec::hash(token);
        let session = self
            .sessions
            .find_by_refresh_hash(&presented_hash)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_revoked() {
            return Err(AuthError::SessionRevoked);
        }

        let now = self.clock.now();
        if session.is_refresh_expired(now) {
            self.sessions.revoke(session.id, now).await?;
            info!(session_id = %session.id, "session revoked: refresh token expired");
            return Err(AuthError::RefreshTokenExpired);
        }

        let Some(user) = self.active_owner(&session).await? else {
            self.sessions.revoke(session.id, now).await?;
            info!(session_id = %session.id, "session revoked: user inactive");
            return Err(AuthError::UserInactive);
        };

        let (expires_at, refresh_expires_at) = self.expiries(now)?;
        let access_token = self.codec.generate();
        let refresh_token = self.codec.generate();
        let rotated = self
            .sessions
            .rotate(
                session.id,
                &presented_hash,
                RotatedTokens {
                    access_token_hash: TokenCodec::hash(&access_token),
                    refresh_token_hash: TokenCodec::hash(&refresh_token),
                    expires_at,
                    refresh_expires_at,
                },
            )
            .await?;

        let Some(rotated) = rotated else {
            debug!(session_id = %session.id, "rotation lost to a concurrent refresh");
            return Err(AuthError::SessionNotFound);
        };

        info!(user_id = %user.id, session_id = %rotated.id, "session rotated");
        Ok(AuthGrant {
            tokens: IssuedTokens {
                session_id: rotated.id,
                access_token,
                refresh_token,
                expires_at: rotated.expires_at,
                refresh_expires_at: rotated.refresh_expires_at,
            },
            user: user.to_auth_user(),
        })
    }

    /// `* -> Revoked`. Uses the access token, falling back to the refresh token.
    ///
    /// Idempotent: unknown or already revoked sessions are not an error.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<()> {
        if let Some(session) = self.logout_target(access_token, refresh_token).await? {
            if self.sessions.revoke(session.id, self.clock.now()).await? {
                info!(user_id = %session.user_id, session_id = %session.id, "session revoked: logout");
            }
        }
        Ok(())
    }

    async fn logout_target(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<Option<Session>> {
        if let Some(token) = present(access_token) {
            let found = self
                .sessions
                .find_by_access_hash(&TokenCodec::hash(token))
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        let Some(token) = present(refresh_token) else {
            return Ok(None);
        };
        Ok(self
            .sessions
            .find_by_refresh_hash(&TokenCodec::hash(token))
            .await?)
    }

    /// Revoke every live session of a user, e.g. after deactivation.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn revoke_user_sessions(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self
            .sessions
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;
        info!(user_id = %user_id, revoked, "user sessions revoked");
        Ok(revoked)
    }

    async fn active_owner(&self, session: &Session) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .find_by_id(session.user_id)
            .await?
            .filter(User::is_active))
    }
}

fn present(token: Option<&str>) -> Option<&str> {
    token.map(str::trim).filter(|t| !t.is_empty())
}
