//! Request extractors.
//!
//! Handlers receive the authenticated user as an explicit [`AuthContext`]
//! argument; nothing downstream re-reads cookies.

use super::AppState;
use crate::ability::{Ability, AbilityEngine, Action, ResourceScope};
use crate::error::AuthError;
use crate::models::AuthUser;
use crate::services::{RequestMeta, ValidatedSession};
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Validated session plus the ability compiled for its user.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The validated session.
    pub session: ValidatedSession,
    /// Rules for this request.
    pub ability: Ability,
}

impl AuthContext {
    /// Build the context for a validated session.
    #[must_use]
    pub fn new(session: ValidatedSession) -> Self {
        let ability = AbilityEngine::compile(&session.user);
        Self { session, ability }
    }

    /// The authenticated user.
    #[must_use]
    pub const fn user(&self) -> &AuthUser {
        &self.session.user
    }

    /// Check the ability, mapping a denial to `403`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when no rule matches.
    pub fn require(
        &self,
        action: Action,
        subject: &str,
        resource: &ResourceScope,
    ) -> Result<(), AuthError> {
        self.ability.require(action, subject, resource)
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = state.cookies.access_token(&parts.headers);
        let session = state.manager.validate(token.as_deref()).await?;
        Ok(Self::new(session))
    }
}

/// Authentication that tolerates anonymous callers.
///
/// Credential problems yield `None`; store failures still reject.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthContext::from_request_parts(parts, state).await {
            Ok(context) => Ok(Self(Some(context))),
            Err(err) if err.is_internal() => Err(err),
            Err(_) => Ok(Self(None)),
        }
    }
}

/// `X-Forwarded-For` is honored only when the state trusts the proxy in front.
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust_forwarded_for = AppState::from_ref(state).trust_forwarded_for;
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .filter(|_| trust_forwarded_for)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(Self {
            user_agent,
            ip_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::CookieSettings;
    use crate::services::{AuthSessionManager, PasswordHasher};
    use crate::store::{InMemorySessionStore, InMemoryUserDirectory};
    use axum::{body::Body, http::Request, routing::get, Router};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        state_trusting(false)
    }

    fn state_trusting(trust_forwarded_for: bool) -> AppState {
        let manager = AuthSessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryUserDirectory::new()),
        )
        .with_password_hasher(PasswordHasher::with_params(1024, 1, 1, None).unwrap());
        AppState {
            manager: Arc::new(manager),
            cookies: Arc::new(CookieSettings::default()),
            trust_forwarded_for,
        }
    }

    async fn whoami(OptionalAuth(context): OptionalAuth) -> String {
        context.map_or_else(|| "anonymous".to_string(), |c| c.user().email.clone())
    }

    async fn meta(meta: RequestMeta) -> String {
        format!(
            "{}|{}",
            meta.user_agent.unwrap_or_default(),
            meta.ip_address.unwrap_or_default()
        )
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_optional_auth_tolerates_bad_cookie() {
        let app = Router::new()
            .route("/", get(whoami))
            .with_state(state());

        let anonymous = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(anonymous).await, "anonymous");

        let stale = app
            .oneshot(
                Request::get("/")
                    .header("cookie", "access_token=not-a-session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(stale).await, "anonymous");
    }

    fn meta_request() -> Request<Body> {
        let mut request = Request::get("/")
            .header("user-agent", "curl/8.5.0")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40_000))));
        request
    }

    #[tokio::test]
    async fn test_request_meta_ignores_forwarded_for_by_default() {
        let app = Router::new().route("/", get(meta)).with_state(state());
        let response = app.oneshot(meta_request()).await.unwrap();
        assert_eq!(body_text(response).await, "curl/8.5.0|192.0.2.10");
    }

    #[tokio::test]
    async fn test_request_meta_uses_forwarded_for_behind_trusted_proxy() {
        let app = Router::new()
            .route("/", get(meta))
            .with_state(state_trusting(true));
        let response = app.clone().oneshot(meta_request()).await.unwrap();
        assert_eq!(body_text(response).await, "curl/8.5.0|203.0.113.7");

        let direct = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(direct).await, "|");
    }
}
