//! HTTP surface: login, me, refresh, logout and ability export.

pub mod cookies;
pub mod extractors;

pub use cookies::{CookieSettings, SameSite};
pub use extractors::{AuthContext, OptionalAuth};

use crate::ability::Rule;
use crate::config::AuthServiceConfig;
use crate::error::AuthError;
use crate::models::AuthUser;
use crate::services::{AuthSessionManager, Credentials, RequestMeta};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Session manager.
    pub manager: Arc<AuthSessionManager>,
    /// Cookie attributes.
    pub cookies: Arc<CookieSettings>,
    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// State from a manager and the service configuration.
    #[must_use]
    pub fn new(manager: AuthSessionManager, config: &AuthServiceConfig) -> Self {
        Self {
            manager: Arc::new(manager),
            cookies: Arc::new(CookieSettings::from(&config.cookie)),
            trust_forwarded_for: config.service.trust_forwarded_for,
        }
    }
}

/// Build the router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/ability", get(ability))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.is_internal() {
            tracing::error!(error = %self, "auth service failure");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}

/// Login body. Either `email` or `username` identifies the account.
#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Account username.
    #[serde(default)]
    pub username: Option<String>,
    /// Plaintext password.
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginBody {
    fn into_credentials(self) -> Result<Credentials, AuthError> {
        let identifier = self
            .email
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.username.filter(|v| !v.trim().is_empty()));
        let password = self.password.filter(|v| !v.is_empty());
        match (identifier, password) {
            (Some(identifier), Some(password)) => Ok(Credentials {
                identifier,
                password,
            }),
            _ => Err(AuthError::InvalidRequest(
                "email or username and password are required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct UserBody {
    user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MeBody {
    user: AuthUser,
    session: SessionInfo,
}

#[derive(Debug, Serialize)]
struct AbilityBody {
    rules: Vec<Rule>,
}

#[derive(Debug, Serialize)]
struct LogoutBody {
    success: bool,
}

async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(body) = body.map_err(|rejection| AuthError::InvalidRequest(rejection.body_text()))?;
    let credentials = body.into_credentials()?;
    let grant = state.manager.login(credentials, meta).await?;

    let mut headers = HeaderMap::new();
    state
        .cookies
        .set_tokens(&mut headers, &grant.tokens, state.manager.now());
    Ok((headers, Json(UserBody { user: grant.user })).into_response())
}

async fn me(context: AuthContext) -> Json<MeBody> {
    let session = context.session;
    Json(MeBody {
        user: session.user,
        session: SessionInfo {
            expires_at: session.expires_at,
        },
    })
}

async fn refresh(State(state): State<AppState>, request_headers: HeaderMap) -> Response {
    let token = state.cookies.refresh_token(&request_headers);
    let mut headers = HeaderMap::new();

    let grant = match state.manager.refresh(token.as_deref()).await {
        Ok(grant) => grant,
        Err(err) => {
            if err.is_terminal_for_session() {
                state.cookies.clear_tokens(&mut headers);
            }
            return (headers, err).into_response();
        }
    };
    state
        .cookies
        .set_tokens(&mut headers, &grant.tokens, state.manager.now());
    (headers, Json(UserBody { user: grant.user })).into_response()
}

async fn logout(State(state): State<AppState>, request_headers: HeaderMap) -> Response {
    let access = state.cookies.access_token(&request_headers);
    let refresh = state.cookies.refresh_token(&request_headers);
    if let Err(err) = state
        .manager
        .logout(access.as_deref(), refresh.as_deref())
        .await
    {
        tracing::error!(error = %err, "logout could not revoke session");
    }

    let mut headers = HeaderMap::new();
    state.cookies.clear_tokens(&mut headers);
    (headers, Json(LogoutBody { success: true })).into_response()
}

async fn ability(context: AuthContext) -> Json<AbilityBody> {
    Json(AbilityBody {
        rules: context.ability.rules().to_vec(),
    })
}

async fn health() -> &'static str {
    "ok"
}
