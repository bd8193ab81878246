//! HTTP round trips through the router.

use auth_service::http::{router, AppState, CookieSettings};
use auth_service::{
    AuthSessionManager, CompanyId, InMemorySessionStore, InMemoryUserDirectory, PasswordHasher,
    Responsibility, Role, User, UserId, UserStatus,
};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, StatusCode,
    },
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let passwords = PasswordHasher::with_params(1024, 1, 1, None).expect("valid params");
    let users = InMemoryUserDirectory::new();
    users.insert(User {
        id: UserId::new(),
        email: "operator@example.com".into(),
        username: Some("op".into()),
        name: Some("Operator".into()),
        password_hash: passwords.hash("s3cret!").expect("hash"),
        status: UserStatus::Active,
        role: Some(Role::User),
        responsibility: Some(Responsibility::Operator),
        company_id: Some(CompanyId::new("c1")),
    });

    let manager = AuthSessionManager::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(users),
    )
    .with_password_hasher(passwords);
    let state = AppState {
        manager: Arc::new(manager),
        cookies: Arc::new(CookieSettings {
            secure: false,
            ..CookieSettings::default()
        }),
        trust_forwarded_for: false,
    };
    router(state)
}

fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn with_cookies(method: &str, uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(COOKIE, cookies)
        .body(Body::empty())
        .expect("request")
}

/// `name=value` pairs from the response's Set-Cookie headers.
fn cookie_pairs(response: &axum::response::Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn login(app: &Router) -> Vec<(String, String)> {
    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/login",
            &json!({"email": "operator@example.com", "password": "s3cret!"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    cookie_pairs(&response)
}

#[tokio::test]
async fn test_login_sets_cookies_and_returns_user() {
    let app = app();
    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/login",
            &json!({"username": "op", "password": "s3cret!"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let raw: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().expect("ascii").to_string())
        .collect();
    assert_eq!(raw.len(), 2);
    assert!(raw.iter().all(|c| c.contains("HttpOnly") && c.contains("SameSite=Lax")));
    assert!(raw.iter().all(|c| c.contains("Path=/")));

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "operator@example.com");
    assert_eq!(body["user"]["companyId"], "c1");
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_login_failures() {
    let app = app();
    let missing = app
        .clone()
        .oneshot(json_request("/auth/login", &json!({"email": "operator@example.com"})))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["error"], "invalid_request");

    let wrong = app
        .clone()
        .oneshot(json_request(
            "/auth/login",
            &json!({"email": "operator@example.com", "password": "nope"}),
        ))
        .await
        .expect("response");
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await["error"], "invalid_credentials");

    let unknown = app
        .oneshot(json_request(
            "/auth/login",
            &json!({"email": "nobody@example.com", "password": "s3cret!"}),
        ))
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(unknown).await["error"], "invalid_credentials");
}

#[tokio::test]
async fn test_me_requires_session() {
    let app = app();
    let anonymous = app
        .clone()
        .oneshot(Request::get("/auth/me").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(anonymous).await["error"], "unauthenticated");

    let cookies = login(&app).await;
    let response = app
        .oneshot(with_cookies("GET", "/auth/me", &cookie_header(&cookies)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["responsibility"], "OPERATOR");
    assert!(body["session"]["expiresAt"].is_string());
}

#[tokio::test]
async fn test_refresh_rotates_cookies() {
    let app = app();
    let original = login(&app).await;

    let response = app
        .clone()
        .oneshot(with_cookies("POST", "/auth/refresh", &cookie_header(&original)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = cookie_pairs(&response);
    assert_eq!(rotated.len(), 2);
    assert_ne!(rotated, original);

    let stale_me = app
        .clone()
        .oneshot(with_cookies("GET", "/auth/me", &cookie_header(&original)))
        .await
        .expect("response");
    assert_eq!(stale_me.status(), StatusCode::UNAUTHORIZED);

    let replay = app
        .clone()
        .oneshot(with_cookies("POST", "/auth/refresh", &cookie_header(&original)))
        .await
        .expect("response");
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(cookie_pairs(&replay).iter().all(|(_, v)| v.is_empty()));

    let fresh_me = app
        .oneshot(with_cookies("GET", "/auth/me", &cookie_header(&rotated)))
        .await
        .expect("response");
    assert_eq!(fresh_me.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_and_always_succeeds() {
    let app = app();
    let cookies = login(&app).await;

    let response = app
        .clone()
        .oneshot(with_cookies("POST", "/auth/logout", &cookie_header(&cookies)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_pairs(&response).iter().all(|(_, v)| v.is_empty()));
    assert_eq!(body_json(response).await["success"], true);

    let me = app
        .clone()
        .oneshot(with_cookies("GET", "/auth/me", &cookie_header(&cookies)))
        .await
        .expect("response");
    assert_eq!(body_json(me).await["error"], "session_revoked");

    let anonymous = app
        .oneshot(Request::post("/auth/logout").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(anonymous.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ability_export() {
    let app = app();
    let cookies = login(&app).await;
    let response = app
        .oneshot(with_cookies("GET", "/auth/ability", &cookie_header(&cookies)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let rules = body["rules"].as_array().expect("rules");
    assert!(rules.iter().any(|rule| rule["action"] == "manage"
        && rule["subject"] == "MaintenanceDaily"
        && rule["conditions"]["companyId"] == "c1"));
    assert!(rules
        .iter()
        .filter(|rule| rule["subject"] != "MaintenanceDaily")
        .all(|rule| rule["action"] == "read"));
}
