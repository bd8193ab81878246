//! Postgres adapter behavior against a live database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use auth_service::models::{NewSession, RotatedTokens};
use auth_service::store::{postgres, PgSessionStore};
use auth_service::{SessionStore, TokenCodec, UserId};
use chrono::{Duration, Utc};
use std::sync::Arc;

async fn store() -> PgSessionStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = postgres::connect(&url, 16, std::time::Duration::from_secs(5))
        .await
        .expect("connect");
    let store = PgSessionStore::new(pool);
    store.ensure_schema().await.expect("schema");
    store
}

fn digest() -> String {
    TokenCodec::hash(&TokenCodec::new().generate())
}

fn new_session() -> NewSession {
    let now = Utc::now();
    NewSession {
        user_id: UserId::new(),
        access_token_hash: digest(),
        refresh_token_hash: digest(),
        expires_at: now + Duration::minutes(15),
        refresh_expires_at: now + Duration::days(7),
        user_agent: Some("integration".into()),
        ip_address: None,
        created_at: now,
    }
}

fn rotated() -> RotatedTokens {
    let now = Utc::now();
    RotatedTokens {
        access_token_hash: digest(),
        refresh_token_hash: digest(),
        expires_at: now + Duration::minutes(15),
        refresh_expires_at: now + Duration::days(7),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_rotation_has_one_winner() {
    let store = Arc::new(store().await);
    let session = store.create(new_session()).await.expect("create");
    let id = session.id;
    let old_refresh = session.refresh_token_hash.clone();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let expected = old_refresh.clone();
        handles.push(tokio::spawn(async move {
            store.rotate(id, &expected, rotated()).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(rotated) = handle.await.expect("join").expect("rotate") {
            winners.push(rotated);
        }
    }
    assert_eq!(winners.len(), 1);

    assert!(store
        .find_by_refresh_hash(&old_refresh)
        .await
        .expect("lookup")
        .is_none());
    let current = store
        .find_by_refresh_hash(&winners[0].refresh_token_hash)
        .await
        .expect("lookup")
        .expect("rotated session");
    assert_eq!(current.id, id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_revoke_is_set_once_and_blocks_rotation() {
    let store = store().await;
    let session = store.create(new_session()).await.expect("create");

    assert!(store.revoke(session.id, Utc::now()).await.expect("revoke"));
    assert!(!store.revoke(session.id, Utc::now()).await.expect("revoke"));
    assert!(store
        .rotate(session.id, &session.refresh_token_hash, rotated())
        .await
        .expect("rotate")
        .is_none());
}
