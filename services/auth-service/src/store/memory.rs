//! In-process adapters for tests and local development.

use super::{SessionStore, UserDirectory};
use crate::error::StoreError;
use crate::models::{NewSession, RotatedTokens, Session, User, UserId, UserStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Sessions {
    rows: HashMap<Uuid, Session>,
    by_access: HashMap<String, Uuid>,
    by_refresh: HashMap<String, Uuid>,
}

impl Sessions {
    fn digest_taken(&self, access: &str, refresh: &str) -> bool {
        self.by_access.contains_key(access)
            || self.by_refresh.contains_key(refresh)
            || self.by_access.contains_key(refresh)
            || self.by_refresh.contains_key(access)
    }
}

/// Session store held in a single lock; every mutation is one critical section.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<Sessions>>,
}

impl InMemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions ever created, revoked ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Whether no session was ever created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one session row.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.read().rows.get(&id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut sessions = self.inner.write();
        if sessions.digest_taken(&new.access_token_hash, &new.refresh_token_hash) {
            return Err(StoreError::Conflict("token digest already in use".into()));
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            access_token_hash: new.access_token_hash,
            refresh_token_hash: new.refresh_token_hash,
            expires_at: new.expires_at,
            refresh_expires_at: new.refresh_expires_at,
            revoked_at: None,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            created_at: new.created_at,
        };
        sessions
            .by_access
            .insert(session.access_token_hash.clone(), session.id);
        sessions
            .by_refresh
            .insert(session.refresh_token_hash.clone(), session.id);
        sessions.rows.insert(session.id, session.clone());
        drop(sessions);
        Ok(session)
    }

    async fn find_by_access_hash(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        let found = {
            let sessions = self.inner.read();
            sessions
                .by_access
                .get(hash)
                .and_then(|id| sessions.rows.get(id))
                .cloned()
        };
        Ok(found)
    }

    async fn find_by_refresh_hash(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        let found = {
            let sessions = self.inner.read();
            sessions
                .by_refresh
                .get(hash)
                .and_then(|id| sessions.rows.get(id))
                .cloned()
        };
        Ok(found)
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        expected_refresh_hash: &str,
        tokens: RotatedTokens,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.inner.write();

        let Some(current) = sessions.rows.get(&session_id) else {
            return Ok(None);
        };
        let matches: bool = current
            .refresh_token_hash
            .as_bytes()
            .ct_eq(expected_refresh_hash.as_bytes())
            .into();
        if current.is_revoked() || !matches {
            return Ok(None);
        }
        if sessions.digest_taken(&tokens.access_token_hash, &tokens.refresh_token_hash) {
            return Err(StoreError::Conflict("token digest already in use".into()));
        }

        let old_access = current.access_token_hash.clone();
        let old_refresh = current.refresh_token_hash.clone();
        sessions.by_access.remove(&old_access);
        sessions.by_refresh.remove(&old_refresh);
        sessions
            .by_access
            .insert(tokens.access_token_hash.clone(), session_id);
        sessions
            .by_refresh
            .insert(tokens.refresh_token_hash.clone(), session_id);

        let rotated = sessions.rows.get_mut(&session_id).map(|session| {
            session.access_token_hash = tokens.access_token_hash;
            session.refresh_token_hash = tokens.refresh_token_hash;
            session.expires_at = tokens.expires_at;
            session.refresh_expires_at = tokens.refresh_expires_at;
            session.clone()
        });
        drop(sessions);
        Ok(rotated)
    }

    async fn revoke(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut sessions = self.inner.write();
        let revoked = match sessions.rows.get_mut(&session_id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(at);
                true
            }
            _ => false,
        };
        drop(sessions);
        Ok(revoked)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut sessions = self.inner.write();
        let mut revoked = 0;
        for session in sessions
            .rows
            .values_mut()
            .filter(|session| session.user_id == user_id && session.revoked_at.is_none())
        {
            session.revoked_at = Some(at);
            revoked += 1;
        }
        drop(sessions);
        Ok(revoked)
    }
}

/// Identity store backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<DashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Change a user's status. Unknown ids are ignored.
    pub fn set_status(&self, id: UserId, status: UserStatus) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.status = status;
        }
    }

    fn find_active(&self, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .iter()
            .find(|entry| entry.is_active() && predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_active(|user| user.email.eq_ignore_ascii_case(email)))
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_active(|user| user.username.as_deref() == Some(username)))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }
}
