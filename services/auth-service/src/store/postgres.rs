//! Postgres adapters.
//!
//! Rotation is one `UPDATE ... WHERE refresh_token_hash = $old AND revoked_at
//! IS NULL RETURNING *`, so the row lock taken by the update serialises
//! concurrent refreshes and only the first one matches.

use super::{SessionStore, UserDirectory};
use crate::error::StoreError;
use crate::models::{
    CompanyId, NewSession, Responsibility, Role, RotatedTokens, Session, User, UserId, UserStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, user_id, access_token_hash, refresh_token_hash, expires_at, \
     refresh_expires_at, revoked_at, user_agent, ip_address, created_at";

const USER_COLUMNS: &str =
    "id, email, username, name, password_hash, status, role, responsibility, company_id";

/// Schema for the sessions table.
pub const SESSIONS_SCHEMA: &str = include_str!("../../migrations/0001_sessions.sql");

/// Open a connection pool.
///
/// # Errors
///
/// Returns an error if the pool cannot be created.
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .map_err(StoreError::from)
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    access_token_hash: String,
    refresh_token_hash: String,
    expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: UserId::from_uuid(row.user_id),
            access_token_hash: row.access_token_hash,
            refresh_token_hash: row.refresh_token_hash,
            expires_at: row.expires_at,
            refresh_expires_at: row.refresh_expires_at,
            revoked_at: row.revoked_at,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: Option<String>,
    name: Option<String>,
    password_hash: String,
    status: String,
    role: Option<String>,
    responsibility: Option<String>,
    company_id: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            username: row.username,
            name: row.name,
            password_hash: row.password_hash,
            status: UserStatus::from_db(&row.status),
            role: row.role.as_deref().and_then(Role::from_db),
            responsibility: row.responsibility.as_deref().and_then(Responsibility::from_db),
            company_id: row.company_id.map(CompanyId::new),
        }
    }
}

/// Session store over the `sessions` table.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the sessions table and indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SESSIONS_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by(&self, column: &str, hash: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {column} = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let sql = format!(
            "INSERT INTO sessions (id, user_id, access_token_hash, refresh_token_hash, \
             expires_at, refresh_expires_at, user_agent, ip_address, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(*new.user_id.as_uuid())
            .bind(new.access_token_hash)
            .bind(new.refresh_token_hash)
            .bind(new.expires_at)
            .bind(new.refresh_expires_at)
            .bind(new.user_agent)
            .bind(new.ip_address)
            .bind(new.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn find_by_access_hash(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        self.find_by("access_token_hash", hash).await
    }

    async fn find_by_refresh_hash(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        self.find_by("refresh_token_hash", hash).await
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        expected_refresh_hash: &str,
        tokens: RotatedTokens,
    ) -> Result<Option<Session>, StoreError> {
        let sql = format!(
            "UPDATE sessions SET access_token_hash = $3, refresh_token_hash = $4, \
             expires_at = $5, refresh_expires_at = $6 \
             WHERE id = $1 AND refresh_token_hash = $2 AND revoked_at IS NULL \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .bind(expected_refresh_hash)
            .bind(tokens.access_token_hash)
            .bind(tokens.refresh_token_hash)
            .bind(tokens.expires_at)
            .bind(tokens.refresh_expires_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    async fn revoke(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
                .bind(session_id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(*user_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Read-only identity lookups over the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate} LIMIT 1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("lower(email) = lower($1) AND status = 'ACTIVE'", email)
            .await
    }

    async fn find_active_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("username = $1 AND status = 'ACTIVE'", username)
            .await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_row_conversion() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "op@example.com".into(),
            username: Some("op".into()),
            name: None,
            password_hash: "$argon2id$x".into(),
            status: "ACTIVE".into(),
            role: Some("USER".into()),
            responsibility: Some("OPERATOR".into()),
            company_id: Some("c1".into()),
        };
        let user = User::from(row);
        assert!(user.is_active());
        assert_eq!(user.role, Some(Role::User));
        assert_eq!(user.responsibility, Some(Responsibility::Operator));
        assert_eq!(user.company_id, Some(CompanyId::new("c1")));
    }

    #[test]
    fn test_schema_has_unique_token_digests() {
        assert!(SESSIONS_SCHEMA.contains("access_token_hash TEXT NOT NULL UNIQUE"));
        assert!(SESSIONS_SCHEMA.contains("refresh_token_hash TEXT NOT NULL UNIQUE"));
    }
}
