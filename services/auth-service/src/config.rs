//! Configuration for the auth service.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use crate::services::password::PasswordError;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Longest lifetime accepted for either token: ten years.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration values the service refuses to start with.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A token lifetime is zero or longer than [`MAX_TTL_SECONDS`].
    #[error("{field} must be between 1 and {max} seconds, got {value}", max = MAX_TTL_SECONDS)]
    InvalidLifetime {
        /// Offending setting.
        field: &'static str,
        /// Configured value.
        value: u64,
    },
    /// Argon2 rejected the password parameters.
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Auth service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthServiceConfig {
    /// Service configuration.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Session lifetime configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Cookie transport configuration.
    #[serde(default)]
    pub cookie: CookieConfig,
    /// Password hashing configuration.
    #[serde(default)]
    pub password: PasswordConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Service endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Record the first `X-Forwarded-For` entry as the client address.
    ///
    /// Only enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Session lifetime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: u64,
    /// Random bytes per token.
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,
}

/// Cookie transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Cookie carrying the access token.
    #[serde(default = "default_access_cookie")]
    pub access_name: String,
    /// Cookie carrying the refresh token.
    #[serde(default = "default_refresh_cookie")]
    pub refresh_name: String,
    /// Cookie path.
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Send cookies over HTTPS only.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// SameSite attribute.
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

/// Password hashing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    /// Argon2 memory cost in KiB.
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,
    /// Argon2 time cost (iterations).
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    /// Argon2 parallelism factor.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Output hash length in bytes.
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
}

/// Database configuration. Without a URL the service runs on in-memory stores.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Pool acquire timeout in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

// Default value functions
const fn default_port() -> u16 {
    9001
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_access_ttl() -> u64 {
    900 // 15 minutes
}

const fn default_refresh_ttl() -> u64 {
    604_800 // 7 days
}

const fn default_token_bytes() -> usize {
    32
}

fn default_access_cookie() -> String {
    "access_token".to_string()
}

fn default_refresh_cookie() -> String {
    "refresh_token".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

const fn default_secure() -> bool {
    !cfg!(debug_assertions)
}

fn default_same_site() -> String {
    "Lax".to_string()
}

const fn default_memory_cost() -> u32 {
    19456 // OWASP recommended minimum
}

const fn default_time_cost() -> u32 {
    2
}

const fn default_parallelism() -> u32 {
    1
}

const fn default_hash_length() -> usize {
    32
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_acquire_timeout() -> u64 {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_ttl_seconds: default_access_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            token_bytes: default_token_bytes(),
        }
    }
}

impl SessionConfig {
    /// Access token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLifetime`] for zero or more than [`MAX_TTL_SECONDS`].
    pub fn access_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        lifetime("session.access_ttl_seconds", self.access_ttl_seconds)
    }

    /// Refresh token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLifetime`] for zero or more than [`MAX_TTL_SECONDS`].
    pub fn refresh_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        lifetime("session.refresh_ttl_seconds", self.refresh_ttl_seconds)
    }
}

fn lifetime(field: &'static str, value: u64) -> Result<chrono::Duration, ConfigError> {
    if value == 0 || value > MAX_TTL_SECONDS {
        return Err(ConfigError::InvalidLifetime { field, value });
    }
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(ConfigError::InvalidLifetime { field, value })
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_name: default_access_cookie(),
            refresh_name: default_refresh_cookie(),
            path: default_cookie_path(),
            secure: default_secure(),
            same_site: default_same_site(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
            hash_length: default_hash_length(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

impl AuthServiceConfig {
    /// Load configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment().extract().map_err(Box::new)
    }

    /// The provider stack used by [`AuthServiceConfig::load`].
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("AUTH_SERVICE_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthServiceConfig::default();
        assert_eq!(config.service.port, 9001);
        assert_eq!(
            config.session.access_ttl().unwrap(),
            chrono::Duration::minutes(15)
        );
        assert_eq!(config.session.refresh_ttl().unwrap(), chrono::Duration::days(7));
        assert!(!config.service.trust_forwarded_for);
        assert_eq!(config.cookie.access_name, "access_token");
        assert_eq!(config.cookie.same_site, "Lax");
        assert_eq!(config.password.memory_cost, 19456);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AuthServiceConfig = Figment::new()
            .merge(Toml::string(
                "[session]\naccess_ttl_seconds = 60\n[database]\nurl = \"postgres://localhost/auth\"\n",
            ))
            .extract()
            .unwrap();
        assert_eq!(config.session.access_ttl_seconds, 60);
        assert_eq!(config.session.refresh_ttl_seconds, 604_800);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/auth"));
        assert_eq!(config.service.port, 9001);
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        let mut config = SessionConfig {
            access_ttl_seconds: 100_000_000_000_000,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.access_ttl(),
            Err(ConfigError::InvalidLifetime {
                field: "session.access_ttl_seconds",
                ..
            })
        ));

        config.refresh_ttl_seconds = 0;
        assert!(config.refresh_ttl().is_err());

        config.access_ttl_seconds = MAX_TTL_SECONDS;
        assert!(config.access_ttl().is_ok());
    }
}
