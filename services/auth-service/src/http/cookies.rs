//! Bearer cookie transport.

use crate::config::CookieConfig;
use crate::services::IssuedTokens;
use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// SameSite cookie policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    /// Strict same-site policy
    Strict,
    /// Lax same-site policy (recommended)
    #[default]
    Lax,
    /// No same-site restriction (requires Secure)
    None,
}

impl SameSite {
    /// Convert to cookie attribute string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    /// Parse a config value; unknown values fall back to `Lax`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Self::Strict,
            "none" => Self::None,
            _ => Self::Lax,
        }
    }
}

/// Attributes shared by the access and refresh cookies.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    /// Access token cookie name.
    pub access_name: String,
    /// Refresh token cookie name.
    pub refresh_name: String,
    /// Cookie path.
    pub path: String,
    /// HTTPS only.
    pub secure: bool,
    /// SameSite policy.
    pub same_site: SameSite,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self::from(&CookieConfig::default())
    }
}

impl From<&CookieConfig> for CookieSettings {
    fn from(config: &CookieConfig) -> Self {
        Self {
            access_name: config.access_name.clone(),
            refresh_name: config.refresh_name.clone(),
            path: config.path.clone(),
            secure: config.secure,
            same_site: SameSite::parse(&config.same_site),
        }
    }
}

impl CookieSettings {
    /// Access token from the request cookies.
    #[must_use]
    pub fn access_token(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.access_name)
    }

    /// Refresh token from the request cookies.
    #[must_use]
    pub fn refresh_token(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.refresh_name)
    }

    /// Append both token cookies, each expiring with its token.
    pub fn set_tokens(&self, headers: &mut HeaderMap, tokens: &IssuedTokens, now: DateTime<Utc>) {
        let access = self.cookie(&self.access_name, &tokens.access_token, tokens.expires_at, now);
        let refresh = self.cookie(
            &self.refresh_name,
            &tokens.refresh_token,
            tokens.refresh_expires_at,
            now,
        );
        append(headers, &access);
        append(headers, &refresh);
    }

    /// Append expired, empty versions of both cookies.
    pub fn clear_tokens(&self, headers: &mut HeaderMap) {
        append(headers, &self.cleared(&self.access_name));
        append(headers, &self.cleared(&self.refresh_name));
    }

    fn cookie(&self, name: &str, value: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let max_age = (expires_at - now).num_seconds().max(0);
        let expires = httpdate::fmt_http_date(SystemTime::from(expires_at));
        self.with_flags(format!(
            "{name}={value}; Path={}; Expires={expires}; Max-Age={max_age}; SameSite={}",
            self.path,
            self.same_site.as_str()
        ))
    }

    fn cleared(&self, name: &str) -> String {
        self.with_flags(format!(
            "{name}=; Path={}; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; SameSite={}",
            self.path,
            self.same_site.as_str()
        ))
    }

    fn with_flags(&self, mut cookie: String) -> String {
        cookie.push_str("; HttpOnly");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn append(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Find a cookie by name across all `Cookie` headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
