//! Token endpoint payloads
//!
//! The Kippo API issues SimpleJWT-style pairs: `POST /api/token/` with
//! username/password returns `{access, refresh}`, and `POST /api/token/refresh/`
//! with `{refresh}` returns `{access}`. Both tokens are opaque to the client.

use common::Secret;
use serde::{Deserialize, Serialize};

/// Body of the refresh call.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response of the refresh call. Anything beyond `access` is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
}

impl RefreshResponse {
    /// The new access token, if the server returned a usable one.
    pub fn into_token(self) -> Option<Secret<String>> {
        self.access.filter(|a| !a.is_empty()).map(Secret::new)
    }
}

/// Body of the username/password exchange.
#[derive(Serialize)]
pub struct TokenObtainRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl std::fmt::Debug for TokenObtainRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenObtainRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Access/refresh pair from login or the session exchange.
///
/// `refresh` is optional because login tolerates its absence; the session
/// exchange requires both.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

impl TokenPair {
    /// Parse a pair from a decoded JSON body, rejecting empty tokens.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let access = value.get("access")?.as_str().filter(|a| !a.is_empty())?;
        let refresh = value
            .get("refresh")
            .and_then(|r| r.as_str())
            .filter(|r| !r.is_empty())
            .map(Secret::from);
        Some(Self {
            access: Secret::from(access),
            refresh,
        })
    }
}

/// `/api/auth/me/` response, only the field the client reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub username: Option<String>,
}

impl CurrentUser {
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Username when present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }
}
