//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. A missing config
//! file is not an error; the defaults point at a local development API.

use kippo_auth::DEFAULT_LOGIN_ROUTE;
use kippo_gateway::Endpoint;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the API lives and how to reach it
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Absolute base URL. Empty means same-origin requests under `url_prefix`.
    pub base_url: String,
    pub url_prefix: String,
    /// Origin for same-origin requests; required when `base_url` is empty
    pub origin: Option<String>,
    pub timeout_secs: u64,
    pub login_route: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            url_prefix: String::new(),
            origin: None,
            timeout_secs: 30,
            login_route: DEFAULT_LOGIN_ROUTE.into(),
        }
    }
}

/// Credential persistence
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".kippo-credentials.json"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Overlays:
    /// - `KIPPO_BASE_URL` replaces `api.base_url` (set it empty for same-origin mode)
    /// - `KIPPO_URL_PREFIX` replaces `api.url_prefix`
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(base_url) = std::env::var("KIPPO_BASE_URL") {
            config.api.base_url = base_url.trim().to_owned();
        }
        if let Ok(prefix) = std::env::var("KIPPO_URL_PREFIX") {
            config.api.url_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.is_empty() && !is_http_url(&self.api.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        match &self.api.origin {
            Some(origin) if !is_http_url(origin) => {
                return Err(common::Error::Config(format!(
                    "origin must start with http:// or https://, got: {origin}"
                )));
            }
            None if self.api.base_url.is_empty() => {
                return Err(common::Error::Config(
                    "origin is required when base_url is empty".into(),
                ));
            }
            _ => {}
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Request target resolution for the gateway.
    pub fn endpoint(&self) -> common::Result<Endpoint> {
        let base = Some(self.api.base_url.as_str()).filter(|b| !b.is_empty());
        Endpoint::from_parts(base, &self.api.url_prefix)
            .map_err(|e| common::Error::Config(e.to_string()))
    }

    pub fn origin_url(&self) -> common::Result<Option<Url>> {
        self.api
            .origin
            .as_deref()
            .map(|origin| {
                Url::parse(origin)
                    .map_err(|e| common::Error::Config(format!("invalid origin {origin:?}: {e}")))
            })
            .transpose()
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("kippo.toml")
    }
}

fn is_http_url(value: &str) -> bool {
    (value.starts_with("http://") || value.starts_with("https://")) && Url::parse(value).is_ok()
}
