//! Request target resolution
//!
//! With an absolute base URL, only the path and query of the request are kept
//! and appended to the base, so a base with a path component (a reverse-proxy
//! mount) is preserved. Without one, targets stay same-origin relative and get
//! the deployment prefix (e.g. `/prod`) in front.

use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Absolute base, stored without a trailing slash
    Absolute { base: String },
    /// Same-origin; `prefix` is empty or starts with `/` and has no trailing slash
    Relative { prefix: String },
}

impl Endpoint {
    pub fn absolute(base: &str) -> Result<Self> {
        let parsed = Url::parse(base)
            .map_err(|e| Error::InvalidRequest(format!("invalid base URL {base:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::InvalidRequest(format!(
                "base URL {base:?} cannot carry paths"
            )));
        }
        Ok(Endpoint::Absolute {
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    pub fn relative(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_owned()
        } else {
            format!("/{trimmed}")
        };
        Endpoint::Relative { prefix }
    }

    /// Absolute when `base_url` is set, relative under `prefix` otherwise.
    pub fn from_parts(base_url: Option<&str>, prefix: &str) -> Result<Self> {
        match base_url.map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => Self::absolute(base),
            None => Ok(Self::relative(prefix)),
        }
    }

    /// Resolve a request path (optionally with query) to a transport target.
    pub fn resolve(&self, path: &str) -> Result<String> {
        match self {
            Endpoint::Absolute { base } => {
                let base_url = Url::parse(base)
                    .map_err(|e| Error::InvalidRequest(format!("invalid base URL: {e}")))?;
                let joined = base_url
                    .join(path)
                    .map_err(|e| Error::InvalidRequest(format!("invalid path {path:?}: {e}")))?;
                Ok(format!("{base}{}", path_and_query(&joined)))
            }
            Endpoint::Relative { prefix } => {
                Ok(format!("{prefix}{}", normalize_relative(path)?))
            }
        }
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}

/// Path and query of `path` rooted at `/`, fragment dropped. Absolute URLs
/// lose their origin.
fn normalize_relative(path: &str) -> Result<String> {
    match Url::parse(path) {
        Ok(url) => Ok(path_and_query(&url)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let without_fragment = path.split('#').next().unwrap_or("");
            if without_fragment.starts_with('/') {
                Ok(without_fragment.to_owned())
            } else {
                Ok(format!("/{without_fragment}"))
            }
        }
        Err(e) => Err(Error::InvalidRequest(format!("invalid path {path:?}: {e}"))),
    }
}
