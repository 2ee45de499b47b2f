//! Error types for gateway operations
//!
//! Authorization failures are not errors: a 401/403 is a response status the
//! gateway handles. What surfaces here is what the gateway cannot recover.

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("credential store error: {0}")]
    Credentials(#[from] kippo_auth::Error),
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
