//! Fixed names shared with the Kippo API and the login view
//!
//! Storage key names match what earlier browser builds of the client wrote, so
//! an exported store keeps working.

/// Storage key for the short-lived bearer token
pub const ACCESS_TOKEN_KEY: &str = "authToken";

/// Storage key for the long-lived refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key for the cached display username
pub const USERNAME_KEY: &str = "username";

/// One-shot flag read and cleared by the login view
pub const SESSION_EXPIRED_KEY: &str = "authExpired";

/// Username/password exchange for a token pair
pub const TOKEN_OBTAIN_PATH: &str = "/api/token/";

/// Refresh-token exchange for a new access token
pub const TOKEN_REFRESH_PATH: &str = "/api/token/refresh/";

/// Session-cookie exchange for a token pair
pub const TOKEN_FROM_SESSION_PATH: &str = "/api/token/from-session/";

/// Current user, authenticated by session cookie or bearer token
pub const CURRENT_USER_PATH: &str = "/api/auth/me/";

/// Any request path containing this is a token endpoint and is never
/// refreshed-and-retried.
pub const TOKEN_ENDPOINT_MARKER: &str = "/api/token/";

/// Route the client is sent to when the session cannot be recovered
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
