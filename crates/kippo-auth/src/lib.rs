//! Credential persistence for the Kippo requirements API
//!
//! Holds the access/refresh token pair and the small amount of session state
//! the client keeps between runs. The key-value store is a trait so hosts can
//! plug in whatever persistence they have; `MemoryStore` and `FileStore` are
//! provided.
//!
//! Credential lifecycle:
//! 1. Login or session exchange yields a `TokenPair`, saved via `CredentialStore::save_pair()`
//! 2. A successful refresh overwrites the access token via `CredentialStore::set_access_token()`
//! 3. Logout or an unrecoverable refresh failure calls `CredentialStore::clear()`
//! 4. The redirect path sets the one-shot expired flag; the login view takes it once

pub mod constants;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::CredentialStore;
pub use error::{Error, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreFuture};
pub use token::{CurrentUser, RefreshRequest, RefreshResponse, TokenObtainRequest, TokenPair};
