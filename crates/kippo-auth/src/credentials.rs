//! Typed access to the persisted session
//!
//! `CredentialStore` owns the key names and the "empty means absent" rule so
//! nothing else touches raw storage keys. It is cheap to clone and shares the
//! underlying `KeyValueStore`.
//!
//! Clones also share an epoch counter that moves whenever the stored session
//! is replaced or cleared. Writers that started under an older session check
//! it so they never resurrect credentials the user already dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use tracing::debug;

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_EXPIRED_KEY, USERNAME_KEY};
use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::token::TokenPair;

#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    epoch: Arc<AtomicU64>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current session epoch. Changes on `save_pair` and `clear`.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub async fn access_token(&self) -> Result<Option<Secret<String>>> {
        Ok(self.non_empty(ACCESS_TOKEN_KEY).await?.map(Secret::new))
    }

    pub async fn refresh_token(&self) -> Result<Option<Secret<String>>> {
        Ok(self.non_empty(REFRESH_TOKEN_KEY).await?.map(Secret::new))
    }

    pub async fn username(&self) -> Result<Option<String>> {
        self.non_empty(USERNAME_KEY).await
    }

    /// Persist a freshly issued pair. A pair without a refresh token leaves
    /// any stored refresh token in place.
    pub async fn save_pair(&self, pair: &TokenPair, username: Option<&str>) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.store
            .set(ACCESS_TOKEN_KEY, pair.access.expose().clone())
            .await?;
        if let Some(refresh) = &pair.refresh {
            self.store
                .set(REFRESH_TOKEN_KEY, refresh.expose().clone())
                .await?;
        }
        if let Some(username) = username {
            self.store.set(USERNAME_KEY, username.to_owned()).await?;
        }
        debug!(has_refresh = pair.refresh.is_some(), "saved token pair");
        Ok(())
    }

    /// Overwrite the access token after a refresh.
    pub async fn set_access_token(&self, token: &Secret<String>) -> Result<()> {
        self.store
            .set(ACCESS_TOKEN_KEY, token.expose().clone())
            .await
    }

    /// Overwrite the access token only if the session is still the one from
    /// `epoch`. Returns whether the token was written.
    pub async fn set_access_token_if_current(
        &self,
        epoch: u64,
        token: &Secret<String>,
    ) -> Result<bool> {
        if self.epoch() != epoch {
            debug!(epoch, current = self.epoch(), "session changed, not storing token");
            return Ok(false);
        }
        self.set_access_token(token).await?;
        Ok(true)
    }

    /// Drop access token, refresh token and cached username.
    ///
    /// Every key is attempted even if an earlier removal fails; the first
    /// error is returned.
    pub async fn clear(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut first_err = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USERNAME_KEY] {
            if let Err(e) = self.store.remove(key).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn mark_session_expired(&self) -> Result<()> {
        self.store.set(SESSION_EXPIRED_KEY, "true".into()).await
    }

    /// Read and clear the session-expired flag.
    pub async fn take_session_expired(&self) -> Result<bool> {
        let flagged = self.store.get(SESSION_EXPIRED_KEY).await?.as_deref() == Some("true");
        if flagged {
            self.store.remove(SESSION_EXPIRED_KEY).await?;
        }
        Ok(flagged)
    }

    async fn non_empty(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(key).await?.filter(|v| !v.is_empty()))
    }
}
