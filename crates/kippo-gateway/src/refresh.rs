//! Single-flight access-token refresh
//!
//! At most one refresh call is in flight at a time. The first caller to need
//! a refresh starts it; everyone who asks while it is pending awaits the same
//! shared outcome, so all of them see the same new token or the same failure.
//!
//! State transitions:
//! - Idle → Refreshing (first caller starts the refresh)
//! - Refreshing → Refreshing (later callers join the pending outcome)
//! - Refreshing → Idle (the refresh future settles, before any waiter sees the result)
//!
//! The lock guards only the transition, never the network call.
//!
//! A refresh that settles after the stored session was cleared or replaced
//! still hands its token to the callers that were waiting on it, but does not
//! write it back to storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use kippo_auth::{CredentialStore, RefreshRequest, RefreshResponse};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::transport::{Transport, TransportRequest};

/// New access token, or `None` when the refresh failed for any reason.
pub type RefreshOutcome = Option<Secret<String>>;

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

enum RefreshState {
    Idle,
    Refreshing {
        generation: u64,
        outcome: PendingRefresh,
    },
}

/// Why a refresh produced no token. Never surfaced to callers.
#[derive(Debug, thiserror::Error)]
enum RefreshFailure {
    #[error("no refresh token stored")]
    NoRefreshToken,

    #[error("credential store unavailable: {0}")]
    Storage(String),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh endpoint returned {0}")]
    Rejected(StatusCode),

    #[error("malformed refresh response: {0}")]
    Malformed(String),
}

impl RefreshFailure {
    fn label(&self) -> &'static str {
        match self {
            RefreshFailure::NoRefreshToken => "no_refresh_token",
            RefreshFailure::Storage(_) => "storage_error",
            RefreshFailure::Transport(_) => "transport_error",
            RefreshFailure::Rejected(_) => "rejected",
            RefreshFailure::Malformed(_) => "malformed",
        }
    }
}

pub struct Refresher {
    state: Arc<Mutex<RefreshState>>,
    next_generation: AtomicU64,
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    refresh_url: String,
}

impl Refresher {
    /// `refresh_url` is the already-resolved token refresh target.
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        refresh_url: String,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            next_generation: AtomicU64::new(0),
            transport,
            credentials,
            refresh_url,
        }
    }

    /// Obtain a refreshed access token, joining a pending refresh if there is one.
    pub async fn refreshed_token(&self) -> RefreshOutcome {
        let pending = {
            let mut state = lock(&self.state);
            match &*state {
                RefreshState::Refreshing { generation, outcome } => {
                    debug!(generation, "joining in-flight refresh");
                    outcome.clone()
                }
                RefreshState::Idle => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let outcome = self.start(generation);
                    *state = RefreshState::Refreshing {
                        generation,
                        outcome: outcome.clone(),
                    };
                    debug!(generation, "starting refresh");
                    outcome
                }
            }
        };
        pending.await
    }

    /// Whether a refresh is currently pending.
    pub fn is_refreshing(&self) -> bool {
        matches!(&*lock(&self.state), RefreshState::Refreshing { .. })
    }

    fn start(&self, generation: u64) -> PendingRefresh {
        let state = Arc::clone(&self.state);
        let transport = Arc::clone(&self.transport);
        let credentials = self.credentials.clone();
        let refresh_url = self.refresh_url.clone();
        let epoch = credentials.epoch();

        async move {
            let result =
                request_new_token(transport.as_ref(), &credentials, &refresh_url, epoch).await;
            settle(&state, generation);

            match result {
                Ok(token) => {
                    info!(generation, "access token refreshed");
                    metrics::record_refresh("refreshed");
                    Some(token)
                }
                Err(failure) => {
                    warn!(generation, reason = %failure, "token refresh failed");
                    metrics::record_refresh(failure.label());
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Return to Idle if `generation` is still the pending refresh.
fn settle(state: &Mutex<RefreshState>, generation: u64) {
    let mut state = lock(state);
    if matches!(&*state, RefreshState::Refreshing { generation: g, .. } if *g == generation) {
        *state = RefreshState::Idle;
    }
}

/// POST the stored refresh token and persist the new access token while the
/// session from `epoch` is still current.
async fn request_new_token(
    transport: &dyn Transport,
    credentials: &CredentialStore,
    refresh_url: &str,
    epoch: u64,
) -> Result<Secret<String>, RefreshFailure> {
    let refresh = credentials
        .refresh_token()
        .await
        .map_err(|e| RefreshFailure::Storage(e.to_string()))?
        .ok_or(RefreshFailure::NoRefreshToken)?;

    let body = serde_json::to_vec(&RefreshRequest {
        refresh: refresh.expose(),
    })
    .map_err(|e| RefreshFailure::Malformed(format!("encoding refresh body: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let response = transport
        .send(TransportRequest {
            method: Method::POST,
            url: refresh_url.to_owned(),
            headers,
            body: Some(body.into()),
        })
        .await
        .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

    if !response.status.is_success() {
        return Err(RefreshFailure::Rejected(response.status));
    }

    let token = serde_json::from_slice::<RefreshResponse>(&response.body)
        .map_err(|e| RefreshFailure::Malformed(e.to_string()))?
        .into_token()
        .ok_or_else(|| RefreshFailure::Malformed("response has no access token".into()))?;

    match credentials.set_access_token_if_current(epoch, &token).await {
        Ok(true) => {}
        Ok(false) => info!("session changed during refresh, token not stored"),
        Err(e) => warn!(error = %e, "failed to persist refreshed access token"),
    }
    Ok(token)
}
