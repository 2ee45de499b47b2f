//! Authenticated request gateway
//!
//! Every API call goes through `Gateway::execute`, which:
//! 1. Resolves the target via the configured `Endpoint`
//! 2. Attaches `Authorization: Bearer <access token>` unless the caller brought a token
//! 3. Sends once; anything but 401/403 is decoded and returned
//! 4. On 401/403 (except token endpoints) obtains a refreshed token through the
//!    single-flight `Refresher` and retries exactly once
//! 5. Redirects to login when the refresh fails or the retry is still unauthorized
//!
//! Transport errors on the primary and retried calls propagate to the caller;
//! refresh failures never do.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use common::Secret;
use kippo_auth::{
    CredentialStore, DEFAULT_LOGIN_ROUTE, KeyValueStore, TOKEN_ENDPOINT_MARKER, TOKEN_REFRESH_PATH,
    TokenPair,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::body::ResponseBody;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::metrics;
use crate::navigation::Navigator;
use crate::refresh::Refresher;
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Where requests go and where the user is sent when the session is gone.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: Endpoint,
    pub login_route: String,
}

impl GatewayConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            login_route: DEFAULT_LOGIN_ROUTE.to_owned(),
        }
    }
}

/// One logical API call, as the caller describes it.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    token: Option<Secret<String>>,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a header. Caller headers win over the ones the gateway attaches.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::InvalidRequest(format!("serializing JSON body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body.into());
        Ok(self)
    }

    /// Use this token instead of the stored one for the first attempt.
    pub fn bearer(mut self, token: Secret<String>) -> Self {
        self.token = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn targets_token_endpoint(&self) -> bool {
        self.path.contains(TOKEN_ENDPOINT_MARKER)
    }
}

/// Normalized result of one logical call, however many network calls it took.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub data: ResponseBody,
    pub headers: HeaderMap,
}

impl GatewayResponse {
    fn decode(response: TransportResponse) -> Result<Self> {
        let data = ResponseBody::decode(&response.headers, response.body)?;
        Ok(Self {
            status: response.status,
            data,
            headers: response.headers,
        })
    }
}

pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

pub struct Gateway {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    navigator: Arc<dyn Navigator>,
    endpoint: Endpoint,
    login_route: String,
    refresher: Refresher,
    /// Cleared by the first redirect of an episode; set again when fresh
    /// credentials are stored.
    redirect_armed: AtomicBool,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let credentials = CredentialStore::new(store);
        let refresh_url = config.endpoint.resolve(TOKEN_REFRESH_PATH)?;
        let refresher = Refresher::new(Arc::clone(&transport), credentials.clone(), refresh_url);
        Ok(Self {
            transport,
            credentials,
            navigator,
            endpoint: config.endpoint,
            login_route: config.login_route,
            refresher,
            redirect_armed: AtomicBool::new(true),
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Issue one logical request with transparent credential recovery.
    #[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: OutboundRequest) -> Result<GatewayResponse> {
        let url = self.endpoint.resolve(&request.path)?;

        let token = match &request.token {
            Some(token) => Some(token.clone()),
            None => self.stored_access_token().await,
        };

        let response = self.send(&request, &url, token.as_ref()).await?;
        if !is_auth_failure(response.status) {
            return self.finish(&request, response);
        }

        if request.targets_token_endpoint() {
            debug!(status = %response.status, "token endpoint unauthorized, not refreshing");
            return self.finish(&request, response);
        }

        debug!(status = %response.status, "unauthorized, refreshing access token");
        let Some(new_token) = self.refresher.refreshed_token().await else {
            self.redirect_to_login().await;
            return self.finish(&request, response);
        };

        let retry = self.send(&request, &url, Some(&new_token)).await?;
        let retried = self.finish(&request, retry)?;
        if is_auth_failure(retried.status) {
            warn!(status = %retried.status, "still unauthorized after refresh");
            self.redirect_to_login().await;
        }
        Ok(retried)
    }

    /// Drop all credentials, leave the session-expired notice and navigate to
    /// the login route. Repeated calls within one episode navigate once.
    pub async fn redirect_to_login(&self) {
        if let Err(e) = self.credentials.clear().await {
            warn!(error = %e, "failed to clear credentials");
        }
        if let Err(e) = self.credentials.mark_session_expired().await {
            warn!(error = %e, "failed to set session-expired flag");
        }

        if self.redirect_armed.swap(false, Ordering::AcqRel) {
            info!(route = %self.login_route, "redirecting to login");
            metrics::record_redirect();
            self.navigator.navigate(&self.login_route);
        } else {
            debug!("redirect already issued for this session");
        }
    }

    /// Persist a new token pair and allow the next failure episode to redirect.
    pub(crate) async fn store_session(&self, pair: &TokenPair, username: Option<&str>) -> Result<()> {
        self.credentials.save_pair(pair, username).await?;
        self.redirect_armed.store(true, Ordering::Release);
        Ok(())
    }

    async fn stored_access_token(&self) -> Option<Secret<String>> {
        match self.credentials.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "credential store unavailable, sending without token");
                None
            }
        }
    }

    async fn send(
        &self,
        request: &OutboundRequest,
        url: &str,
        token: Option<&Secret<String>>,
    ) -> Result<TransportResponse> {
        let headers = build_headers(&request.headers, token)?;
        self.transport
            .send(TransportRequest {
                method: request.method.clone(),
                url: url.to_owned(),
                headers,
                body: request.body.clone(),
            })
            .await
    }

    fn finish(&self, request: &OutboundRequest, response: TransportResponse) -> Result<GatewayResponse> {
        metrics::record_request(response.status.as_u16(), request.method.as_str());
        GatewayResponse::decode(response)
    }
}

/// Bearer header first, then caller headers replacing any same-named ones.
fn build_headers(caller: &HeaderMap, token: Option<&Secret<String>>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&token.bearer())
            .map_err(|_| Error::InvalidRequest("access token is not a valid header value".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    for name in caller.keys() {
        headers.remove(name);
    }
    for (name, value) in caller {
        headers.append(name.clone(), value.clone());
    }
    Ok(headers)
}
