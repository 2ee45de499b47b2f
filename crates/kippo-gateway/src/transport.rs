//! Network transport seam
//!
//! The gateway never talks to `reqwest` directly. It hands a fully built
//! `TransportRequest` to a `Transport` and gets status, headers and raw body
//! back. Tests substitute scripted transports; hosts use `ReqwestTransport`.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// One outbound network call.
///
/// `url` is either absolute or a same-origin path; resolving the latter is
/// the transport's job.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Raw network response, body fully read.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>>;

/// Sends requests. Cookies are always included: the session-cookie bootstrap
/// path depends on it.
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// `reqwest`-backed transport with a cookie jar.
///
/// Same-origin targets are resolved against `origin`, playing the role the
/// page origin plays in a browser. Without an origin, only absolute targets
/// can be sent.
pub struct ReqwestTransport {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl ReqwestTransport {
    /// Build a transport with a fresh cookie jar.
    pub fn new(timeout: Duration, origin: Option<Url>) -> Result<Self> {
        Self::with_cookie_jar(Arc::new(Jar::default()), timeout, origin)
    }

    /// Build a transport sharing `jar`, e.g. one pre-seeded with a session cookie.
    pub fn with_cookie_jar(jar: Arc<Jar>, timeout: Duration, origin: Option<Url>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self { client, origin })
    }

    fn target(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let origin = self.origin.as_ref().ok_or_else(|| {
                    Error::InvalidRequest(format!("relative target {url:?} but no origin configured"))
                })?;
                origin
                    .join(url)
                    .map_err(|e| Error::InvalidRequest(format!("invalid target {url:?}: {e}")))
            }
            Err(e) => Err(Error::InvalidRequest(format!("invalid target {url:?}: {e}"))),
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let target = self.target(&request.url)?;
            debug!(method = %request.method, url = %target, "sending request");

            let mut builder = self
                .client
                .request(request.method, target)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| Error::Transport(format!("request failed: {e}")))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
