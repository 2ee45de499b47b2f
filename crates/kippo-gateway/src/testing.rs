//! Scripted collaborators for unit tests

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::transport::{Transport, TransportFuture, TransportRequest, TransportResponse};

type Handler = Box<dyn Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync>;

/// Answers every request with `handler` and keeps a log of what was sent.
///
/// With a gate, calls to the refresh endpoint wait for a semaphore permit
/// before answering, which holds a refresh in flight while other callers pile up.
pub(crate) struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<TransportRequest>>,
    refresh_gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            refresh_gate: None,
        }
    }

    pub(crate) fn gated(
        gate: Arc<Semaphore>,
        handler: impl Fn(&TransportRequest) -> Result<TransportResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            refresh_gate: Some(gate),
            ..Self::new(handler)
        }
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&TransportRequest) -> bool) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| predicate(r))
            .count()
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.count(is_refresh)
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = self.refresh_gate.as_ref().filter(|_| is_refresh(&request)) {
                gate.acquire().await.expect("refresh gate closed").forget();
            }
            (self.handler)(&request)
        })
    }
}

pub(crate) fn is_refresh(request: &TransportRequest) -> bool {
    request.url.ends_with(kippo_auth::TOKEN_REFRESH_PATH)
}

pub(crate) fn bearer(request: &TransportRequest) -> Option<&str> {
    request
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

pub(crate) fn json_response(status: u16, value: serde_json::Value) -> Result<TransportResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers,
        body: Bytes::from(value.to_string()),
    })
}

pub(crate) fn text_response(status: u16, text: &'static str) -> Result<TransportResponse> {
    Ok(TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::from_static(text.as_bytes()),
    })
}
