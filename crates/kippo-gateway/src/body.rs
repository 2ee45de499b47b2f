//! Response body decoding by declared content type

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

use crate::error::{Error, Result};

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    /// Opaque binary payload (e.g. PDF exports)
    Binary(Bytes),
    Text(String),
}

impl ResponseBody {
    /// Decode `body` according to the `content-type` in `headers`.
    ///
    /// `application/json` parses as JSON (an empty body is `null`),
    /// `application/pdf` stays binary, anything else, including a missing or
    /// non-ASCII header, is lossy UTF-8 text.
    pub fn decode(headers: &HeaderMap, body: Bytes) -> Result<Self> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.contains("application/json") {
            if body.is_empty() {
                return Ok(ResponseBody::Json(serde_json::Value::Null));
            }
            return serde_json::from_slice(&body)
                .map(ResponseBody::Json)
                .map_err(|e| Error::Decode(format!("invalid JSON body: {e}")));
        }

        if content_type.contains("application/pdf") {
            return Ok(ResponseBody::Binary(body));
        }

        Ok(ResponseBody::Text(String::from_utf8_lossy(&body).into_owned()))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Json(_) => "json",
            ResponseBody::Binary(_) => "binary",
            ResponseBody::Text(_) => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn json_content_type_parses() {
        let body = ResponseBody::decode(
            &headers("application/json; charset=utf-8"),
            Bytes::from_static(br#"{"count":2,"results":[]}"#),
        )
        .unwrap();
        assert_eq!(body.as_json().unwrap()["count"], 2);
        assert_eq!(body.kind(), "json");
    }

    #[test]
    fn pdf_content_type_stays_binary() {
        let raw = Bytes::from_static(b"%PDF-1.7\n\xff\xfe");
        let body = ResponseBody::decode(&headers("application/pdf"), raw.clone()).unwrap();
        assert_eq!(body.as_bytes(), Some(&raw));
    }

    #[test]
    fn other_content_types_are_text() {
        let body =
            ResponseBody::decode(&headers("text/html"), Bytes::from_static(b"<p>ok</p>")).unwrap();
        assert_eq!(body.as_text(), Some("<p>ok</p>"));

        let body = ResponseBody::decode(&HeaderMap::new(), Bytes::from_static(b"plain")).unwrap();
        assert_eq!(body, ResponseBody::Text("plain".into()));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let result =
            ResponseBody::decode(&headers("application/json"), Bytes::from_static(b"{oops"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn empty_json_body_is_null() {
        let body = ResponseBody::decode(&headers("application/json"), Bytes::new()).unwrap();
        assert_eq!(body.as_json(), Some(&serde_json::Value::Null));
    }
}
