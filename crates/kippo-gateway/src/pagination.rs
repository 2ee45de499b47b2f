//! Page-numbered list endpoints
//!
//! List endpoints answer `?page=N` with `{count, next, previous, results}`.
//! `fetch_all_pages` walks pages from 1 until `next` is empty and returns the
//! concatenated `results`.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::{Gateway, OutboundRequest};

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// Collect every item of a paginated listing.
///
/// `path` may already carry query parameters; `page` is appended. A page that
/// is not a 200 JSON listing ends the walk with what was collected so far.
pub async fn fetch_all_pages<T: DeserializeOwned>(gateway: &Gateway, path: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let response = gateway.execute(OutboundRequest::get(page_path(path, page))).await?;
        if response.status != StatusCode::OK {
            debug!(page, status = %response.status, "stopping pagination on non-200 page");
            break;
        }
        let Some(json) = response.data.as_json() else {
            debug!(page, kind = response.data.kind(), "stopping pagination on non-JSON page");
            break;
        };
        if json.get("results").is_none_or(|r| r.is_null()) {
            debug!(page, "stopping pagination on page without results");
            break;
        }

        let parsed: Page<T> = serde_json::from_value(json.clone())
            .map_err(|e| Error::Decode(format!("page {page} of {path}: {e}")))?;
        items.extend(parsed.results);

        if parsed.next.is_none() {
            break;
        }
        page += 1;
    }

    debug!(path, pages = page, items = items.len(), "fetched listing");
    Ok(items)
}

fn page_path(path: &str, page: u32) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}page={page}")
}
