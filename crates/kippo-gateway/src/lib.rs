//! Authenticated request gateway for the Kippo requirements API
//!
//! Sits between API callers and the network: attaches the stored bearer
//! token, decodes bodies by content type, and recovers from expired access
//! tokens with a single shared refresh and one retry. When recovery is not
//! possible it clears credentials and sends the user to the login route,
//! once per episode.
//!
//! Collaborators are traits so hosts pick the concrete pieces:
//! - `Transport`: `ReqwestTransport` in production
//! - `KeyValueStore`: `FileStore` / `MemoryStore` from `kippo-auth`
//! - `Navigator`: `LogNavigator` for terminal hosts, `RecordingNavigator` for polling hosts

pub mod body;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod navigation;
pub mod pagination;
pub mod refresh;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use body::ResponseBody;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayConfig, GatewayResponse, OutboundRequest};
pub use navigation::{LogNavigator, Navigator, RecordingNavigator};
pub use pagination::fetch_all_pages;
pub use refresh::{RefreshOutcome, Refresher};
pub use session::SessionUser;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
