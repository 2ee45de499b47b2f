//! Navigation seam for the redirect-to-login side effect

use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// Moves the client to another route, abandoning in-flight view state.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Records every navigation. Hosts that poll for a redirect, and tests,
/// read it back.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_owned());
    }
}

/// Terminal hosts have no router; the redirect becomes a log event.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        warn!(route, "session expired, sign in again");
    }
}
