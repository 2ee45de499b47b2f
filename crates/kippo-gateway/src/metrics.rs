//! Gateway counters
//!
//! Emitted through the `metrics` facade; with no recorder installed they are
//! no-ops. Names:
//!
//! - `gateway_requests_total` (counter): labels `status`, `method`
//! - `gateway_refresh_total` (counter): label `outcome`
//! - `gateway_redirects_total` (counter)

/// Record a completed logical request with the status handed to the caller.
pub fn record_request(status: u16, method: &str) {
    metrics::counter!("gateway_requests_total", "status" => status.to_string(), "method" => method.to_string())
        .increment(1);
}

/// Record a settled refresh with its outcome label.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_refresh_total", "outcome" => outcome).increment(1);
}

/// Record an effective redirect to the login route.
pub fn record_redirect() {
    metrics::counter!("gateway_redirects_total").increment(1);
}
