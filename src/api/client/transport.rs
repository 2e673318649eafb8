//! HTTP transport helpers shared by buffered and streamed requests.

use std::time::Duration;

/// Connect timeout applied to every request; body timeouts are per call.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the shared HTTP client.
pub(super) fn build_http_client() -> reqwest::Client {
    // Fall back to reqwest defaults if builder creation fails for any reason.
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Normalize a configured base URL (no trailing slash).
pub(super) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}
