use crate::resolver::errors::ResolverError;
use core::time::Duration;
use reqwest::redirect::Policy;
use reqwest::{ClientBuilder, header};

/// User agent sent with every lookup; Open Library asks clients to identify themselves.
pub const USER_AGENT: &str = concat!("shelf/", env!("CARGO_PKG_VERSION"), " (personal library tracker)");

/// Create the HTTP client shared by all metadata sources.
/// # Errors
/// Fails in case any of the reqwest `ClientBuilder` methods fail
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once per program run"
)]
pub fn build_http_client() -> Result<reqwest::Client, ResolverError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.9"),
    );
    ClientBuilder::new()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(25))
        .redirect(Policy::limited(10))
        .pool_max_idle_per_host(1)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(ResolverError::Client)
}
