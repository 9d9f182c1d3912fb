/// Errors raised while looking up metadata. The resolver logs them and moves on to the next
/// source, so none of them is fatal.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Error during the HTTP request, originating from `reqwest`.
    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The source answered with a non-success status code.
    #[error("source answered with HTTP {0}")]
    Status(u16),
    /// The response body was not the JSON we expected, originating from `serde_json`.
    #[error("failed to decode response: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The response decoded fine but its content is unusable.
    #[error("unusable response: {0}")]
    Parse(String),
}
