use shelf_core::auth::AuthError;
use shelf_core::export::ExportError;
use shelf_core::persistence::StoreError;
use shelf_core::resolver::errors::ResolverError;

/// The error type of the command line client
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Loading or saving the library failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    /// Setting up the metadata lookup failed
    #[error("Lookup error: {0}")]
    Resolver(#[from] ResolverError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    #[error("Invalid login: {0}")]
    Auth(#[from] AuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Config(#[from] serde_json::Error),
    #[error("`{0}` is not a valid ISBN-13")]
    InvalidIsbn(String),
    #[error("No book with ISBN {0} in the library")]
    UnknownBook(String),
    /// Wildcard error for everything else
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the sync server rejected the saved credential.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unauthorized))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("Background task failed: {err}"))
    }
}
