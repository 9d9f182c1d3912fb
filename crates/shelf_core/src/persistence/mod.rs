//! Persistence
//!
//! The library store itself is purely in-memory. A backend keeps whole libraries under a key and
//! only offers get-all/set-all; `set` replaces the stored array and is idempotent.
pub mod remote;
pub mod sqlite;

use crate::library::types::BookRecord;
use async_trait::async_trait;

/// Key under which a user's library is stored unless configured otherwise.
pub const DEFAULT_LIBRARY_KEY: &str = "books";

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The shared backend rejected the credential; the user has to log in again.
    #[error("not authorized, please log in again")]
    Unauthorized,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered with HTTP {0}")]
    Status(u16),

    #[error("failed to encode record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A stored row does not form a valid record.
    #[error("invalid stored record {isbn}: {reason}")]
    Corrupt { isbn: String, reason: String },
}

/// Where libraries live between runs.
#[async_trait]
pub trait LibraryBackend: Send + Sync {
    /// All records stored under `key`, in display order. Unknown keys yield an empty library.
    async fn get(&self, key: &str) -> Result<Vec<BookRecord>, StoreError>;

    /// Replaces everything stored under `key` with `books`.
    async fn set(&self, key: &str, books: &[BookRecord]) -> Result<(), StoreError>;
}
