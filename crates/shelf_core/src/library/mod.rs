//! Library
//!
//! Book records, the in-memory store holding them, and everything needed to browse them.
pub mod query;
pub mod sorting;
pub mod store;
pub mod types;

pub use store::{LibraryStore, SharedLibrary};
pub use types::{BookRecord, ManualEntry, Rating, ReadingStatus, RecordSource};
