//! `shelf_core`
//!
//! Platform-independent logic of Shelf, a personal book tracker: ISBN validation, metadata
//! resolution, the scan session, the in-memory library store, export/import and persistence. Both
//! the command line client and the sync server build on this crate.

pub mod auth;

pub mod export;

pub mod isbn;

pub mod library;

pub mod persistence;

pub mod resolver;

pub mod scan;
