//! SQLite storage layer for RowSync.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode and a busy timeout, since the mirror may share the file
//!   with external readers and writers
//! - Bound parameters for every value; only identifiers are interpolated,
//!   quoted
//! - Bounded connection retries with fixed backoff at startup
//!
//! # Submodules
//!
//! - [`sqlite`] - The `SqliteStore` implementation

pub mod sqlite;

pub use sqlite::SqliteStore;
