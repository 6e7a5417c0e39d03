//! RowSync CLI - Incremental API-to-database record mirroring
//!
//! This crate walks a numeric id range on a remote HTTP API, fetches each
//! record, and reconciles it against a SQLite table: insert when absent,
//! update only the columns that actually changed, skip when identical.
//! A persisted cursor makes multi-hour runs resumable after a crash.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - JSON configuration and the field mapping
//! - [`model`] - Value and schema types shared across the pipeline
//! - [`normalize`] - Coercion of raw API records into column values
//! - [`reconcile`] - Field-by-field comparison against the stored row
//! - [`upsert`] - Verified insert/update execution
//! - [`progress`] - The persisted `{finished, lastId, maxId}` cursor
//! - [`driver`] - The sequential fetch/reconcile/write loop
//! - [`fetch`] - HTTP record fetch and id-range discovery
//! - [`notify`] - Webhook status notifications
//! - [`storage`] - SQLite access layer
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod progress;
pub mod reconcile;
pub mod storage;
pub mod upsert;

pub use error::{Error, Result};
