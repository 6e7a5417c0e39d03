//! Configuration management.
//!
//! RowSync is driven by a single JSON config file describing the API
//! endpoint, the target table, and the field mapping between API field
//! names and table columns. The default location is
//! `~/.rowsync/config.json`; `--config` or `ROWSYNC_CONFIG` override it.
//!
//! The field mapping must be a bijection: one store column per external
//! key and vice versa. Violations are rejected when the config loads,
//! before any network or database work starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Inter-fetch delay applied when the config does not set one.
const DEFAULT_DELAY_SECS: f64 = 2.0;

/// Store connection attempts before giving up at startup.
const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Fixed backoff between store connection attempts.
const DEFAULT_CONNECT_BACKOFF_SECS: f64 = 2.0;

/// Top-level sync configuration, deserialized from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Base URL of the record API; ids are appended as path segments.
    pub api: String,

    /// Where to learn the current maximum id when no cursor exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryConfig>,

    /// The SQLite database holding the mirrored table.
    pub database: DatabaseConfig,

    /// Table to mirror into.
    pub table: String,

    /// Column that uniquely identifies a record (matched to the API id field).
    pub unique_column: String,

    /// External field name to store column name.
    pub columns: BTreeMap<String, String>,

    /// Seconds to wait after every fetch, successful or not.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Optional webhook receiving status notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,

    /// What to do when a record value cannot be coerced to its column type.
    #[serde(default)]
    pub on_coercion_error: CoercionPolicy,

    /// Store connection attempts before aborting at startup.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Seconds between store connection attempts.
    #[serde(default = "default_connect_backoff_secs")]
    pub connect_backoff_secs: f64,

    /// Cursor file location; defaults to `status.json` next to the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_path: Option<PathBuf>,
}

/// One-shot endpoint resolving the current maximum known id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// URL returning a JSON document that contains the maximum id.
    pub url: String,
    /// JSON pointer to the maximum id within the response, e.g. `/results/0/id`.
    pub pointer: String,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Policy for records whose values do not fit their column types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    /// Stop the run; the cursor stays at the last good id.
    #[default]
    Abort,
    /// Skip the record, advance the cursor, keep going.
    Skip,
}

fn default_delay_secs() -> f64 {
    DEFAULT_DELAY_SECS
}

fn default_connect_retries() -> u32 {
    DEFAULT_CONNECT_RETRIES
}

fn default_connect_backoff_secs() -> f64 {
    DEFAULT_CONNECT_BACKOFF_SECS
}

impl SyncConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if the file does not exist, `Config` if it cannot
    /// be parsed or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotInitialized);
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` on empty required fields, a non-bijective field
    /// mapping, an unmapped unique column, or a bad delay.
    pub fn validate(&self) -> Result<()> {
        if self.api.trim().is_empty() {
            return Err(Error::Config("`api` must not be empty".to_string()));
        }
        if self.table.trim().is_empty() {
            return Err(Error::Config("`table` must not be empty".to_string()));
        }
        if self.unique_column.trim().is_empty() {
            return Err(Error::Config("`uniqueColumn` must not be empty".to_string()));
        }
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err(Error::Config(format!(
                "`delaySecs` must be a non-negative number, got {}",
                self.delay_secs
            )));
        }
        let map = self.field_map()?;
        if map.to_external_key(&self.unique_column).is_err() {
            return Err(Error::Config(format!(
                "unique column `{}` is not a target of the `columns` mapping",
                self.unique_column
            )));
        }
        Ok(())
    }

    /// Build the validated field mapping.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the mapping is not a bijection.
    pub fn field_map(&self) -> Result<FieldMap> {
        FieldMap::new(&self.columns)
    }

    /// The inter-fetch delay as a `Duration`.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    /// Backoff between store connection attempts.
    #[must_use]
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.connect_backoff_secs.max(0.0))
    }

    /// Resolve the cursor file path.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.status_path.clone().unwrap_or_else(default_status_path)
    }

    /// Starter config written by `rowsync init`.
    #[must_use]
    pub fn template() -> &'static str {
        r#"{
  "api": "https://api.example.com/records",
  "discovery": {
    "url": "https://api.example.com/records?orderBy=id&sort=desc&limit=1",
    "pointer": "/results/0/id"
  },
  "database": { "path": "rowsync.db" },
  "table": "records",
  "uniqueColumn": "id",
  "columns": {
    "id": "id",
    "title": "title",
    "score": "score"
  },
  "delaySecs": 2.0
}
"#
    }
}

/// Bidirectional mapping between API field names and store columns.
///
/// Both directions are unique; duplicate targets in either direction are
/// a configuration error.
#[derive(Debug, Clone)]
pub struct FieldMap {
    external_to_column: BTreeMap<String, String>,
    column_to_external: BTreeMap<String, String>,
}

impl FieldMap {
    /// Build the map, verifying the bijection.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the mapping is empty or a store column is
    /// the target of more than one external key.
    pub fn new(columns: &BTreeMap<String, String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Config("`columns` mapping must not be empty".to_string()));
        }
        let mut column_to_external = BTreeMap::new();
        for (external, column) in columns {
            if let Some(previous) = column_to_external.insert(column.clone(), external.clone()) {
                return Err(Error::Config(format!(
                    "store column `{column}` is mapped from both `{previous}` and `{external}`"
                )));
            }
        }
        Ok(Self {
            external_to_column: columns.clone(),
            column_to_external,
        })
    }

    /// Store column for an external field name.
    ///
    /// # Errors
    ///
    /// `UnknownKey` if the field is not mapped.
    pub fn to_store_column(&self, external: &str) -> Result<&str> {
        self.external_to_column
            .get(external)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownKey { key: external.to_string() })
    }

    /// External field name for a store column.
    ///
    /// # Errors
    ///
    /// `UnknownKey` if the column is not mapped.
    pub fn to_external_key(&self, column: &str) -> Result<&str> {
        self.column_to_external
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownKey { key: column.to_string() })
    }

    /// Mapped store columns, in name order.
    pub fn store_columns(&self) -> impl Iterator<Item = &str> {
        self.column_to_external.keys().map(String::as_str)
    }

    /// Number of mapped fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.external_to_column.len()
    }

    /// True when nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.external_to_column.is_empty()
    }
}

/// Get the global RowSync directory location.
///
/// `ROWSYNC_HOME` overrides the default `~/.rowsync/` (useful for tests
/// and for running several mirrors side by side).
#[must_use]
pub fn global_rowsync_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("ROWSYNC_HOME") {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".rowsync"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. Explicit `--config` flag
/// 2. `ROWSYNC_CONFIG` environment variable
/// 3. Global location: `~/.rowsync/config.json`
///
/// # Errors
///
/// Returns `Config` if no home directory can be determined.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("ROWSYNC_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    global_rowsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("could not determine the RowSync config directory".to_string()))
}

/// Default cursor file location: `status.json` in the global directory.
#[must_use]
pub fn default_status_path() -> PathBuf {
    global_rowsync_dir()
        .map(|dir| dir.join("status.json"))
        .unwrap_or_else(|| PathBuf::from("status.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> BTreeMap<String, String> {
        let mut columns = BTreeMap::new();
        columns.insert("mal_id".to_string(), "id".to_string());
        columns.insert("title".to_string(), "title".to_string());
        columns.insert("score".to_string(), "score".to_string());
        columns
    }

    fn sample_config() -> SyncConfig {
        SyncConfig {
            api: "https://api.example.com/anime".to_string(),
            discovery: None,
            database: DatabaseConfig { path: PathBuf::from("test.db") },
            table: "anime".to_string(),
            unique_column: "id".to_string(),
            columns: sample_columns(),
            delay_secs: 0.0,
            webhook: None,
            on_coercion_error: CoercionPolicy::default(),
            connect_retries: 1,
            connect_backoff_secs: 0.0,
            status_path: None,
        }
    }

    #[test]
    fn test_field_map_round_trip() {
        let map = FieldMap::new(&sample_columns()).unwrap();
        assert_eq!(map.to_store_column("mal_id").unwrap(), "id");
        assert_eq!(map.to_external_key("id").unwrap(), "mal_id");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_field_map_unknown_key() {
        let map = FieldMap::new(&sample_columns()).unwrap();
        assert!(matches!(
            map.to_store_column("nope"),
            Err(Error::UnknownKey { .. })
        ));
        assert!(matches!(
            map.to_external_key("nope"),
            Err(Error::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_field_map_rejects_duplicate_target() {
        let mut columns = sample_columns();
        columns.insert("english_title".to_string(), "title".to_string());
        assert!(matches!(FieldMap::new(&columns), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_mapped_unique_column() {
        let mut config = sample_config();
        config.unique_column = "uuid".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_delay() {
        let mut config = sample_config();
        config.delay_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_template_parses_and_validates() {
        let config: SyncConfig = serde_json::from_str(SyncConfig::template()).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.discovery.is_some());
    }

    #[test]
    fn test_load_missing_file_is_not_initialized() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = SyncConfig::load(&dir.path().join("config.json"));
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SyncConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_status_path_defaults_next_to_config_dir() {
        let config = sample_config();
        assert!(config.status_path().ends_with("status.json"));
    }
}
