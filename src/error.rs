//! Error types for RowSync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=config, 3=store, 4=fetch, etc.)
//! - Retryability flags for scripted consumers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for RowSync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Config (exit 2)
    NotInitialized,
    AlreadyInitialized,
    ConfigError,
    UnknownKey,

    // Store (exit 3)
    DatabaseError,
    ConnectionError,

    // Fetch (exit 4)
    FetchError,

    // Data quality (exit 5)
    CoercionError,
    MissingUniqueField,

    // I/O (exit 6)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::UnknownKey => "UNKNOWN_KEY",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::FetchError => "FETCH_ERROR",
            Self::CoercionError => "COERCION_ERROR",
            Self::MissingUniqueField => "MISSING_UNIQUE_FIELD",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-6).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::ConfigError
            | Self::UnknownKey => 2,
            Self::DatabaseError | Self::ConnectionError => 3,
            Self::FetchError => 4,
            Self::CoercionError | Self::MissingUniqueField => 5,
            Self::IoError | Self::JsonError => 6,
        }
    }

    /// Whether a consumer can usefully retry the invocation unchanged.
    ///
    /// True for transient transport failures. False for config or
    /// data-quality defects, which need a human first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError | Self::FetchError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in RowSync CLI operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `rowsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown field mapping key: {key}")]
    UnknownKey { key: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store connection failed after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Cannot coerce value {value} for numeric column `{column}`")]
    Coercion { column: String, value: String },

    #[error("Record has no value for unique column `{column}`")]
    MissingUniqueField { column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::UnknownKey { .. } => ErrorCode::UnknownKey,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Connection { .. } => ErrorCode::ConnectionError,
            Self::Fetch(_) => ErrorCode::FetchError,
            Self::Coercion { .. } => ErrorCode::CoercionError,
            Self::MissingUniqueField { .. } => ErrorCode::MissingUniqueField,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `rowsync init` to create the config file, then edit it.".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Config already exists at {}. Use `--force` to overwrite it.",
                path.display()
            )),

            Self::Connection { .. } => Some(
                "Verify the database path in the config exists and is writable.".to_string(),
            ),

            Self::Coercion { column, .. } => Some(format!(
                "The API value does not fit the declared type of column `{column}`. \
                 Check the field mapping in the config against the table schema."
            )),

            Self::MissingUniqueField { column } => Some(format!(
                "Every fetched record must carry the field mapped to `{column}`. \
                 Check the `columns` mapping in the config."
            )),

            Self::UnknownKey { .. } => Some(
                "The key is not present in the `columns` mapping in the config.".to_string(),
            ),

            Self::Config(_)
            | Self::Database(_)
            | Self::Fetch(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(
            Error::Coercion {
                column: "score".to_string(),
                value: "\"n/a\"".to_string()
            }
            .exit_code(),
            5
        );
        assert_eq!(Error::Other("boom".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::NotInitialized;
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "NOT_INITIALIZED");
        assert_eq!(json["error"]["exit_code"], 2);
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_retryable_flags() {
        assert!(ErrorCode::FetchError.is_retryable());
        assert!(ErrorCode::ConnectionError.is_retryable());
        assert!(!ErrorCode::CoercionError.is_retryable());
        assert!(!ErrorCode::ConfigError.is_retryable());
    }
}
