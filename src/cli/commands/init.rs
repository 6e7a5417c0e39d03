//! Initialize the RowSync config directory.
//!
//! Writes a starter `config.json` the operator then edits: API endpoint,
//! database path, table, unique column, and the field mapping. The
//! cursor file is created lazily by the first `rowsync run`.

use crate::config::{SyncConfig, global_rowsync_dir};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    path: PathBuf,
    config: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` when a config exists and `force` is not
/// set, or an error if the directory or file cannot be created.
pub fn execute(force: bool, json: bool) -> Result<()> {
    let base_dir = global_rowsync_dir().ok_or_else(|| {
        Error::Config("could not determine the RowSync config directory".to_string())
    })?;
    execute_at(&base_dir, force, json)
}

fn execute_at(base_dir: &Path, force: bool, json: bool) -> Result<()> {
    let config_path = base_dir.join("config.json");
    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: config_path });
    }

    fs::create_dir_all(base_dir)?;
    fs::write(&config_path, SyncConfig::template())?;

    if json {
        let output = InitOutput { path: base_dir.to_path_buf(), config: config_path };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized RowSync configuration");
        println!("  Config: {}", config_path.display());
        println!();
        println!("Next: edit the config with your API endpoint, database path,");
        println!("table, and field mapping, then run 'rowsync run'.");
    }

    Ok(())
}
