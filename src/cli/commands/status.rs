//! Status command: show the cursor and the mirrored table.

use std::path::Path;

use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;

use crate::config::{self, SyncConfig};
use crate::error::Result;
use crate::progress::{ProgressState, ProgressTracker};
use crate::storage::SqliteStore;

#[derive(Serialize)]
struct StatusOutput<'a> {
    api: &'a str,
    table: &'a str,
    unique_column: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a ProgressState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_count: Option<i64>,
}

/// When the cursor file was last rewritten, in local time.
fn cursor_updated(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the row count
/// query fails.
pub fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let path = config::resolve_config_path(config_path)?;
    let config = SyncConfig::load(&path)?;

    let tracker = ProgressTracker::new(config.status_path());
    let cursor = tracker.load();
    let updated = cursor.is_some().then(|| cursor_updated(tracker.path())).flatten();

    // Opening would create an empty database file; only count when the
    // mirror already exists.
    let row_count = if config.database.path.exists() {
        let store = SqliteStore::open(&config.database.path)?;
        Some(store.count_rows(&config.table)?)
    } else {
        None
    };

    if json {
        let output = StatusOutput {
            api: &config.api,
            table: &config.table,
            unique_column: &config.unique_column,
            cursor: cursor.as_ref(),
            cursor_updated: updated,
            row_count,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "Sync Status".bold().underline());
    println!();
    println!("{}", "Source:".blue().bold());
    println!("  API:    {}", config.api);
    println!("{}", "Mirror:".blue().bold());
    println!("  Table:  {} (unique column: {})", config.table, config.unique_column);
    match row_count {
        Some(count) => println!("  Rows:   {count}"),
        None => println!("  Rows:   {}", "database not created yet".dimmed()),
    }
    println!();

    match cursor {
        None => {
            println!("{}", "No sync cursor. Run 'rowsync run' to start.".dimmed());
        }
        Some(state) if state.finished => {
            println!(
                "{} last id {} of range end {}",
                "Finished:".green().bold(),
                state.last_id,
                state.max_id
            );
            println!(
                "{}",
                "Run 'rowsync reset' (or 'rowsync run --start N') to go again.".dimmed()
            );
        }
        Some(state) => {
            let total = state.max_id.saturating_sub(1);
            let percent = if total > 0 {
                (state.last_id as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            println!(
                "{} id {} of {} ({percent:.1}%)",
                "In progress:".yellow().bold(),
                state.last_id,
                total
            );
        }
    }

    if let Some(updated) = updated {
        println!("  {}", format!("last progress {updated}").dimmed());
    }

    Ok(())
}
