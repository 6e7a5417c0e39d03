//! Reset command: delete the saved cursor.
//!
//! The cursor going away is what re-arms a finished range; the mirrored
//! data itself is left untouched.

use std::path::Path;

use serde::Serialize;

use crate::config::{self, SyncConfig};
use crate::error::Result;
use crate::progress::ProgressTracker;

#[derive(Serialize)]
struct ResetOutput {
    removed: bool,
}

/// Execute the reset command.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the cursor file
/// cannot be removed.
pub fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let path = config::resolve_config_path(config_path)?;
    let config = SyncConfig::load(&path)?;

    let tracker = ProgressTracker::new(config.status_path());
    let removed = tracker.clear()?;

    if json {
        println!("{}", serde_json::to_string(&ResetOutput { removed })?);
    } else if removed {
        println!("Cursor removed: {}", tracker.path().display());
        println!("The next 'rowsync run' starts fresh.");
    } else {
        println!("No cursor to remove.");
    }

    Ok(())
}
