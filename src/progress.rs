//! The persisted sync cursor.
//!
//! A small JSON document `{finished, lastId, maxId}` is the sole source
//! of truth for where a run left off; the mirrored table itself is never
//! consulted to infer progress. The file is rewritten after every
//! processed id with a temp-file-and-rename so a crash mid-write can
//! never leave a torn cursor behind.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Iteration progress: the last completed id and the range bound.
///
/// `last_id` is the last id whose processing finished; a run resumes at
/// `last_id + 1` and stops before `max_id`. Serialized camelCase to stay
/// compatible with cursor files written by earlier deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub finished: bool,
    pub last_id: u64,
    pub max_id: u64,
}

impl ProgressState {
    /// A fresh cursor.
    ///
    /// With a `start` override the first processed id is `start` itself;
    /// without one, iteration begins at id 1.
    #[must_use]
    pub fn fresh(start: Option<u64>, max_id: u64) -> Self {
        Self {
            finished: false,
            last_id: start.map_or(0, |s| s.saturating_sub(1)),
            max_id,
        }
    }

    /// First id the next iteration will process.
    #[must_use]
    pub const fn next_id(&self) -> u64 {
        self.last_id + 1
    }
}

/// Reads and writes the cursor file.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    /// Track the cursor at the given path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Cursor file location.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read the persisted cursor.
    ///
    /// Returns `None` when the file is absent, empty, or malformed; the
    /// caller reinitializes in that case rather than failing.
    #[must_use]
    pub fn load(&self) -> Option<ProgressState> {
        let content = fs::read_to_string(&self.path).ok()?;
        if content.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("cursor file {} unusable: {e}", self.path.display());
                None
            }
        }
    }

    /// Persist the cursor.
    ///
    /// Writes to a temp file and renames it over the target so readers
    /// and a crashed writer never see a partial document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, state: &ProgressState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Delete the cursor file. Returns whether a file existed.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
