//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    sqlite: &'a str,
}

/// Execute the version command.
///
/// Reports the bundled SQLite library version alongside the crate's,
/// since mirror behavior can depend on it.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let sqlite = rusqlite::version();

    if json {
        let output = VersionOutput { version, build, sqlite };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("rowsync version {version} ({build}), SQLite {sqlite}");
    Ok(())
}
