//! Run command: the sync loop itself.
//!
//! Wires the real collaborators together (HTTP fetcher, SQLite store,
//! cursor file, optional webhook) and drives the loop on a tokio
//! runtime. The loop body is synchronous in spirit: one id at a time,
//! with the configured delay after every fetch.

use std::path::Path;

use colored::Colorize;
use tracing::info;

use crate::config::{self, SyncConfig};
use crate::driver::{Driver, RunSummary};
use crate::error::{Error, Result};
use crate::fetch::HttpFetcher;
use crate::notify::{Notifier, NullNotifier, WebhookNotifier};
use crate::progress::ProgressTracker;
use crate::storage::SqliteStore;

/// Execute the run command.
///
/// # Errors
///
/// Returns config, store, fetch, or data errors from setup and from the
/// loop; the cursor keeps the last completed id either way.
pub fn execute(
    config_path: Option<&Path>,
    start: Option<u64>,
    max: Option<u64>,
    delay: Option<f64>,
    json: bool,
) -> Result<()> {
    let path = config::resolve_config_path(config_path)?;
    let mut config = SyncConfig::load(&path)?;
    if let Some(delay) = delay {
        if !delay.is_finite() || delay < 0.0 {
            return Err(Error::Config(format!(
                "--delay must be a non-negative number, got {delay}"
            )));
        }
        info!("using custom delay of {delay}s");
        config.delay_secs = delay;
    }

    let store = SqliteStore::open_with_retry(
        &config.database.path,
        config.connect_retries,
        config.connect_backoff(),
    )?;
    let tracker = ProgressTracker::new(config.status_path());
    let fetcher = HttpFetcher::new(&config.api, config.discovery.clone());

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("failed to create async runtime: {e}")))?;

    let summary = match config.webhook.clone() {
        Some(url) => {
            let driver = Driver::new(&config, store, tracker, fetcher, WebhookNotifier::new(&url))?;
            launch(&rt, &driver, start, max)?
        }
        None => {
            let driver = Driver::new(&config, store, tracker, fetcher, NullNotifier)?;
            launch(&rt, &driver, start, max)?
        }
    };

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn launch<N: Notifier>(
    rt: &tokio::runtime::Runtime,
    driver: &Driver<HttpFetcher, N>,
    start: Option<u64>,
    max: Option<u64>,
) -> Result<RunSummary> {
    rt.block_on(driver.run(start, max))
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "Sync Run".bold().underline());
    println!();

    if summary.fetched == 0 && summary.finished {
        println!("{}", "Range already finished; nothing fetched.".green());
        println!(
            "{}",
            "Run 'rowsync reset' (or 'rowsync run --start N') to go again.".dimmed()
        );
        return;
    }

    println!("  Fetches:    {}", summary.fetched);
    if summary.retries > 0 {
        println!("  Retries:    {}", summary.retries);
    }
    println!("  Inserted:   {}", summary.inserted.to_string().green());
    println!("  Updated:    {}", summary.updated.to_string().yellow());
    println!("  Unchanged:  {}", summary.unchanged);
    if summary.missing > 0 {
        println!("  Missing:    {}", summary.missing);
    }
    if summary.invalid > 0 {
        println!("  Invalid:    {}", summary.invalid);
    }
    if summary.faulty > 0 {
        println!("  Faulty:     {}", summary.faulty.to_string().red());
    }
    if summary.rejected > 0 {
        println!("  Rejected:   {}", summary.rejected.to_string().red());
    }
    if summary.unverified > 0 {
        println!("  Unverified: {}", summary.unverified.to_string().red());
    }
    println!();

    if summary.finished {
        println!(
            "{} last id {} of range end {}",
            "Finished:".green().bold(),
            summary.last_id,
            summary.max_id
        );
    } else {
        println!(
            "{} cursor at id {} of range end {}",
            "Stopped:".yellow().bold(),
            summary.last_id,
            summary.max_id
        );
    }
}
