//! The sequential sync loop.
//!
//! One id is fully fetched, normalized, reconciled, and written before
//! the next begins, with a fixed delay after every fetch as cooperative
//! backpressure on the remote API. Progress persists after every id, so
//! a crash costs at most the id in flight.
//!
//! Each iteration is an explicit transition rather than a nested retry
//! loop: a step either advances the cursor or asks for the same id
//! again. Only a temporarily unavailable service retries; a missing or
//! rejected id advances with nothing written.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{CoercionPolicy, FieldMap, SyncConfig};
use crate::error::{Error, Result};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::model::{RawRecord, TableSchema};
use crate::normalize::normalize;
use crate::notify::Notifier;
use crate::progress::{ProgressState, ProgressTracker};
use crate::reconcile::{self, Decision};
use crate::storage::SqliteStore;
use crate::upsert::{Upserter, WriteOutcome};

/// Counters for one `run` invocation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    /// Fetch attempts, including retries of the same id.
    pub fetched: u64,
    /// New rows inserted and verified.
    pub inserted: u64,
    /// Existing rows updated and verified.
    pub updated: u64,
    /// Rows that were already current.
    pub unchanged: u64,
    /// Ids with no record on the remote side.
    pub missing: u64,
    /// Ids the API rejected.
    pub invalid: u64,
    /// Records skipped for data-quality faults (skip policy only).
    pub faulty: u64,
    /// Writes refused because the unique key was ambiguous.
    pub rejected: u64,
    /// Writes whose verification read did not confirm them.
    pub unverified: u64,
    /// Same-id retries after transient outages.
    pub retries: u64,
    /// Last id whose processing completed.
    pub last_id: u64,
    /// End of the id range (exclusive).
    pub max_id: u64,
    /// Whether the whole range is now done.
    pub finished: bool,
}

impl RunSummary {
    fn terminal(state: &ProgressState) -> Self {
        Self {
            last_id: state.last_id,
            max_id: state.max_id,
            finished: true,
            ..Self::default()
        }
    }

    fn tally(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Missing => self.missing += 1,
            StepOutcome::Invalid => self.invalid += 1,
            StepOutcome::Faulty => self.faulty += 1,
            StepOutcome::Inserted => self.inserted += 1,
            StepOutcome::Updated => self.updated += 1,
            StepOutcome::Unchanged => self.unchanged += 1,
            StepOutcome::Rejected => self.rejected += 1,
            StepOutcome::Unverified => self.unverified += 1,
        }
    }
}

/// What processing one id concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Missing,
    Invalid,
    Faulty,
    Inserted,
    Updated,
    Unchanged,
    Rejected,
    Unverified,
}

/// Transition after one step: move to the next id, or ask again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance(StepOutcome),
    Retry,
}

/// Owns the collaborators and walks the id range.
pub struct Driver<F: Fetcher, N: Notifier> {
    store: SqliteStore,
    schema: TableSchema,
    map: FieldMap,
    table: String,
    unique_column: String,
    delay: Duration,
    policy: CoercionPolicy,
    tracker: ProgressTracker,
    fetcher: F,
    notifier: N,
}

impl<F: Fetcher, N: Notifier> Driver<F, N> {
    /// Wire a driver up from config and collaborators.
    ///
    /// Reads the table schema once and checks that every mapped column
    /// actually exists in the table.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a bad mapping or missing table, or a
    /// database error from the schema read.
    pub fn new(
        config: &SyncConfig,
        store: SqliteStore,
        tracker: ProgressTracker,
        fetcher: F,
        notifier: N,
    ) -> Result<Self> {
        let schema = store.describe_columns(&config.table)?;
        let map = config.field_map()?;
        for column in map.store_columns() {
            if schema.get(column).is_none() {
                return Err(Error::Config(format!(
                    "mapped column `{column}` is not in table `{}`",
                    config.table
                )));
            }
        }

        Ok(Self {
            store,
            schema,
            map,
            table: config.table.clone(),
            unique_column: config.unique_column.clone(),
            delay: config.delay(),
            policy: config.on_coercion_error,
            tracker,
            fetcher,
            notifier,
        })
    }

    /// The mirrored store (handy for inspection after a run).
    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Walk the id range until done or a fatal error.
    ///
    /// `start` overrides the cursor so iteration begins at that id;
    /// `max_override` pins the range end without a discovery call.
    ///
    /// # Errors
    ///
    /// Fatal errors abort the run after a best-effort save of the last
    /// good cursor: store failures, and data-quality faults under the
    /// abort policy.
    pub async fn run(
        &self,
        start: Option<u64>,
        max_override: Option<u64>,
    ) -> Result<RunSummary> {
        let mut state = self.resolve_state(start, max_override).await?;
        if state.finished {
            info!(
                "cursor is finished at id {} of {}; nothing to do",
                state.last_id, state.max_id
            );
            return Ok(RunSummary::terminal(&state));
        }

        // The resolved range persists before the first fetch so a
        // restart never repeats discovery.
        self.tracker.save(&state)?;
        info!("syncing ids {} through {}", state.next_id(), state.max_id.saturating_sub(1));
        self.notifier
            .notify(&format!(
                "sync started: ids {} through {}",
                state.next_id(),
                state.max_id.saturating_sub(1)
            ))
            .await;

        let mut summary = RunSummary {
            last_id: state.last_id,
            max_id: state.max_id,
            ..RunSummary::default()
        };

        while state.next_id() < state.max_id {
            let id = state.next_id();
            match self.step(id).await {
                Ok(Step::Retry) => {
                    summary.fetched += 1;
                    summary.retries += 1;
                }
                Ok(Step::Advance(outcome)) => {
                    summary.fetched += 1;
                    summary.tally(outcome);
                    state.last_id = id;
                    summary.last_id = id;
                    self.tracker.save(&state)?;
                }
                Err(e) => {
                    // Keep the last completed id on disk even when the
                    // save itself is what failed.
                    let _ = self.tracker.save(&state);
                    self.notifier
                        .notify(&format!("sync aborted at id {id}: {e}"))
                        .await;
                    return Err(e);
                }
            }
        }

        state.finished = true;
        self.tracker.save(&state)?;
        summary.finished = true;
        info!("sync finished; last id {}", state.last_id);
        self.notifier
            .notify(&format!("sync finished: last id {}", state.last_id))
            .await;
        Ok(summary)
    }

    /// Work out where this run starts and ends.
    ///
    /// A `start` override begins a fresh pass even over a finished
    /// range; otherwise an unfinished cursor resumes as-is, and only a
    /// missing cursor triggers range discovery.
    async fn resolve_state(
        &self,
        start: Option<u64>,
        max_override: Option<u64>,
    ) -> Result<ProgressState> {
        if let Some(start) = start {
            let max_id = match max_override {
                Some(max) => max,
                None => match self.tracker.load() {
                    Some(state) if !state.finished => state.max_id,
                    _ => self.fetcher.discover_max_id().await?,
                },
            };
            info!("start override: beginning at id {start}");
            return Ok(ProgressState::fresh(Some(start), max_id));
        }

        match self.tracker.load() {
            Some(state) if state.finished => Ok(state),
            Some(mut state) => {
                info!("resuming from persisted cursor at id {}", state.last_id);
                if let Some(max) = max_override {
                    state.max_id = max;
                }
                Ok(state)
            }
            None => {
                let max_id = match max_override {
                    Some(max) => max,
                    None => self.fetcher.discover_max_id().await?,
                };
                Ok(ProgressState::fresh(None, max_id))
            }
        }
    }

    /// Process one id and decide the transition.
    async fn step(&self, id: u64) -> Result<Step> {
        let fetched = self.fetcher.fetch(id).await;
        // Fixed delay after every fetch regardless of outcome.
        tokio::time::sleep(self.delay).await;

        match fetched? {
            FetchOutcome::ServiceUnavailable => {
                warn!("id {id}: service unavailable, will retry");
                Ok(Step::Retry)
            }
            FetchOutcome::NotFound => {
                debug!("id {id}: no record, skipping");
                Ok(Step::Advance(StepOutcome::Missing))
            }
            FetchOutcome::InvalidRequest => {
                debug!("id {id}: rejected request, skipping");
                Ok(Step::Advance(StepOutcome::Invalid))
            }
            FetchOutcome::Record(raw) => match self.process_record(&raw) {
                Ok(outcome) => {
                    self.report(id, outcome).await;
                    Ok(Step::Advance(outcome))
                }
                Err(e) if self.policy == CoercionPolicy::Skip && is_record_fault(&e) => {
                    warn!("id {id}: unusable record skipped: {e}");
                    self.notifier
                        .notify(&format!("id {id}: unusable record skipped: {e}"))
                        .await;
                    Ok(Step::Advance(StepOutcome::Faulty))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Normalize, reconcile, and write one fetched record.
    fn process_record(&self, raw: &RawRecord) -> Result<StepOutcome> {
        let record = normalize(raw, &self.map, &self.schema)?;
        let unique = record.get(&self.unique_column).ok_or_else(|| {
            Error::MissingUniqueField { column: self.unique_column.clone() }
        })?;

        let rows = self
            .store
            .find_by_unique(&self.table, &self.unique_column, unique)?;
        let decision = reconcile::compare(&record, &rows, &self.schema);
        debug!("{}={unique}: {}", self.unique_column, decision.as_str());

        let upserter = Upserter::new(&self.store, &self.table, &self.unique_column, &self.schema);
        let outcome = upserter.apply(&decision, &record)?;

        Ok(match (&decision, outcome) {
            (_, WriteOutcome::Skipped) => StepOutcome::Unchanged,
            (_, WriteOutcome::Rejected) => StepOutcome::Rejected,
            (Decision::Absent, WriteOutcome::Confirmed) => StepOutcome::Inserted,
            (_, WriteOutcome::Confirmed) => StepOutcome::Updated,
            (_, WriteOutcome::StillDivergent | WriteOutcome::Ambiguous) => {
                StepOutcome::Unverified
            }
        })
    }

    async fn report(&self, id: u64, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Inserted => {
                info!("id {id}: inserted");
                self.notifier.notify(&format!("id {id}: inserted")).await;
            }
            StepOutcome::Updated => {
                info!("id {id}: updated");
                self.notifier.notify(&format!("id {id}: updated")).await;
            }
            StepOutcome::Rejected => {
                self.notifier
                    .notify(&format!(
                        "id {id}: duplicate rows under the unique key, write refused"
                    ))
                    .await;
            }
            StepOutcome::Unverified => {
                self.notifier
                    .notify(&format!("id {id}: write could not be verified"))
                    .await;
            }
            StepOutcome::Unchanged
            | StepOutcome::Missing
            | StepOutcome::Invalid
            | StepOutcome::Faulty => {}
        }
    }
}

const fn is_record_fault(error: &Error) -> bool {
    matches!(
        error,
        Error::Coercion { .. } | Error::MissingUniqueField { .. }
    )
}
