//! Checkpoint store trait and error types

use crate::checkpoint::{RunRecord, RunStatus};
use crate::model::{ProgressEntry, ProgressState, Record, RecordKind, UnitKind};
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt progress row for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// A record together with the unit that produced it
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub unit_key: String,
    pub record: Record,
}

/// Durable record of unit progress and harvested records
///
/// Only the orchestrator's aggregation loop talks to the store, so methods
/// take `&mut self` and implementations need no internal locking.
pub trait CheckpointStore {
    // ===== Run Management =====

    /// Creates a new run for a source
    ///
    /// # Arguments
    ///
    /// * `source` - Name of the harvested source (e.g. "contests")
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, source: &str, config_hash: &str) -> CheckpointResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> CheckpointResult<RunRecord>;

    /// Gets the most recent run of a source
    fn get_latest_run(&self, source: &str) -> CheckpointResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> CheckpointResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> CheckpointResult<()>;

    // ===== Progress =====

    /// Loads every stored progress entry of a unit kind
    ///
    /// Entries that were InFlight when the previous process stopped come back
    /// as Pending.
    fn load_progress(&self, kind: UnitKind) -> CheckpointResult<Vec<ProgressEntry>>;

    /// Durably writes progress entries and newly harvested records in one transaction
    fn flush(&mut self, entries: &[ProgressEntry], records: &[StoredRecord])
        -> CheckpointResult<()>;

    /// Removes progress and records of a unit kind, for a fresh start
    fn reset(&mut self, kind: UnitKind) -> CheckpointResult<()>;

    // ===== Records =====

    /// Loads every stored record of a kind, in insertion order
    fn load_records(&self, kind: RecordKind) -> CheckpointResult<Vec<Record>>;

    // ===== Statistics =====

    /// Counts progress entries of a unit kind in a state
    fn count_progress_by_state(
        &self,
        kind: UnitKind,
        state: ProgressState,
    ) -> CheckpointResult<u64>;

    /// Counts stored records of a kind, duplicates included
    fn count_records(&self, kind: RecordKind) -> CheckpointResult<u64>;
}
