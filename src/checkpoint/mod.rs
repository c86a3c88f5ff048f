//! Checkpoint store for resumable harvests
//!
//! This module persists everything a harvest needs to resume after a crash
//! or interrupt:
//! - Run tracking per source, with the config hash of each run
//! - One progress row per unit (state, attempts, last error)
//! - Every record a completed unit produced, for the final merge

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCheckpoint;
pub use traits::{CheckpointError, CheckpointResult, CheckpointStore, StoredRecord};

use std::path::Path;

/// Opens (or creates) the checkpoint database at `path`
pub fn open_checkpoint(path: &Path) -> CheckpointResult<SqliteCheckpoint> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteCheckpoint::new(path)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub source: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
