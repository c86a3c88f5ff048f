//! SQLite checkpoint implementation

use crate::checkpoint::schema::initialize_schema;
use crate::checkpoint::traits::{
    CheckpointError, CheckpointResult, CheckpointStore, StoredRecord,
};
use crate::checkpoint::{RunRecord, RunStatus};
use crate::model::{
    Locator, ProgressEntry, ProgressState, Record, RecordKey, RecordKind, Unit, UnitKind,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite checkpoint backend
pub struct SqliteCheckpoint {
    conn: Connection,
}

impl SqliteCheckpoint {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> CheckpointResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> CheckpointResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn key_column(key: &RecordKey) -> String {
    match key {
        RecordKey::Numeric(n) => format!("n:{}", n),
        RecordKey::Text(s) => format!("t:{}", s),
        RecordKey::Secondary(s) => format!("s:{}", s),
    }
}

struct ProgressRow {
    key: String,
    locator: String,
    sequence: i64,
    state: String,
    attempts: u32,
    last_error: Option<String>,
}

impl ProgressRow {
    fn into_entry(self, kind: UnitKind) -> CheckpointResult<ProgressEntry> {
        let corrupt = |reason: &str| CheckpointError::Corrupt {
            key: self.key.clone(),
            reason: reason.to_string(),
        };

        let locator =
            Locator::from_db_string(kind, &self.locator).ok_or_else(|| corrupt("bad locator"))?;
        let state =
            ProgressState::from_db_string(&self.state).ok_or_else(|| corrupt("unknown state"))?;
        let sequence = u64::try_from(self.sequence).map_err(|_| corrupt("negative sequence"))?;

        let entry = ProgressEntry {
            unit: Unit::new(kind, locator, sequence),
            state,
            attempts: self.attempts,
            last_error: self.last_error,
        };
        Ok(entry.resumed())
    }
}

impl CheckpointStore for SqliteCheckpoint {
    // ===== Run Management =====

    fn create_run(&mut self, source: &str, config_hash: &str) -> CheckpointResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (source, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![source, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> CheckpointResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, source, started_at, finished_at, config_hash, status
                 FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(CheckpointError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, source: &str) -> CheckpointResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, source, started_at, finished_at, config_hash, status
                 FROM runs WHERE source = ?1 ORDER BY id DESC LIMIT 1",
                params![source],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> CheckpointResult<()> {
        let now = Utc::now().to_rfc3339();
        let finished_at = (status != RunStatus::Running).then_some(now);
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> CheckpointResult<()> {
        self.update_run_status(run_id, RunStatus::Completed)
    }

    // ===== Progress =====

    fn load_progress(&self, kind: UnitKind) -> CheckpointResult<Vec<ProgressEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT unit_key, locator, sequence, state, attempts, last_error
             FROM progress WHERE kind = ?1 ORDER BY sequence, unit_key",
        )?;

        let rows = stmt
            .query_map(params![kind.to_db_string()], |row| {
                Ok(ProgressRow {
                    key: row.get(0)?,
                    locator: row.get(1)?,
                    sequence: row.get(2)?,
                    state: row.get(3)?,
                    attempts: row.get(4)?,
                    last_error: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(|row| row.into_entry(kind)).collect()
    }

    fn flush(
        &mut self,
        entries: &[ProgressEntry],
        records: &[StoredRecord],
    ) -> CheckpointResult<()> {
        if entries.is_empty() && records.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO progress
                    (unit_key, kind, locator, sequence, state, attempts, last_error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(unit_key) DO UPDATE SET
                    sequence = excluded.sequence,
                    state = excluded.state,
                    attempts = excluded.attempts,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
            )?;
            for entry in entries {
                upsert.execute(params![
                    entry.unit.key(),
                    entry.unit.kind.to_db_string(),
                    entry.unit.locator.to_db_string(),
                    entry.unit.sequence as i64,
                    entry.state.to_db_string(),
                    entry.attempts,
                    entry.last_error,
                    now,
                ])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO records (kind, natural_key, unit_key, payload, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stored in records {
                let payload = serde_json::to_string(&stored.record)?;
                insert.execute(params![
                    stored.record.kind().to_db_string(),
                    key_column(&stored.record.natural_key()),
                    stored.unit_key,
                    payload,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Flushed {} progress entries and {} records",
            entries.len(),
            records.len()
        );
        Ok(())
    }

    fn reset(&mut self, kind: UnitKind) -> CheckpointResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM progress WHERE kind = ?1",
            params![kind.to_db_string()],
        )?;
        tx.execute(
            "DELETE FROM records WHERE unit_key LIKE ?1",
            params![format!("{}:%", kind.to_db_string())],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Records =====

    fn load_records(&self, kind: RecordKind) -> CheckpointResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM records WHERE kind = ?1 ORDER BY id")?;

        let payloads = stmt
            .query_map(params![kind.to_db_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(CheckpointError::from))
            .collect()
    }

    // ===== Statistics =====

    fn count_progress_by_state(
        &self,
        kind: UnitKind,
        state: ProgressState,
    ) -> CheckpointResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM progress WHERE kind = ?1 AND state = ?2",
            params![kind.to_db_string(), state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_records(&self, kind: RecordKind) -> CheckpointResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
