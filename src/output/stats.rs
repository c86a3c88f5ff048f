//! Statistics from the checkpoint database and run summaries
//!
//! This module extracts per-source progress from the checkpoint store for
//! `--stats`, and prints the summary of a finished harvest.

use crate::checkpoint::{CheckpointStore, RunRecord};
use crate::harvester::{HarvestReport, SourceKind};
use crate::model::ProgressState;
use crate::Result;

/// Checkpoint statistics of one source
#[derive(Debug, Clone)]
pub struct SourceStatistics {
    pub source: SourceKind,

    /// Number of units per progress state, in lifecycle order
    pub units_by_state: Vec<(ProgressState, u64)>,

    /// Stored records of the source's kind, duplicates included
    pub stored_records: u64,

    /// Most recent run of the source, if any
    pub latest_run: Option<RunRecord>,
}

impl SourceStatistics {
    pub fn total_units(&self) -> u64 {
        self.units_by_state.iter().map(|(_, count)| count).sum()
    }

    pub fn count(&self, state: ProgressState) -> u64 {
        self.units_by_state
            .iter()
            .find(|(s, _)| *s == state)
            .map_or(0, |(_, count)| *count)
    }
}

/// Loads statistics for every source from the checkpoint store
pub fn load_statistics<S: CheckpointStore>(store: &S) -> Result<Vec<SourceStatistics>> {
    let mut all = Vec::new();

    for source in SourceKind::all() {
        let mut units_by_state = Vec::new();
        for state in ProgressState::all_states() {
            let count = store.count_progress_by_state(source.unit_kind(), state)?;
            units_by_state.push((state, count));
        }

        all.push(SourceStatistics {
            source,
            units_by_state,
            stored_records: store.count_records(source.record_kind())?,
            latest_run: store.get_latest_run(source.name())?,
        });
    }

    Ok(all)
}

/// Prints checkpoint statistics to stdout
pub fn print_statistics(stats: &[SourceStatistics]) {
    println!("=== Checkpoint Statistics ===\n");

    for source in stats {
        let total = source.total_units();
        println!("{}:", source.source);

        match &source.latest_run {
            Some(run) => println!(
                "  Latest run: #{} {} (started {})",
                run.id,
                run.status.to_db_string(),
                run.started_at
            ),
            None => println!("  Latest run: none"),
        }
        if let Some(seconds) = source.latest_run.as_ref().and_then(run_duration_seconds) {
            println!("  Duration: {}s", seconds);
        }

        if total == 0 {
            println!("  No units recorded\n");
            continue;
        }

        for (state, count) in &source.units_by_state {
            if *count == 0 {
                continue;
            }
            let percentage = (*count as f64 / total as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", state, count, percentage);
        }
        println!("  Stored records: {}", source.stored_records);
        println!();
    }
}

/// Prints the summary of a finished harvest to stdout
pub fn print_summary(source: SourceKind, report: &HarvestReport) {
    let summary = &report.summary;

    println!("=== Harvest Summary: {} (run #{}) ===\n", source, report.run_id);
    println!("  Units planned: {}", summary.total);
    println!("  Already done: {}", summary.already_done);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed);
    if summary.skipped > 0 {
        println!("  Not reached: {}", summary.skipped);
    }
    println!("  Records harvested this run: {}", summary.records);
    println!("  Canonical records: {}", report.dataset.len());

    if summary.failed > 0 {
        println!("\nFailed units stay in the checkpoint and are retried on the next run.");
    }
}

/// Duration of a finished run in seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
    let finished = run
        .finished_at
        .as_deref()?
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    Some((finished - started).num_seconds())
}
