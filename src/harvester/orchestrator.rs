//! Parallel orchestrator - dispatch, aggregation and checkpointing
//!
//! Units run on a bounded pool of tokio tasks. Workers report `Started` and
//! `Finished` events over an mpsc channel to a single aggregation loop, which
//! alone owns the progress entries, the newly harvested records and the
//! checkpoint store.

use crate::checkpoint::{CheckpointStore, RunStatus, StoredRecord};
use crate::config::ScanMode;
use crate::harvester::planner::lanes;
use crate::harvester::worker::{PageOutcome, PageWorker};
use crate::merge::{merge, CanonicalDataset};
use crate::model::{ProgressEntry, RecordKind, Unit, UnitKind};
use crate::{HarvestError, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub total: usize,
    pub already_done: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Units never dispatched because their sequential lane stopped early
    ///
    /// They stay Pending in the checkpoint, so the next run fetches the
    /// page after the last one that had records again and picks up any
    /// listing growth since.
    pub skipped: usize,
    pub records: usize,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct HarvestReport {
    pub run_id: i64,
    pub summary: HarvestSummary,
    pub dataset: CanonicalDataset,
}

enum WorkerEvent {
    Started(String),
    Finished(PageOutcome),
}

/// Drives one run of one source
pub struct Orchestrator<'a, S: CheckpointStore> {
    store: &'a mut S,
    worker: Arc<PageWorker>,
    concurrency: usize,
    batch_size: usize,
    scan_mode: ScanMode,
    run_id: i64,
}

impl<'a, S: CheckpointStore> Orchestrator<'a, S> {
    pub fn new(
        store: &'a mut S,
        worker: PageWorker,
        concurrency: usize,
        batch_size: usize,
        scan_mode: ScanMode,
        run_id: i64,
    ) -> Self {
        Self {
            store,
            worker: Arc::new(worker),
            concurrency: concurrency.max(1),
            batch_size: batch_size.max(1),
            scan_mode,
            run_id,
        }
    }

    /// Harvests `units` to completion
    pub async fn harvest(&mut self, units: Vec<Unit>) -> Result<HarvestReport> {
        self.harvest_until(units, std::future::pending()).await
    }

    /// Harvests `units` until done or until `shutdown` resolves
    ///
    /// On shutdown, in-flight tasks are aborted, completions received so far
    /// are flushed, the run is marked Interrupted and
    /// [`HarvestError::Interrupted`] is returned.
    pub async fn harvest_until<F>(&mut self, units: Vec<Unit>, shutdown: F) -> Result<HarvestReport>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let mut aggregator = Aggregator::load(&*self.store, &units, self.batch_size)?;

        let to_dispatch: Vec<Unit> = units
            .iter()
            .filter(|unit| {
                aggregator
                    .entries
                    .get(&unit.key())
                    .map_or(true, |entry| entry.state.needs_dispatch())
            })
            .cloned()
            .collect();

        aggregator.summary.total = units.len();
        aggregator.summary.already_done = units.len() - to_dispatch.len();
        let dispatched_keys: HashSet<String> = to_dispatch.iter().map(Unit::key).collect();

        tracing::info!(
            "Run {}: {} units planned, {} already done, {} to fetch with {} workers",
            self.run_id,
            units.len(),
            aggregator.summary.already_done,
            to_dispatch.len(),
            self.concurrency
        );

        // Persist newly planned units as Pending before any fetch
        aggregator.flush(&mut *self.store)?;

        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(self.concurrency * 4);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let sequential = self.scan_mode == ScanMode::Sequential;
        let mut tasks = JoinSet::new();

        for lane in lanes(to_dispatch, self.scan_mode) {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let worker = Arc::clone(&self.worker);
            tasks.spawn(async move {
                for unit in lane {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    if tx.send(WorkerEvent::Started(unit.key())).await.is_err() {
                        return;
                    }
                    let outcome = worker.run(unit).await;
                    let stop = sequential && (!outcome.is_success() || !outcome.continuation);
                    if tx.send(WorkerEvent::Finished(outcome)).await.is_err() || stop {
                        return;
                    }
                }
            });
        }
        drop(tx);

        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = aggregator.apply(event, &mut *self.store) {
                            tasks.abort_all();
                            self.mark_run(RunStatus::Failed);
                            return Err(e);
                        }
                    }
                    None => break,
                },
                _ = &mut shutdown => {
                    tracing::warn!("Interrupt received, stopping workers");
                    tasks.abort_all();
                    while let Ok(event) = rx.try_recv() {
                        aggregator.apply(event, &mut *self.store)?;
                    }
                    aggregator.flush(&mut *self.store)?;
                    self.store.update_run_status(self.run_id, RunStatus::Interrupted)?;
                    tracing::info!(
                        "Run {} interrupted: {} units completed, progress saved",
                        self.run_id,
                        aggregator.completed
                    );
                    return Err(HarvestError::Interrupted {
                        completed: aggregator.completed,
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                self.mark_run(RunStatus::Failed);
                return Err(e.into());
            }
        }

        // Units of a stopped lane keep their Pending row
        aggregator.summary.skipped = dispatched_keys
            .iter()
            .filter(|key| !aggregator.started.contains(*key))
            .count();

        aggregator.flush(&mut *self.store)?;
        self.store.complete_run(self.run_id)?;

        let mut kinds: Vec<RecordKind> = Vec::new();
        for unit in &units {
            let kind = unit.kind.record_kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        let mut stored = Vec::new();
        for kind in kinds {
            stored.extend(self.store.load_records(kind)?);
        }
        let dataset = merge(stored, Vec::new());

        let summary = aggregator.summary;
        tracing::info!(
            "Run {} finished in {:?}: {} total, {} already done, {} succeeded, {} failed, {} skipped, {} records harvested",
            self.run_id,
            start_time.elapsed(),
            summary.total,
            summary.already_done,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.records
        );

        Ok(HarvestReport {
            run_id: self.run_id,
            summary,
            dataset,
        })
    }

    fn mark_run(&mut self, status: RunStatus) {
        if let Err(e) = self.store.update_run_status(self.run_id, status) {
            tracing::error!("Failed to mark run {} as {:?}: {}", self.run_id, status, e);
        }
    }
}

/// State owned by the aggregation loop
struct Aggregator {
    entries: HashMap<String, ProgressEntry>,
    dirty: HashSet<String>,
    /// Units dispatched to a worker during this run
    started: HashSet<String>,
    pending_records: Vec<StoredRecord>,
    batch_size: usize,
    completed: usize,
    summary: HarvestSummary,
}

impl Aggregator {
    /// Joins planned units with stored progress
    fn load<S: CheckpointStore>(store: &S, units: &[Unit], batch_size: usize) -> Result<Self> {
        let mut kinds: Vec<UnitKind> = units.iter().map(|u| u.kind).collect();
        kinds.sort_by_key(|k| k.to_db_string());
        kinds.dedup();

        let mut stored: HashMap<String, ProgressEntry> = HashMap::new();
        for kind in kinds {
            for entry in store.load_progress(kind)? {
                stored.insert(entry.unit.key(), entry);
            }
        }

        let mut entries = HashMap::with_capacity(units.len());
        let mut dirty = HashSet::new();
        for unit in units {
            let key = unit.key();
            let entry = match stored.remove(&key) {
                Some(previous) => {
                    if previous.unit.sequence != unit.sequence {
                        dirty.insert(key.clone());
                    }
                    ProgressEntry {
                        unit: unit.clone(),
                        ..previous
                    }
                }
                None => {
                    dirty.insert(key.clone());
                    ProgressEntry::new(unit.clone())
                }
            };
            entries.insert(key, entry);
        }

        Ok(Self {
            entries,
            dirty,
            started: HashSet::new(),
            pending_records: Vec::new(),
            batch_size,
            completed: 0,
            summary: HarvestSummary::default(),
        })
    }

    fn apply<S: CheckpointStore>(&mut self, event: WorkerEvent, store: &mut S) -> Result<()> {
        match event {
            WorkerEvent::Started(key) => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    if let Err(e) = entry.mark_in_flight() {
                        tracing::warn!("{}", e);
                    }
                    self.started.insert(key.clone());
                    self.dirty.insert(key);
                }
            }
            WorkerEvent::Finished(outcome) => {
                self.record_outcome(outcome);
                self.completed += 1;
                if self.completed % self.batch_size == 0 {
                    self.flush(store)?;
                    tracing::info!("Progress: {} units completed", self.completed);
                }
            }
        }
        Ok(())
    }

    fn record_outcome(&mut self, outcome: PageOutcome) {
        let key = outcome.unit.key();
        let Some(entry) = self.entries.get_mut(&key) else {
            tracing::warn!("Outcome for unplanned unit {}", key);
            return;
        };

        let transition = match outcome.error {
            Some(error) => {
                self.summary.failed += 1;
                entry.mark_failed(outcome.attempts, error)
            }
            None => {
                self.summary.succeeded += 1;
                self.summary.records += outcome.records.len();
                self.pending_records
                    .extend(outcome.records.into_iter().map(|record| StoredRecord {
                        unit_key: key.clone(),
                        record,
                    }));
                entry.mark_done(outcome.attempts)
            }
        };
        if let Err(e) = transition {
            tracing::warn!("{}", e);
        }
        self.dirty.insert(key);
    }

    /// Writes dirty entries and new records in one transaction
    fn flush<S: CheckpointStore>(&mut self, store: &mut S) -> Result<()> {
        let entries: Vec<ProgressEntry> = self
            .dirty
            .iter()
            .filter_map(|key| self.entries.get(key).cloned())
            .collect();

        store.flush(&entries, &self.pending_records)?;
        self.dirty.clear();
        self.pending_records.clear();
        Ok(())
    }
}
