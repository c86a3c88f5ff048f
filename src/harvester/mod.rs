//! Harvester module for page fetching and processing
//!
//! This module contains the core harvesting logic, including:
//! - Rate-limited HTTP fetching with an explicit retry policy
//! - Record extraction from HTML pages and API responses
//! - Unit planning per source
//! - Parallel orchestration with checkpointing

mod extractor;
mod fetcher;
mod limiter;
mod orchestrator;
mod planner;
mod retry;
mod worker;

pub use extractor::{extract, leading_number, ExtractError, Extraction};
pub use fetcher::{build_http_client, FetchError, Fetcher, RawPage};
pub use limiter::RateLimiter;
pub use orchestrator::{HarvestReport, HarvestSummary, Orchestrator};
pub use planner::{lanes, plan_units, scan_mode_for, RATED_USERS_METHOD};
pub use retry::{FailureClass, RetryPolicy};
pub use worker::{PageOutcome, PageWorker, UnitUrls};

use crate::checkpoint::{CheckpointStore, RunStatus};
use crate::config::Config;
use crate::model::{RecordKind, UnitKind};
use crate::output;
use crate::Result;
use std::fmt;
use std::future::Future;

/// The harvestable sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Contests,
    Problems,
    Submissions,
    /// Rated users from the JSON API
    Users,
    /// Profile pages enriching known users
    Profiles,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Contests => "contests",
            Self::Problems => "problems",
            Self::Submissions => "submissions",
            Self::Users => "users",
            Self::Profiles => "profiles",
        }
    }

    pub fn unit_kind(&self) -> UnitKind {
        match self {
            Self::Contests => UnitKind::ContestList,
            Self::Problems => UnitKind::ProblemSet,
            Self::Submissions => UnitKind::SubmissionPage,
            Self::Users => UnitKind::RatedUsers,
            Self::Profiles => UnitKind::UserProfile,
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        self.unit_kind().record_kind()
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Contests,
            Self::Problems,
            Self::Submissions,
            Self::Users,
            Self::Profiles,
        ]
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a page worker from the configuration
///
/// HTML pages and API calls get separate fetchers so each keeps its own pacing.
pub fn build_worker(config: &Config) -> Result<PageWorker> {
    let client = build_http_client(&config.identity, config.fetcher.timeout())?;
    let pages = Fetcher::for_pages(client.clone(), &config.fetcher);
    let api = Fetcher::new(
        client,
        RateLimiter::from_millis(config.api.min_interval_ms, config.api.jitter_ms),
        RetryPolicy::from_config(&config.fetcher),
    );
    Ok(PageWorker::new(pages, api, UnitUrls::new(&config.source)))
}

/// Picks the run id for a source: resumes an unfinished run or starts a new one
fn start_run<S: CheckpointStore>(
    store: &mut S,
    source: SourceKind,
    config_hash: &str,
    fresh: bool,
) -> Result<i64> {
    let latest = store.get_latest_run(source.name())?;

    if let Some(run) = &latest {
        if run.config_hash != config_hash {
            tracing::warn!(
                "Configuration changed since run {} of {}; completed units are kept",
                run.id,
                source
            );
        }
    }

    match latest {
        Some(run)
            if !fresh && matches!(run.status, RunStatus::Running | RunStatus::Interrupted) =>
        {
            tracing::info!("Resuming interrupted run {} of {}", run.id, source);
            store.update_run_status(run.id, RunStatus::Running)?;
            Ok(run.id)
        }
        _ => {
            let run_id = store.create_run(source.name(), config_hash)?;
            tracing::info!("Starting run {} of {}", run_id, source);
            Ok(run_id)
        }
    }
}

/// Runs a complete harvest of one source
///
/// This is the main entry point. It will:
/// 1. Clear the source's checkpoint when `fresh` is set
/// 2. Resume or create a run
/// 3. Plan the units and fetch every unit not already done
/// 4. Merge all stored records of the source into a canonical dataset
/// 5. Write the canonical CSV
///
/// `shutdown` resolving interrupts the harvest; progress up to that point is
/// kept and the next run resumes from it.
pub async fn harvest_source<S, F>(
    config: &Config,
    source: SourceKind,
    store: &mut S,
    config_hash: &str,
    fresh: bool,
    shutdown: F,
) -> Result<HarvestReport>
where
    S: CheckpointStore,
    F: Future<Output = ()>,
{
    if fresh {
        tracing::info!("Fresh start: clearing checkpoint for {}", source);
        store.reset(source.unit_kind())?;
    }

    let run_id = start_run(store, source, config_hash, fresh)?;

    let known_usernames = if source == SourceKind::Profiles && config.profiles.from_users_csv {
        output::read_usernames(&config.output.path_for(RecordKind::User.file_name()))?
    } else {
        Vec::new()
    };
    let units = plan_units(config, source, &known_usernames);

    let worker = build_worker(config)?;
    let mut orchestrator = Orchestrator::new(
        store,
        worker,
        config.harvest.effective_concurrency(),
        config.harvest.batch_size,
        scan_mode_for(config, source),
        run_id,
    );
    let report = orchestrator.harvest_until(units, shutdown).await?;

    let path = output::write_canonical(&config.output, source.record_kind(), &report.dataset)?;
    tracing::info!(
        "Wrote {} {} records to {}",
        report.dataset.len(),
        source.record_kind(),
        path.display()
    );

    Ok(report)
}
