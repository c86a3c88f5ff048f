//! cf-harvest main entry point
//!
//! This is the command-line interface for the cf-harvest dataset harvester.

use anyhow::{bail, Context};
use cf_harvest::checkpoint::open_checkpoint;
use cf_harvest::config::{load_config_with_hash, Config};
use cf_harvest::harvester::{plan_units, scan_mode_for};
use cf_harvest::model::RecordKind;
use cf_harvest::output::{self, load_statistics, print_statistics, print_summary};
use cf_harvest::{harvest_source, HarvestError, SourceKind};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// cf-harvest: a polite, resumable competitive programming data harvester
///
/// cf-harvest fetches contest listings, problem sets, submission pages,
/// rated users and user profiles under a shared rate limit, checkpoints
/// every unit to SQLite and writes one deduplicated CSV per record kind.
#[derive(Parser, Debug)]
#[command(name = "cf-harvest")]
#[command(version)]
#[command(about = "A polite, resumable dataset harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Source to harvest
    #[arg(short, long, value_enum, required_unless_present_any = ["stats", "clean"])]
    source: Option<SourceArg>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh harvest of the source, discarding its checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the planned units without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "clean"])]
    dry_run: bool,

    /// Show checkpoint statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "clean"])]
    stats: bool,

    /// Clean a raw CSV into the canonical CSV of its kind and exit
    #[arg(long, value_name = "CSV", conflicts_with_all = ["dry_run", "stats"])]
    clean: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Contests,
    Problems,
    Submissions,
    Users,
    Profiles,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Contests => SourceKind::Contests,
            SourceArg::Problems => SourceKind::Problems,
            SourceArg::Submissions => SourceKind::Submissions,
            SourceArg::Users => SourceKind::Users,
            SourceArg::Profiles => SourceKind::Profiles,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }
    if let Some(input) = &cli.clean {
        return handle_clean(&config, input);
    }

    let Some(source) = cli.source.map(SourceKind::from) else {
        bail!("--source is required");
    };

    if cli.dry_run {
        handle_dry_run(&config, source)
    } else {
        handle_harvest(&config, source, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cf_harvest=info,warn"),
            1 => EnvFilter::new("cf_harvest=debug,info"),
            2 => EnvFilter::new("cf_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and lists the planned units
fn handle_dry_run(config: &Config, source: SourceKind) -> anyhow::Result<()> {
    println!("=== cf-harvest Dry Run: {} ===\n", source);

    println!("Fetcher:");
    println!(
        "  Page spacing: {}ms + up to {}ms jitter",
        config.fetcher.min_interval_ms, config.fetcher.jitter_ms
    );
    println!(
        "  API spacing: {}ms + up to {}ms jitter",
        config.api.min_interval_ms, config.api.jitter_ms
    );
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!("  Max attempts: {}", config.fetcher.max_attempts);
    println!("  Workers: {}", config.harvest.effective_concurrency());

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.harvest.checkpoint_path);
    println!(
        "  CSV: {}",
        config.output.path_for(source.record_kind().file_name()).display()
    );

    let known_usernames = if source == SourceKind::Profiles && config.profiles.from_users_csv {
        output::read_usernames(&config.output.path_for(RecordKind::User.file_name()))?
    } else {
        Vec::new()
    };
    let units = plan_units(config, source, &known_usernames);

    println!(
        "\nPlanned Units ({}, {:?}):",
        units.len(),
        scan_mode_for(config, source)
    );
    for unit in units.iter().take(20) {
        println!("  - {}", unit.key());
    }
    if units.len() > 20 {
        println!("  ... and {} more", units.len() - 20);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Checkpoint: {}\n", config.harvest.checkpoint_path);

    let store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .context("failed to open checkpoint database")?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --clean mode: rewrites a raw CSV as canonical output
fn handle_clean(config: &Config, input: &Path) -> anyhow::Result<()> {
    let (kind, path) = output::clean_csv(input, &config.output)
        .with_context(|| format!("failed to clean {}", input.display()))?;
    println!("✓ Cleaned {} records written to: {}", kind, path.display());
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    source: SourceKind,
    config_hash: &str,
    fresh: bool,
) -> anyhow::Result<()> {
    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .context("failed to open checkpoint database")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match harvest_source(config, source, &mut store, config_hash, fresh, shutdown).await {
        Ok(report) => {
            print_summary(source, &report);
            Ok(())
        }
        Err(HarvestError::Interrupted { completed }) => {
            println!(
                "\nInterrupted after {} units; run again with the same config to resume.",
                completed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
