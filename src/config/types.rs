use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on the worker pool size
pub const MAX_CONCURRENCY: usize = 32;

/// Main configuration structure for cf-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub api: ApiPacingConfig,
    pub identity: IdentityConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
    #[serde(default = "PageRangeConfig::contests")]
    pub contests: PageRangeConfig,
    #[serde(default = "PageRangeConfig::problems")]
    pub problems: PageRangeConfig,
    #[serde(default)]
    pub submissions: SubmissionsConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

/// Orchestration settings
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Worker pool size; derived from available parallelism when absent
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Number of completed units between checkpoint flushes
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Path to the SQLite checkpoint database
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,
}

impl HarvestConfig {
    /// Returns the effective worker pool size
    ///
    /// Without an explicit value this is `available_parallelism + 4`, the usual
    /// sizing for I/O-bound pools, capped at [`MAX_CONCURRENCY`].
    pub fn effective_concurrency(&self) -> usize {
        let derived = || {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                + 4
        };
        self.concurrency
            .unwrap_or_else(derived)
            .clamp(1, MAX_CONCURRENCY)
    }
}

/// Request pacing, timeout and retry settings for HTML pages
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Minimum time between two requests (milliseconds)
    #[serde(rename = "min-interval-ms")]
    pub min_interval_ms: u64,

    /// Random extra delay added on top of the minimum interval (milliseconds)
    #[serde(rename = "jitter-ms", default)]
    pub jitter_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per unit, first try included
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each further attempt (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Cooldown after a throttling response (seconds)
    #[serde(
        rename = "throttle-cooldown-secs",
        default = "default_throttle_cooldown_secs"
    )]
    pub throttle_cooldown_secs: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pacing for JSON API endpoints, which tolerate a tighter fixed interval
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPacingConfig {
    #[serde(rename = "min-interval-ms")]
    pub min_interval_ms: u64,

    #[serde(rename = "jitter-ms", default)]
    pub jitter_ms: u64,
}

impl Default for ApiPacingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 500,
            jitter_ms: 0,
        }
    }
}

/// Static request identity sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "accept-language", default)]
    pub accept_language: Option<String>,
}

/// Endpoints of the harvested site
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL for HTML pages (e.g. "https://codeforces.com")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Base URL for the JSON API (e.g. "https://codeforces.com/api")
    #[serde(rename = "api-url")]
    pub api_url: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one canonical CSV per record kind
    pub directory: String,
}

impl OutputConfig {
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        PathBuf::from(&self.directory).join(file_name)
    }
}

/// How the pages of a listing are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Every page of a known range is fetched in parallel; empty pages never stop the run
    FixedRange,
    /// Pages are fetched in increasing order and the listing stops at its first empty page
    Sequential,
}

/// A page range for listing sources
#[derive(Debug, Clone, Deserialize)]
pub struct PageRangeConfig {
    #[serde(rename = "first-page")]
    pub first_page: u32,

    #[serde(rename = "last-page")]
    pub last_page: u32,

    #[serde(rename = "scan-mode", default = "default_scan_mode")]
    pub scan_mode: ScanMode,
}

impl PageRangeConfig {
    pub fn contests() -> Self {
        Self {
            first_page: 1,
            last_page: 50,
            scan_mode: ScanMode::FixedRange,
        }
    }

    pub fn problems() -> Self {
        Self {
            first_page: 1,
            last_page: 98,
            scan_mode: ScanMode::FixedRange,
        }
    }
}

/// Submission status pages to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionsConfig {
    #[serde(rename = "contest-ids", default)]
    pub contest_ids: Vec<u64>,

    /// Upper bound on status pages per contest
    #[serde(rename = "max-pages", default = "default_max_submission_pages")]
    pub max_pages: u32,
}

impl Default for SubmissionsConfig {
    fn default() -> Self {
        Self {
            contest_ids: Vec::new(),
            max_pages: default_max_submission_pages(),
        }
    }
}

/// Profile pages to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default)]
    pub usernames: Vec<String>,

    /// Also enrich every user already present in the canonical users CSV
    #[serde(rename = "from-users-csv", default = "default_true")]
    pub from_users_csv: bool,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            usernames: Vec::new(),
            from_users_csv: true,
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_throttle_cooldown_secs() -> u64 {
    60
}

fn default_scan_mode() -> ScanMode {
    ScanMode::FixedRange
}

fn default_max_submission_pages() -> u32 {
    5
}

fn default_true() -> bool {
    true
}
