//! cf-harvest: a rate-limited, resumable harvester for competitive programming data
//!
//! This crate fetches contest listings, problem sets, submission pages and user
//! profiles from a paginated web source, checkpoints progress to SQLite, and
//! folds everything into a deduplicated canonical dataset written as CSV.

pub mod checkpoint;
pub mod config;
pub mod harvester;
pub mod merge;
pub mod model;
pub mod output;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Harvest interrupted after {completed} completed units")]
    Interrupted { completed: usize },

    #[error("Invalid state transition for {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: String,
        from: model::ProgressState,
        to: model::ProgressState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvester::{harvest_source, SourceKind};
pub use merge::{merge, normalize_id, CanonicalDataset};
pub use model::{ProgressEntry, ProgressState, Record, RecordKind, Unit, UnitKind};
