//! Configuration module for cf-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use cf_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Checkpoints go to {}", config.harvest.checkpoint_path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiPacingConfig, Config, FetcherConfig, HarvestConfig, IdentityConfig, OutputConfig,
    PageRangeConfig, ProfilesConfig, ScanMode, SourceConfig, SubmissionsConfig, MAX_CONCURRENCY,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub(crate) use validation::validate_username;
