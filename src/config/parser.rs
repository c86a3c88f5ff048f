use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Each harvest run records this hash so a resumed run can tell whether the
/// configuration changed underneath its checkpoint.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[harvest]
concurrency = 8
checkpoint-path = "./harvest.db"

[fetcher]
min-interval-ms = 1500
jitter-ms = 1000

[identity]
user-agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)"

[source]
base-url = "https://codeforces.com"
api-url = "https://codeforces.com/api"

[output]
directory = "./data"

[submissions]
contest-ids = [1850, 1851]
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.harvest.concurrency, Some(8));
        assert_eq!(config.harvest.batch_size, 50);
        assert_eq!(config.fetcher.min_interval_ms, 1500);
        assert_eq!(config.fetcher.max_attempts, 3);
        assert_eq!(config.fetcher.throttle_cooldown_secs, 60);
        assert_eq!(config.api.min_interval_ms, 500);
        assert_eq!(config.submissions.contest_ids, vec![1850, 1851]);
        assert_eq!(config.submissions.max_pages, 5);
    }

    #[test]
    fn test_listing_defaults() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.contests.first_page, 1);
        assert_eq!(config.contests.last_page, 50);
        assert_eq!(config.problems.last_page, 98);
        assert_eq!(config.contests.scan_mode, ScanMode::FixedRange);
        assert!(config.profiles.from_users_csv);
    }

    #[test]
    fn test_scan_mode_override() {
        let content = format!(
            "{}\n[contests]\nfirst-page = 1\nlast-page = 10\nscan-mode = \"sequential\"\n",
            VALID_CONFIG
        );
        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.contests.last_page, 10);
        assert_eq!(config.contests.scan_mode, ScanMode::Sequential);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("concurrency = 8", "concurrency = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
