use crate::config::types::{
    ApiPacingConfig, Config, FetcherConfig, HarvestConfig, IdentityConfig, OutputConfig,
    PageRangeConfig, ProfilesConfig, SourceConfig, SubmissionsConfig, MAX_CONCURRENCY,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_api_pacing(&config.api)?;
    validate_identity_config(&config.identity)?;
    validate_source_config(&config.source)?;
    validate_output_config(&config.output)?;
    validate_page_range("contests", &config.contests)?;
    validate_page_range("problems", &config.problems)?;
    validate_submissions_config(&config.submissions)?;
    validate_profiles_config(&config.profiles)?;
    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if let Some(concurrency) = config.concurrency {
        if concurrency < 1 || concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, concurrency
            )));
        }
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.min_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetcher min-interval-ms must be >= 100ms, got {}ms",
            config.min_interval_ms
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must not be below backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    Ok(())
}

fn validate_api_pacing(config: &ApiPacingConfig) -> Result<(), ConfigError> {
    if config.min_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "api min-interval-ms must be >= 100ms, got {}ms",
            config.min_interval_ms
        )));
    }
    Ok(())
}

fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    // Header values must be visible ASCII
    if !config
        .user_agent
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control())
    {
        return Err(ConfigError::Validation(format!(
            "user-agent must be printable ASCII, got '{}'",
            config.user_agent
        )));
    }

    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    for (name, value) in [("base-url", &config.base_url), ("api-url", &config.api_url)] {
        let url = Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "{} '{}' must use http or https",
                name, value
            )));
        }
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_page_range(name: &str, config: &PageRangeConfig) -> Result<(), ConfigError> {
    if config.first_page < 1 {
        return Err(ConfigError::Validation(format!(
            "{} first-page must be >= 1",
            name
        )));
    }

    if config.last_page < config.first_page {
        return Err(ConfigError::Validation(format!(
            "{} last-page ({}) is before first-page ({})",
            name, config.last_page, config.first_page
        )));
    }

    Ok(())
}

fn validate_submissions_config(config: &SubmissionsConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "submissions max-pages must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_profiles_config(config: &ProfilesConfig) -> Result<(), ConfigError> {
    for username in &config.usernames {
        validate_username(username)?;
    }
    Ok(())
}

/// Usernames end up in URL paths, so only handle characters are allowed
pub(crate) fn validate_username(username: &str) -> Result<(), ConfigError> {
    if username.is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "username '{}' contains invalid characters",
            username
        )));
    }

    Ok(())
}
