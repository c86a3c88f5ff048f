//! Rate-limited HTTP fetcher
//!
//! This module handles every HTTP request of a harvest:
//! - Building the HTTP client with the configured request identity
//! - Pacing requests through a shared [`RateLimiter`]
//! - Retrying failed attempts according to a [`RetryPolicy`]
//! - Classifying what is left after the retry budget is spent

use crate::config::{FetcherConfig, IdentityConfig};
use crate::harvester::limiter::RateLimiter;
use crate::harvester::retry::{FailureClass, RetryPolicy};
use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A fetch that failed after its whole retry budget
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("throttled (HTTP 403) after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("HTTP {status} after {attempts} attempts")]
    Fatal { attempts: u32, status: u16 },
}

impl FetchError {
    /// Number of attempts made, first try included
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transient { attempts, .. }
            | Self::Throttled { attempts }
            | Self::Fatal { attempts, .. } => *attempts,
        }
    }
}

/// Body of a successful fetch
#[derive(Debug)]
pub struct RawPage {
    pub status_code: u16,
    pub body: String,
    pub attempts: u32,
}

/// Builds an HTTP client carrying the configured request identity
///
/// # Arguments
///
/// * `identity` - User agent and optional Accept-Language
/// * `timeout` - Per-request timeout
pub fn build_http_client(
    identity: &IdentityConfig,
    timeout: Duration,
) -> Result<Client, crate::HarvestError> {
    let mut headers = HeaderMap::new();
    if let Some(language) = &identity.accept_language {
        let value = HeaderValue::from_str(language).map_err(|_| {
            ConfigError::Validation(format!("invalid accept-language '{}'", language))
        })?;
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    let client = Client::builder()
        .user_agent(identity.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// Fetches pages, one limiter slot per attempt
pub struct Fetcher {
    client: Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    /// HTML page fetcher using the `[fetcher]` pacing
    pub fn for_pages(client: Client, config: &FetcherConfig) -> Self {
        Self::new(
            client,
            RateLimiter::from_millis(config.min_interval_ms, config.jitter_ms),
            RetryPolicy::from_config(config),
        )
    }

    /// Fetches `url`, retrying until success or until the budget is spent
    ///
    /// | Condition | Class | Next attempt |
    /// |-----------|-------|--------------|
    /// | Timeout, connection or body error | Transient | after backoff |
    /// | HTTP 403 | Throttled | after the throttle cooldown |
    /// | Any other non-2xx | Fatal once exhausted | after backoff |
    pub async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let (class, message, status) = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    match RetryPolicy::classify_status(status) {
                        None => match response.text().await {
                            Ok(body) => {
                                tracing::debug!("Fetched {} ({} bytes)", url, body.len());
                                return Ok(RawPage {
                                    status_code: status.as_u16(),
                                    body,
                                    attempts: attempt,
                                });
                            }
                            Err(e) => (FailureClass::Transient, e.to_string(), None),
                        },
                        Some(class) => (class, format!("HTTP {}", status), Some(status.as_u16())),
                    }
                }
                Err(e) => {
                    let message = if e.is_timeout() {
                        "request timeout".to_string()
                    } else {
                        e.to_string()
                    };
                    (RetryPolicy::classify_error(&e), message, None)
                }
            };

            if !self.policy.should_retry(attempt) {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempt,
                    message
                );
                return Err(match (class, status) {
                    (FailureClass::Throttled, _) => FetchError::Throttled { attempts: attempt },
                    (FailureClass::BadStatus, Some(status)) => FetchError::Fatal {
                        attempts: attempt,
                        status,
                    },
                    _ => FetchError::Transient {
                        attempts: attempt,
                        message,
                    },
                });
            }

            let delay = self.policy.delay_after(attempt, class);
            tracing::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                self.policy.max_attempts,
                url,
                message,
                delay
            );
            if class == FailureClass::Throttled {
                self.limiter.cool_down(delay).await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
