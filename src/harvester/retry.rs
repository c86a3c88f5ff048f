//! Retry policy for page fetches
//!
//! Exponential backoff with jitter, plus a separate long cooldown for
//! throttling responses. The policy only answers questions; the fetcher owns
//! the loop.

use crate::config::FetcherConfig;
use reqwest::StatusCode;
use std::time::Duration;

/// How a failed attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeout, connection or transport error; retried on the backoff ladder
    Transient,
    /// The site refused us (HTTP 403); retried after the throttle cooldown
    Throttled,
    /// Any other non-success status; retried on the backoff ladder
    BadStatus,
}

/// Retry settings for one fetcher
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per unit, first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub jitter: Duration,
    pub throttle_cooldown: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter: Duration::from_millis(config.backoff_base_ms / 2),
            throttle_cooldown: Duration::from_secs(config.throttle_cooldown_secs),
        }
    }

    /// Returns true if another attempt is allowed after `attempts` tries
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt following attempt number `attempt` (1-based)
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`, plus jitter.
    pub fn delay_after(&self, attempt: u32, class: FailureClass) -> Duration {
        if class == FailureClass::Throttled {
            return self.throttle_cooldown;
        }

        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            backoff
        } else {
            backoff + Duration::from_millis(fastrand::u64(0..=jitter_ms))
        }
    }

    /// Classifies a response status; `None` means success
    pub fn classify_status(status: StatusCode) -> Option<FailureClass> {
        if status.is_success() {
            None
        } else if status == StatusCode::FORBIDDEN {
            Some(FailureClass::Throttled)
        } else {
            Some(FailureClass::BadStatus)
        }
    }

    /// Classifies a transport-level error
    pub fn classify_error(_error: &reqwest::Error) -> FailureClass {
        FailureClass::Transient
    }
}
