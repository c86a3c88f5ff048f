//! Request pacing shared by every worker of a fetcher

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces requests at least `min_interval` apart, plus random jitter
///
/// The next permitted instant sits behind one async mutex that is held across
/// the spacing sleep, so a waiting worker always sees the instant written by
/// the worker before it.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn from_millis(min_interval_ms: u64, jitter_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(min_interval_ms),
            Duration::from_millis(jitter_ms),
        )
    }

    /// Floor plus a random share of the jitter; never below the floor
    fn next_interval(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.min_interval;
        }
        self.min_interval + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }

    /// Waits for the next request slot and claims it
    pub async fn acquire(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next_allowed = Some(Instant::now() + self.next_interval());
    }

    /// Holds back every worker for `cooldown`
    pub async fn cool_down(&self, cooldown: Duration) {
        let mut next_allowed = self.next_allowed.lock().await;
        let until = Instant::now() + cooldown;
        if next_allowed.map_or(true, |at| at < until) {
            *next_allowed = Some(until);
        }
        tracing::warn!("Throttled, pausing requests for {:?}", cooldown);
    }
}
