//! Retry / rotation decisions for a single page fetch.
//!
//! ```text
//! Ok ─────────────────────────────────────────────▶ Accept
//! RetryableError ─[retries < max]─────────────────▶ Wait(base^retries + jitter)
//!                ─[exhausted, untried proxy]──────▶ RotateAndRetry
//!                ─[exhausted, no proxy]───────────▶ StopPage
//! Blocked ───────[untried proxy]──────────────────▶ RotateAndRetry
//!                ─[no proxy]──────────────────────▶ StopPage
//! FatalError ─────────────────────────────────────▶ StopPage
//! any non-Ok once total_attempts hits the cap ────▶ StopJob
//! ```

use std::time::Duration;

use crate::classifier::Classification;
use crate::util::jitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// The response is usable.
    Accept,
    /// Sleep, then retry against the same endpoint.
    Wait(Duration),
    /// Switch to an untried proxy and start its attempt counter from zero.
    RotateAndRetry,
    /// Give up on this page; hand back whatever document was last received.
    StopPage,
    /// Give up on the crawl; no document is worth extracting.
    StopJob,
}

/// Where a fetch stands when the policy is consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Retries already spent on the current endpoint.
    pub retries: u32,
    /// Requests issued so far for this page, across all endpoints.
    pub total_attempts: u32,
    /// Whether the pool still has a proxy this fetch has not used.
    pub can_rotate: bool,
}

/// Longest single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff grows as `backoff_base^retries` seconds.
    pub backoff_base: f64,
    /// Upper bound of the random jitter added to each backoff.
    pub max_jitter: Duration,
    /// Safety cap on requests for one page.
    pub max_total_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 1.5,
            max_jitter: Duration::from_millis(500),
            max_total_attempts: 32,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: f64) -> Self {
        Self {
            max_retries,
            backoff_base,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_max_total_attempts(mut self, cap: u32) -> Self {
        self.max_total_attempts = cap;
        self
    }

    /// Backoff before retry number `retries + 1`, without jitter. Capped at [`MAX_BACKOFF`].
    pub fn base_delay(&self, retries: u32) -> Duration {
        let secs = self.backoff_base.powi(retries.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }

    pub fn next_action(&self, state: &AttemptState, classification: Classification) -> RetryAction {
        if classification == Classification::Ok {
            return RetryAction::Accept;
        }
        if state.total_attempts >= self.max_total_attempts {
            return RetryAction::StopJob;
        }

        match classification {
            Classification::Ok => RetryAction::Accept,
            Classification::RetryableError if state.retries < self.max_retries => {
                RetryAction::Wait(self.base_delay(state.retries) + jitter(self.max_jitter))
            }
            Classification::RetryableError | Classification::Blocked => {
                if state.can_rotate {
                    RetryAction::RotateAndRetry
                } else {
                    RetryAction::StopPage
                }
            }
            Classification::FatalError => RetryAction::StopPage,
        }
    }
}
