//! Retry policy for outbound pushes
//!
//! The executor never sleeps inline: a failed push asks the policy for the
//! next delay and schedules a timer, so a newer event for the same target can
//! replace the pending retry.

use std::time::Duration;

/// How often, and how far apart, a transient push failure is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt of an event
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any delay, including server hints
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,

    /// Stretch each delay by up to 25% so targets failing together spread out
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Near-instant retries for tests and local runs
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Exponential delay after `retries_done` retries, capped at `max_backoff`
    /// with jitter included
    pub fn backoff_duration(&self, retries_done: u32) -> Duration {
        let exponent = retries_done.min(i32::MAX as u32) as i32;
        let cap = self.max_backoff.as_secs_f64();
        let delay = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent)).min(cap);

        let delay = if self.jitter {
            (delay * (1.0 + jitter_fraction() * 0.25)).min(cap)
        } else {
            delay
        };

        Duration::from_secs_f64(delay)
    }

    /// Delay before the next attempt, or `None` once the event is out of retries.
    ///
    /// `retries_done` counts the retries already performed for this event.
    pub fn next_delay(&self, retries_done: u32, decision: RetryDecision) -> Option<Duration> {
        match decision {
            RetryDecision::NoRetry => None,
            _ if retries_done >= self.max_retries => None,
            RetryDecision::RetryAfter(d) => Some(d.min(self.max_backoff)),
            RetryDecision::Retry => Some(self.backoff_duration(retries_done)),
        }
    }
}

// Clock-derived value in [0, 1); good enough to decorrelate timers
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    f64::from(nanos % 1000) / 1000.0
}

/// What a failed push asks of the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Use the exponential backoff
    Retry,
    /// The ATS named its own delay (`Retry-After`)
    RetryAfter(Duration),
    /// Rejected outright; retrying cannot help
    NoRetry,
}

/// Errors that know whether the push behind them is worth repeating
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}
