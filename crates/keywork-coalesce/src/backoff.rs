//! Backoff strategies for retried executions.

use std::sync::Arc;
use std::time::Duration;

/// Pluggable delay computation between retry attempts.
pub trait IntervalFunction: Send + Sync {
    /// Returns the delay before retry number `attempt` (zero-based).
    fn interval(&self, attempt: usize) -> Duration;
}

/// The same delay before every retry.
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    /// Creates a fixed interval.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IntervalFunction for FixedInterval {
    fn interval(&self, _attempt: usize) -> Duration {
        self.interval
    }
}

/// Exponentially growing delays: `initial * multiplier^attempt`, optionally
/// clamped to a maximum.
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff with a doubling multiplier.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max: None,
        }
    }

    /// Sets the growth multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Clamps every delay to `max`.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn interval(&self, attempt: usize) -> Duration {
        let delay = self.initial.mul_f64(self.multiplier.powi(attempt as i32));
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Function-based interval for fully custom schedules.
pub struct FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Creates an interval from a function of the attempt number.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}

/// Retry policy for a coalesced execution: how many times to retry a failed
/// producer and how long to wait between attempts.
#[derive(Clone)]
pub enum RetryPolicy {
    /// Fail on the first producer error.
    Never,
    /// Retry up to `max_retries` times, delays from the interval function.
    Retry {
        /// Number of retries after the initial attempt.
        max_retries: usize,
        /// Delay schedule, indexed by zero-based retry number.
        interval: Arc<dyn IntervalFunction>,
    },
}

impl RetryPolicy {
    /// No retries.
    pub fn never() -> Self {
        RetryPolicy::Never
    }

    /// `max_retries` retries with the same delay between attempts.
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        RetryPolicy::Retry {
            max_retries,
            interval: Arc::new(FixedInterval::new(delay)),
        }
    }

    /// `max_retries` retries with doubling delays starting at `initial`.
    pub fn exponential(max_retries: usize, initial: Duration) -> Self {
        RetryPolicy::Retry {
            max_retries,
            interval: Arc::new(ExponentialBackoff::new(initial)),
        }
    }

    /// `max_retries` retries with exponential delays and a custom factor.
    pub fn exponential_with(max_retries: usize, initial: Duration, multiplier: f64) -> Self {
        RetryPolicy::Retry {
            max_retries,
            interval: Arc::new(ExponentialBackoff::new(initial).with_multiplier(multiplier)),
        }
    }

    /// `max_retries` retries with delays from `f(attempt)`.
    pub fn custom<F>(max_retries: usize, f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        RetryPolicy::Retry {
            max_retries,
            interval: Arc::new(FnInterval::new(f)),
        }
    }

    /// The delay before the next retry, given how many retries have already
    /// run; `None` when the policy is exhausted.
    pub fn next_delay(&self, retries_so_far: usize) -> Option<Duration> {
        match self {
            RetryPolicy::Never => None,
            RetryPolicy::Retry {
                max_retries,
                interval,
            } => {
                if retries_so_far < *max_retries {
                    Some(interval.interval(retries_so_far))
                } else {
                    None
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Never
    }
}
