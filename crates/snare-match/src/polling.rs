//! Blocking retry loop for eventually consistent values.
//!
//! A [`Poller`] evaluates a supplier until a predicate accepts its value or the
//! time budget runs out. The delay between attempts starts at `interval` and
//! is multiplied by `backoff` after every sleep.

use crate::condition::Conditions;
use crate::error::MatchError;
use crate::flow::match_value;
use crate::response::{match_http_response, HttpResponse};
use crate::value::{Captures, Value};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_BACKOFF: f64 = 1.0;
/// Lower bound for the delay between attempts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// The budget elapsed before the predicate accepted a value.
#[derive(Debug)]
pub struct PollTimeout<T> {
    /// Value produced by the final attempt
    pub last: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> fmt::Display for PollTimeout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Polling timed out after {} attempt(s) in {:?}",
            self.attempts, self.elapsed
        )
    }
}

impl<T: fmt::Debug> std::error::Error for PollTimeout<T> {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poller {
    duration: Duration,
    interval: Duration,
    backoff: f64,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            interval: DEFAULT_INTERVAL,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time budget.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Delay before the second attempt, at least [`MIN_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Delay multiplier. Negative or non-finite values fall back to a constant interval.
    pub fn backoff(mut self, backoff: f64) -> Self {
        self.backoff = if backoff.is_finite() && backoff >= 0.0 {
            backoff
        } else {
            DEFAULT_BACKOFF
        };
        self
    }

    pub fn get_duration(&self) -> Duration {
        self.duration
    }

    pub fn get_interval(&self) -> Duration {
        self.interval
    }

    pub fn get_backoff(&self) -> f64 {
        self.backoff
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff)
            .unwrap_or(self.duration)
            .max(MIN_INTERVAL)
    }

    /// Call `supplier` until `until` accepts its value.
    ///
    /// Gives up once the next attempt would start after the budget, returning
    /// the last value produced.
    pub fn poll<T>(
        &self,
        mut supplier: impl FnMut() -> T,
        mut until: impl FnMut(&T) -> bool,
    ) -> Result<T, PollTimeout<T>> {
        let start = Instant::now();
        let mut delay = self.interval;
        let mut attempts = 0u32;
        loop {
            let value = supplier();
            attempts += 1;
            if until(&value) {
                return Ok(value);
            }
            let elapsed = start.elapsed();
            if elapsed + delay > self.duration {
                debug!(attempts, ?elapsed, "polling budget exhausted");
                return Err(PollTimeout {
                    last: value,
                    attempts,
                    elapsed,
                });
            }
            debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "condition not met, retrying"
            );
            thread::sleep(delay);
            delay = self.next_delay(delay);
        }
    }
}

/// Poll `supplier` until `matcher` succeeds, keeping the last mismatch on timeout.
pub fn poll_until_match<T: Into<Value>>(
    poller: &Poller,
    mut supplier: impl FnMut() -> T,
    mut matcher: impl FnMut(&T) -> Result<Captures, MatchError>,
) -> Result<Captures, MatchError> {
    let attempt = || {
        let actual = supplier();
        let outcome = matcher(&actual);
        (actual, outcome)
    };
    match poller.poll(attempt, |(_, outcome)| outcome.is_ok()) {
        Ok((_, outcome)) => outcome,
        Err(timeout) => {
            let (actual, outcome) = timeout.last;
            let last_mismatch = match outcome {
                Err(e) => e,
                Ok(_) => MatchError::mismatch("Polling stopped without a mismatch", "", ""),
            };
            Err(MatchError::PollingTimeout {
                attempts: timeout.attempts,
                elapsed: timeout.elapsed,
                last_actual: Box::new(actual.into()),
                last_mismatch: Box::new(last_mismatch),
            })
        }
    }
}

/// Repeatedly match freshly supplied values against `expected`.
pub fn poll_and_match(
    message: Option<&str>,
    expected: &Value,
    supplier: impl FnMut() -> Value,
    poller: &Poller,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    poll_until_match(poller, supplier, |actual| {
        match_value(message, expected, actual, conditions)
    })
}

/// Repeatedly match freshly supplied responses against `expected`.
pub fn poll_and_match_http_response(
    message: Option<&str>,
    expected: &HttpResponse,
    supplier: impl FnMut() -> HttpResponse,
    poller: &Poller,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    poll_until_match(poller, supplier, |actual| {
        match_http_response(message, expected, actual, conditions)
    })
}
