//! Wait Mechanisms
//!
//! Bounded polling used by every expectation: read the observable, compare,
//! sleep, repeat until it matches or the deadline passes. Sleeping goes
//! through `tokio::time`, so a waiting check yields to its siblings and
//! paused-clock tests run instantly.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::result::PageCheckResult;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for expectation polling (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default navigation timeout (30 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Upper bound for a backed-off poll interval (1 second)
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 1_000;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Initial polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Interval multiplier after each miss (1.0 = fixed interval)
    pub backoff: f64,
    /// Cap for the backed-off interval in milliseconds
    pub max_poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: 1.0,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Grow the interval by `factor` after each miss, up to `max_ms`
    #[must_use]
    pub const fn with_backoff(mut self, factor: f64, max_ms: u64) -> Self {
        self.backoff = factor;
        self.max_poll_interval_ms = max_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get initial poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff <= 1.0 {
            return current;
        }
        let cap = Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms));
        current.mul_f64(self.backoff).min(cap)
    }
}

/// Whole milliseconds, saturating
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// POLLING
// =============================================================================

/// Result of a bounded poll
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    /// Last value read
    pub last: T,
    /// Whether `last` was accepted
    pub matched: bool,
    /// Number of reads performed
    pub attempts: usize,
    /// Time from first read to the end of polling
    pub elapsed: Duration,
}

/// Read with `read` until `accept` returns true or the timeout elapses.
///
/// The first read happens immediately and the last one happens at the
/// deadline, so a zero timeout still reads once. Errors from `read` end the
/// poll immediately.
pub async fn poll_until<T, F, Fut, P>(
    options: &WaitOptions,
    mut read: F,
    mut accept: P,
) -> PageCheckResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PageCheckResult<T>>,
    P: FnMut(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let mut interval = options.poll_interval();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let value = read().await?;

        if accept(&value) {
            return Ok(PollOutcome {
                last: value,
                matched: true,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome {
                last: value,
                matched: false,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        tracing::trace!(attempts, ?interval, "observable not matched yet");
        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = options.next_interval(interval);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::PageCheckError;
    use std::cell::Cell;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout(), Duration::from_secs(5));
            assert_eq!(opts.poll_interval(), Duration::from_millis(100));
            assert!((opts.backoff - 1.0).abs() < f64::EPSILON);
        }

        #[test]
        fn test_builder() {
            let opts = WaitOptions::new()
                .with_timeout(250)
                .with_poll_interval(10)
                .with_backoff(2.0, 80);
            assert_eq!(opts.timeout_ms, 250);
            assert_eq!(opts.poll_interval_ms, 10);
            assert_eq!(opts.max_poll_interval_ms, 80);
        }

        #[test]
        fn test_fixed_interval() {
            let opts = WaitOptions::new().with_poll_interval(50);
            let next = opts.next_interval(Duration::from_millis(50));
            assert_eq!(next, Duration::from_millis(50));
        }

        #[test]
        fn test_backoff_is_capped() {
            let opts = WaitOptions::new()
                .with_poll_interval(100)
                .with_backoff(2.0, 300);
            let mut interval = opts.poll_interval();
            interval = opts.next_interval(interval);
            assert_eq!(interval, Duration::from_millis(200));
            interval = opts.next_interval(interval);
            assert_eq!(interval, Duration::from_millis(300));
            interval = opts.next_interval(interval);
            assert_eq!(interval, Duration::from_millis(300));
        }

        #[test]
        fn test_millis_saturates() {
            assert_eq!(millis(Duration::from_micros(2_999)), 2);
            assert_eq!(millis(Duration::MAX), u64::MAX);
        }
    }

    mod poll_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_immediate_match_reads_once() {
            let opts = WaitOptions::new();
            let outcome = poll_until(&opts, || async { Ok(7) }, |v| *v == 7)
                .await
                .unwrap();
            assert!(outcome.matched);
            assert_eq!(outcome.attempts, 1);
            assert_eq!(outcome.elapsed, Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_eventual_match() {
            let reads = Cell::new(0);
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(100);
            let outcome = poll_until(
                &opts,
                || {
                    reads.set(reads.get() + 1);
                    let n = reads.get();
                    async move { Ok(n) }
                },
                |v| *v == 3,
            )
            .await
            .unwrap();
            assert!(outcome.matched);
            assert_eq!(outcome.attempts, 3);
            assert_eq!(outcome.elapsed, Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_keeps_last_value() {
            let opts = WaitOptions::new().with_timeout(250).with_poll_interval(100);
            let outcome = poll_until(&opts, || async { Ok("Loading") }, |v| *v == "Uptime")
                .await
                .unwrap();
            assert!(!outcome.matched);
            assert_eq!(outcome.last, "Loading");
            // reads at 0, 100, 200 and the deadline (250)
            assert_eq!(outcome.attempts, 4);
            assert_eq!(outcome.elapsed, Duration::from_millis(250));
        }

        #[tokio::test(start_paused = true)]
        async fn test_zero_timeout_reads_once() {
            let opts = WaitOptions::new().with_timeout(0);
            let outcome = poll_until(&opts, || async { Ok(1) }, |v| *v == 2)
                .await
                .unwrap();
            assert!(!outcome.matched);
            assert_eq!(outcome.attempts, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_read_error_stops_polling() {
            let reads = Cell::new(0);
            let opts = WaitOptions::new();
            let result = poll_until(
                &opts,
                || {
                    reads.set(reads.get() + 1);
                    async { Err::<u32, _>(PageCheckError::page("target closed")) }
                },
                |_| true,
            )
            .await;
            assert!(result.is_err());
            assert_eq!(reads.get(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_backoff_spacing() {
            let opts = WaitOptions::new()
                .with_timeout(10_000)
                .with_poll_interval(100)
                .with_backoff(2.0, 400);
            let reads = Cell::new(0);
            let outcome = poll_until(
                &opts,
                || {
                    reads.set(reads.get() + 1);
                    let n = reads.get();
                    async move { Ok(n) }
                },
                |v| *v == 5,
            )
            .await
            .unwrap();
            // sleeps: 100, 200, 400, 400
            assert_eq!(outcome.elapsed, Duration::from_millis(1_100));
        }
    }
}
