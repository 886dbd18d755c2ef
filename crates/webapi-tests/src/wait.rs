//! Bounded polling waits.
//!
//! Every asynchronous device API interaction follows the same idiom: fire
//! the operation, then poll a side-channel flag until it flips or the
//! budget runs out. [`Wait`] is that poll loop.
//!
//! The loop evaluates the probe first, then sleeps one interval, and gives
//! up only once the elapsed time strictly exceeds the timeout. A probe is
//! therefore evaluated at least once, even with a zero timeout. A probe
//! that returns an error (for example because the remote session went
//! away) stops the wait immediately; only `Ok(false)` is retried.

use crate::result::{WebApiError, WebApiResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
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

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject descriptors the poll loop cannot honour
    pub fn validate(&self) -> WebApiResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(WebApiError::invalid_argument(
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CLOCKS
// =============================================================================

/// Time source for the poll loop
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block for the given duration
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock that only moves when slept on.
///
/// Clones share the same time line, so a probe can observe the clock the
/// wait is sleeping on.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock starting at offset zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Time advanced since creation
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the clock forward without sleeping
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Result of a successful wait
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of probe evaluations
    pub attempts: u32,
    /// Description of what was waited for
    pub waited_for: String,
}

// =============================================================================
// WAIT
// =============================================================================

/// Bounded poll loop over a probe
#[derive(Debug, Clone)]
pub struct Wait<C: Clock = SystemClock> {
    options: WaitOptions,
    clock: C,
}

impl Wait<SystemClock> {
    /// Create a wait on the system clock
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self {
            options,
            clock: SystemClock,
        }
    }
}

impl Default for Wait<SystemClock> {
    fn default() -> Self {
        Self::new(WaitOptions::default())
    }
}

impl<C: Clock> Wait<C> {
    /// Create a wait on a custom clock
    pub const fn with_clock(options: WaitOptions, clock: C) -> Self {
        Self { options, clock }
    }

    /// Wait options in effect
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// The clock this wait sleeps on
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Poll `probe` until it returns `Ok(true)`.
    ///
    /// Returns [`WebApiError::WaitTimeout`] once the elapsed time strictly
    /// exceeds the timeout. Errors from the probe are returned as-is
    /// without further polling.
    pub fn until<F>(&self, waited_for: &str, probe: F) -> WebApiResult<WaitResult>
    where
        F: FnMut() -> WebApiResult<bool>,
    {
        self.options.validate()?;
        poll(
            &self.clock,
            waited_for,
            self.options.timeout(),
            self.options.poll_interval(),
            probe,
        )
    }

    /// Poll an infallible probe
    pub fn until_true<F>(&self, waited_for: &str, mut probe: F) -> WebApiResult<WaitResult>
    where
        F: FnMut() -> bool,
    {
        self.until(waited_for, || Ok(probe()))
    }
}

/// The poll loop proper; `interval` must be non-zero
fn poll<C, F>(
    clock: &C,
    waited_for: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> WebApiResult<WaitResult>
where
    C: Clock,
    F: FnMut() -> WebApiResult<bool>,
{
    let start = clock.now();
    let mut attempts = 0_u32;

    loop {
        attempts += 1;
        if probe()? {
            let elapsed = clock.now().duration_since(start);
            debug!(waited_for, attempts, ?elapsed, "wait satisfied");
            return Ok(WaitResult {
                elapsed,
                attempts,
                waited_for: waited_for.to_string(),
            });
        }

        let elapsed = clock.now().duration_since(start);
        if elapsed > timeout {
            debug!(waited_for, attempts, ?elapsed, "wait timed out");
            return Err(WebApiError::WaitTimeout {
                waited_for: waited_for.to_string(),
                ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        trace!(waited_for, attempts, "probe false, sleeping");
        clock.sleep(interval);
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Poll `probe` every `interval` until it is true or `timeout` is exceeded
pub fn wait_until<F>(probe: F, timeout: Duration, interval: Duration) -> WebApiResult<()>
where
    F: FnMut() -> WebApiResult<bool>,
{
    if interval.is_zero() {
        return Err(WebApiError::invalid_argument(
            "poll interval must be greater than zero",
        ));
    }
    poll(&SystemClock, "custom probe", timeout, interval, probe)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_wait_options_default() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, 30_000);
            assert_eq!(opts.poll_interval_ms, 500);
        }

        #[test]
        fn test_wait_options_chained() {
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(20);
            assert_eq!(opts.timeout(), Duration::from_secs(1));
            assert_eq!(opts.poll_interval(), Duration::from_millis(20));
        }

        #[test]
        fn test_zero_interval_rejected() {
            let opts = WaitOptions::new().with_poll_interval(0);
            assert!(matches!(
                opts.validate(),
                Err(WebApiError::InvalidArgument { .. })
            ));
        }

        #[test]
        fn test_wait_options_deserialize_partial() {
            let opts: WaitOptions = serde_json::from_str(r#"{"timeout_ms": 5}"#).unwrap();
            assert_eq!(opts.timeout_ms, 5);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }
    }

    mod manual_clock_tests {
        use super::*;

        #[test]
        fn test_sleep_advances_shared_timeline() {
            let clock = ManualClock::new();
            let other = clock.clone();
            let before = clock.now();
            other.sleep(Duration::from_millis(250));
            assert_eq!(clock.now().duration_since(before), Duration::from_millis(250));
            assert_eq!(clock.elapsed(), Duration::from_millis(250));
        }
    }

    mod wait_tests {
        use super::*;

        fn manual_wait(timeout_ms: u64, interval_ms: u64) -> Wait<ManualClock> {
            Wait::with_clock(
                WaitOptions::new()
                    .with_timeout(timeout_ms)
                    .with_poll_interval(interval_ms),
                ManualClock::new(),
            )
        }

        #[test]
        fn test_immediate_success() {
            let wait = manual_wait(1_000, 100);
            let result = wait.until_true("ready", || true).unwrap();
            assert_eq!(result.attempts, 1);
            assert_eq!(result.elapsed, Duration::ZERO);
            assert_eq!(result.waited_for, "ready");
        }

        #[test]
        fn test_zero_timeout_still_evaluates_once() {
            let wait = manual_wait(0, 100);
            let calls = Cell::new(0);
            let result = wait.until_true("flag", || {
                calls.set(calls.get() + 1);
                true
            });
            assert!(result.is_ok());
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn test_zero_timeout_false_probe_times_out() {
            let wait = manual_wait(0, 100);
            let calls = Cell::new(0);
            let result = wait.until_true("flag", || {
                calls.set(calls.get() + 1);
                false
            });
            assert!(matches!(result, Err(WebApiError::WaitTimeout { ms: 0, .. })));
            // evaluated at t=0, slept, evaluated again at t=100 which exceeds 0
            assert_eq!(calls.get(), 2);
        }

        #[test]
        fn test_timeout_reports_budget() {
            let wait = manual_wait(1_000, 500);
            match wait.until_true("rcvd_success", || false) {
                Err(WebApiError::WaitTimeout { waited_for, ms }) => {
                    assert_eq!(waited_for, "rcvd_success");
                    assert_eq!(ms, 1_000);
                }
                other => panic!("expected WaitTimeout, got {other:?}"),
            }
            assert_eq!(wait.clock().elapsed(), Duration::from_millis(1_500));
        }

        #[test]
        fn test_probe_error_propagates_without_waiting() {
            let wait = manual_wait(30_000, 500);
            let result = wait.until("flag", || Err(WebApiError::session("connection reset")));
            assert!(matches!(result, Err(WebApiError::Session { .. })));
            assert_eq!(wait.clock().elapsed(), Duration::ZERO);
        }

        #[test]
        fn test_probe_error_after_false_results() {
            let wait = manual_wait(30_000, 500);
            let calls = Cell::new(0);
            let result = wait.until("flag", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Ok(false)
                } else {
                    Err(WebApiError::session("gone"))
                }
            });
            assert!(matches!(result, Err(WebApiError::Session { .. })));
            assert_eq!(wait.clock().elapsed(), Duration::from_millis(1_000));
        }

        #[test]
        fn test_zero_interval_is_invalid() {
            let wait = manual_wait(100, 0);
            assert!(matches!(
                wait.until_true("x", || true),
                Err(WebApiError::InvalidArgument { .. })
            ));
        }

        #[test]
        fn test_system_clock_timeout_is_not_early() {
            let wait = Wait::new(WaitOptions::new().with_timeout(60).with_poll_interval(10));
            let start = Instant::now();
            let result = wait.until_true("never", || false);
            assert!(result.is_err());
            assert!(start.elapsed() >= Duration::from_millis(60));
        }

        #[test]
        fn test_wait_until_convenience() {
            let calls = Cell::new(0);
            let result = wait_until(
                || {
                    calls.set(calls.get() + 1);
                    Ok(calls.get() >= 3)
                },
                Duration::from_millis(500),
                Duration::from_millis(5),
            );
            assert!(result.is_ok());
            assert_eq!(calls.get(), 3);
        }

        #[test]
        fn test_wait_until_sub_millisecond_interval() {
            let result = wait_until(
                || Ok(true),
                Duration::from_millis(10),
                Duration::from_micros(500),
            );
            assert!(result.is_ok());
        }

        #[test]
        fn test_wait_until_zero_interval_rejected() {
            let result = wait_until(|| Ok(true), Duration::from_millis(10), Duration::ZERO);
            assert!(matches!(result, Err(WebApiError::InvalidArgument { .. })));
        }

        #[test]
        fn test_sub_millisecond_budget_is_kept() {
            let clock = ManualClock::new();
            let calls = Cell::new(0);
            let result = poll(
                &clock,
                "never",
                Duration::from_micros(1_500),
                Duration::from_micros(500),
                || {
                    calls.set(calls.get() + 1);
                    Ok(false)
                },
            );
            assert!(matches!(result, Err(WebApiError::WaitTimeout { ms: 1, .. })));
            assert_eq!(calls.get(), 5);
            assert_eq!(clock.elapsed(), Duration::from_micros(2_000));
        }
    }

    proptest! {
        #[test]
        fn prop_success_exactly_after_k_intervals(
            interval_ms in 1u64..1_000,
            k in 0u32..20,
            slack in 0u64..5_000,
        ) {
            let target = Duration::from_millis(interval_ms) * k;
            let timeout_ms = target.as_millis() as u64 + slack;
            let clock = ManualClock::new();
            let probe_clock = clock.clone();
            let wait = Wait::with_clock(
                WaitOptions::new().with_timeout(timeout_ms).with_poll_interval(interval_ms),
                clock,
            );
            let result = wait.until_true("k intervals", || probe_clock.elapsed() >= target).unwrap();
            prop_assert_eq!(result.elapsed, target);
            prop_assert_eq!(result.attempts, k + 1);
        }

        #[test]
        fn prop_never_true_times_out_after_budget(
            interval_ms in 1u64..1_000,
            timeout_ms in 0u64..10_000,
        ) {
            let wait = Wait::with_clock(
                WaitOptions::new().with_timeout(timeout_ms).with_poll_interval(interval_ms),
                ManualClock::new(),
            );
            let result = wait.until_true("never", || false);
            prop_assert!(result.is_err());
            let elapsed = wait.clock().elapsed();
            prop_assert!(elapsed > Duration::from_millis(timeout_ms));
            prop_assert!(elapsed <= Duration::from_millis(timeout_ms + interval_ms));
        }
    }
}
