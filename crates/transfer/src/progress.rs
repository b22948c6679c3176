//! Synthetic progress for UI feedback.
//!
//! Chunk acknowledgements say little about how long an upload really takes:
//! most of the wait is the service storing the payload after the last chunk.
//! The estimator is therefore a pure function of elapsed time and the static
//! size of the payload, never of acknowledged chunks.
//!
//! - While transferring, the fraction follows `TRANSFER_CEILING * (1 - e^(-t/tau))`,
//!   approaching but never reaching [`TRANSFER_CEILING`].
//! - Once finalization starts, it ramps linearly from [`TRANSFER_CEILING`] to
//!   [`FINALIZE_CEILING`] over a fixed window and holds there.
//! - It reports `1.0` only after [`ProgressEstimator::finish`].

use std::time::Duration;

/// Asymptote of the transfer curve.
pub const TRANSFER_CEILING: f64 = 0.90;

/// Upper bound of the finalize ramp.
pub const FINALIZE_CEILING: f64 = 0.99;

/// Default length of the finalize ramp.
const DEFAULT_FINALIZE_WINDOW: Duration = Duration::from_secs(60);

/// Fixed part of the time constant, in seconds.
const BASE_SECS: f64 = 3.0;

/// Throughput assumed when scaling the curve to the payload size.
const ASSUMED_BYTES_PER_SEC: f64 = 2.0 * 1024.0 * 1024.0;

/// Extra seconds per packaged item.
const PER_ITEM_SECS: f64 = 0.05;

/// Phase reported alongside a progress fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Transferring,
    Finalizing,
    Done,
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    pub elapsed: Duration,
    pub phase: ProgressPhase,
    pub fraction: f64,
}

/// Time constant (seconds) of the transfer curve for a payload.
pub fn time_constant(item_count: u64, total_bytes: u64) -> f64 {
    BASE_SECS + total_bytes as f64 / ASSUMED_BYTES_PER_SEC + item_count as f64 * PER_ITEM_SECS
}

/// Diminishing-returns curve: 0 at `elapsed == 0`, bounded by [`TRANSFER_CEILING`].
pub fn transfer_curve(elapsed: Duration, tau_secs: f64) -> f64 {
    let tau = tau_secs.max(f64::EPSILON);
    let fraction = TRANSFER_CEILING * (1.0 - (-elapsed.as_secs_f64() / tau).exp());
    fraction.clamp(0.0, TRANSFER_CEILING)
}

/// Bounded linear ramp from `start` to [`FINALIZE_CEILING`] over `window`.
pub fn finalize_ramp(start: f64, since: Duration, window: Duration) -> f64 {
    let start = start.min(FINALIZE_CEILING);
    if window.is_zero() {
        return FINALIZE_CEILING;
    }
    let t = (since.as_secs_f64() / window.as_secs_f64()).min(1.0);
    start + (FINALIZE_CEILING - start) * t
}

/// Produces a non-decreasing progress fraction for one pipeline run.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    tau_secs: f64,
    finalize_window: Duration,
    finalizing_since: Option<Duration>,
    done: bool,
    last: f64,
}

impl ProgressEstimator {
    /// Creates an estimator for `item_count` items totalling `total_bytes`.
    pub fn new(item_count: u64, total_bytes: u64) -> Self {
        Self {
            tau_secs: time_constant(item_count, total_bytes),
            finalize_window: DEFAULT_FINALIZE_WINDOW,
            finalizing_since: None,
            done: false,
            last: 0.0,
        }
    }

    /// Overrides the length of the finalize ramp.
    pub fn with_finalize_window(mut self, window: Duration) -> Self {
        self.finalize_window = window;
        self
    }

    /// Switches to the finalize ramp at `elapsed`. Later calls are ignored.
    pub fn enter_finalizing(&mut self, elapsed: Duration) {
        if self.finalizing_since.is_none() {
            self.finalizing_since = Some(elapsed);
        }
    }

    /// Marks real terminal success; the fraction becomes `1.0`.
    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn phase(&self) -> ProgressPhase {
        if self.done {
            ProgressPhase::Done
        } else if self.finalizing_since.is_some() {
            ProgressPhase::Finalizing
        } else {
            ProgressPhase::Transferring
        }
    }

    /// Raw fraction at `elapsed`, without the monotonic clamp.
    pub fn fraction_at(&self, elapsed: Duration) -> f64 {
        if self.done {
            return 1.0;
        }
        match self.finalizing_since {
            Some(since) => finalize_ramp(
                TRANSFER_CEILING,
                elapsed.saturating_sub(since),
                self.finalize_window,
            ),
            None => transfer_curve(elapsed, self.tau_secs),
        }
    }

    /// Samples the estimator. The returned fraction never decreases between calls.
    pub fn sample(&mut self, elapsed: Duration) -> ProgressState {
        let fraction = self.fraction_at(elapsed).max(self.last);
        self.last = fraction;
        ProgressState {
            elapsed,
            phase: self.phase(),
            fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn starts_at_zero() {
        let mut est = ProgressEstimator::new(1, 1024);
        let state = est.sample(Duration::ZERO);
        assert_eq!(state.fraction, 0.0);
        assert_eq!(state.phase, ProgressPhase::Transferring);
    }

    #[test]
    fn transfer_curve_never_reaches_ceiling() {
        let tau = time_constant(1, 10 * 1024 * 1024);
        let mut prev = 0.0;
        for t in [0.1, 1.0, 5.0, 15.0, 30.0] {
            let f = transfer_curve(secs(t), tau);
            assert!(f > prev, "curve must increase: {prev} -> {f} at {t}s");
            assert!(f <= TRANSFER_CEILING);
            prev = f;
        }
        assert!(transfer_curve(secs(3600.0), tau) <= TRANSFER_CEILING);
    }

    #[test]
    fn larger_payloads_progress_slower() {
        let small = time_constant(1, 1024);
        let large = time_constant(500, 500 * 1024 * 1024);
        assert!(transfer_curve(secs(10.0), small) > transfer_curve(secs(10.0), large));
    }

    #[test]
    fn finalize_ramp_is_bounded() {
        let window = secs(60.0);
        assert_eq!(finalize_ramp(TRANSFER_CEILING, Duration::ZERO, window), TRANSFER_CEILING);
        let mid = finalize_ramp(TRANSFER_CEILING, secs(30.0), window);
        assert!((mid - 0.945).abs() < 1e-9);
        assert_eq!(finalize_ramp(TRANSFER_CEILING, secs(600.0), window), FINALIZE_CEILING);
        assert_eq!(finalize_ramp(0.5, secs(1.0), Duration::ZERO), FINALIZE_CEILING);
    }

    #[test]
    fn finalizing_switch_never_goes_backwards() {
        let mut est = ProgressEstimator::new(3, 3 * 1024 * 1024).with_finalize_window(secs(10.0));
        let before = est.sample(secs(2.0)).fraction;
        est.enter_finalizing(secs(2.0));
        let after = est.sample(secs(2.0));
        assert_eq!(after.phase, ProgressPhase::Finalizing);
        assert!(after.fraction >= before);
        assert!(after.fraction >= TRANSFER_CEILING);

        let later = est.sample(secs(100.0));
        assert_eq!(later.fraction, FINALIZE_CEILING);
    }

    #[test]
    fn enter_finalizing_is_idempotent() {
        let mut est = ProgressEstimator::new(1, 0).with_finalize_window(secs(10.0));
        est.enter_finalizing(secs(1.0));
        est.enter_finalizing(secs(9.0));
        assert!((est.fraction_at(secs(6.0)) - (TRANSFER_CEILING + 0.045)).abs() < 1e-9);
    }

    #[test]
    fn sample_is_monotonic_even_with_out_of_order_times() {
        let mut est = ProgressEstimator::new(10, 50 * 1024 * 1024);
        let mut last = 0.0;
        let times = [0.0, 1.0, 3.0, 2.0, 8.0, 8.0, 4.0, 20.0];
        for (i, t) in times.into_iter().enumerate() {
            if i == 5 {
                est.enter_finalizing(secs(t));
            }
            let f = est.sample(secs(t)).fraction;
            assert!(f >= last, "fraction decreased at step {i}: {last} -> {f}");
            assert!(f < 1.0);
            last = f;
        }
    }

    #[test]
    fn finish_reports_complete() {
        let mut est = ProgressEstimator::new(1, 1);
        est.sample(secs(1.0));
        est.finish();
        let state = est.sample(secs(1.5));
        assert_eq!(state.fraction, 1.0);
        assert_eq!(state.phase, ProgressPhase::Done);
    }
}
