//! Cadence estimation from crank revolution samples.

use std::time::{Duration, Instant};

use crate::protocol::csc::CrankSample;

/// Derives crank RPM from successive [`CrankSample`]s.
///
/// Both sample counters wrap modulo 65536, so deltas use wrapping
/// subtraction. Many sensors keep sending notifications while the crank is
/// stopped; a sample whose counters did not advance leaves the estimate and
/// its freshness timestamp untouched, which lets staleness detect a stopped
/// crank even under a steady notification stream.
#[derive(Debug)]
pub struct CadenceEstimator {
    prev: Option<CrankSample>,
    rpm: f64,
    last_update: Option<Instant>,
    stale_after: Duration,
}

impl CadenceEstimator {
    /// Default staleness threshold.
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3);

    /// Create an estimator with the default staleness threshold.
    pub fn new() -> Self {
        Self::with_stale_after(Self::DEFAULT_STALE_AFTER)
    }

    /// Create an estimator with a custom staleness threshold.
    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            prev: None,
            rpm: 0.0,
            last_update: None,
            stale_after,
        }
    }

    /// Feed a new crank sample and return the current RPM estimate.
    pub fn update(&mut self, sample: CrankSample) -> f64 {
        self.update_at(sample, Instant::now())
    }

    /// Feed a new crank sample with an explicit "now" (tests simulate time).
    ///
    /// The first sample only seeds the delta baseline and returns 0.
    pub fn update_at(&mut self, sample: CrankSample, now: Instant) -> f64 {
        let Some(prev) = self.prev.replace(sample) else {
            self.rpm = 0.0;
            self.last_update = Some(now);
            return 0.0;
        };

        let delta_revs = sample
            .cumulative_revolutions
            .wrapping_sub(prev.cumulative_revolutions);
        let delta_ticks = sample.event_time_ticks.wrapping_sub(prev.event_time_ticks);

        if delta_revs == 0 || delta_ticks == 0 {
            return self.rpm;
        }

        let delta_seconds = f64::from(delta_ticks) / 1024.0;
        self.rpm = (f64::from(delta_revs) / delta_seconds) * 60.0;
        self.last_update = Some(now);
        self.rpm
    }

    /// Whether a successful update happened within the staleness threshold.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }

    /// Freshness check against an explicit "now".
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        match self.last_update {
            Some(at) => now.saturating_duration_since(at) <= self.stale_after,
            None => false,
        }
    }

    /// Current RPM, or 0 once the estimate has gone stale.
    pub fn current_rpm(&self) -> f64 {
        self.current_rpm_at(Instant::now())
    }

    /// Staleness-aware RPM against an explicit "now".
    pub fn current_rpm_at(&self, now: Instant) -> f64 {
        if self.is_fresh_at(now) {
            self.rpm
        } else {
            0.0
        }
    }

    /// Last computed RPM, ignoring staleness.
    pub fn last_rpm(&self) -> f64 {
        self.rpm
    }
}

impl Default for CadenceEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(revs: u16, ticks: u16) -> CrankSample {
        CrankSample {
            cumulative_revolutions: revs,
            event_time_ticks: ticks,
        }
    }

    #[test]
    fn test_first_sample_returns_zero() {
        let mut est = CadenceEstimator::new();
        let now = Instant::now();
        assert_eq!(est.update_at(sample(100, 1000), now), 0.0);
        // The baseline sample still marks the estimator fresh.
        assert!(est.is_fresh_at(now));
    }

    #[test]
    fn test_steady_cadence() {
        let mut est = CadenceEstimator::new();
        let now = Instant::now();
        est.update_at(sample(0, 0), now);
        // One revolution per second: 1024 ticks, 1 rev.
        let rpm = est.update_at(sample(1, 1024), now);
        assert!((rpm - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_wraparound() {
        let mut est = CadenceEstimator::new();
        let now = Instant::now();
        est.update_at(sample(65534, 65500), now);
        let rpm = est.update_at(sample(1, 100), now);

        // deltaRevs = 3, deltaTicks = 636 across the wrap.
        let expected = (3.0 / (636.0 / 1024.0)) * 60.0;
        assert!(rpm > 0.0);
        assert!((rpm - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_delta_keeps_estimate_and_freshness() {
        let mut est = CadenceEstimator::with_stale_after(Duration::from_secs(3));
        let start = Instant::now();
        est.update_at(sample(10, 1000), start);
        let rpm = est.update_at(sample(11, 2024), start);
        assert!(rpm > 0.0);

        // Identical counters four seconds later: RPM is reported unchanged
        // but the freshness window was not extended, so the estimate reads
        // as stale.
        let later = start + Duration::from_secs(4);
        let unchanged = est.update_at(sample(11, 2024), later);
        assert_eq!(unchanged, rpm);
        assert!(!est.is_fresh_at(later));
        assert_eq!(est.current_rpm_at(later), 0.0);
        assert_eq!(est.last_rpm(), rpm);
    }

    #[test]
    fn test_freshness_window() {
        let mut est = CadenceEstimator::with_stale_after(Duration::from_secs(3));
        let start = Instant::now();
        est.update_at(sample(0, 0), start);
        est.update_at(sample(1, 1024), start);

        assert!(est.is_fresh_at(start + Duration::from_secs(3)));
        assert!(!est.is_fresh_at(start + Duration::from_millis(3001)));
        assert_eq!(est.current_rpm_at(start + Duration::from_secs(1)), 60.0);
    }

    #[test]
    fn test_no_samples_is_stale() {
        let est = CadenceEstimator::new();
        assert!(!est.is_fresh());
        assert_eq!(est.current_rpm(), 0.0);
    }
}
