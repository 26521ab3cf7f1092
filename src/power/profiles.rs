//! The built-in power profile strategies.
//!
//! Fractional watts truncate toward zero throughout; trainers take integer
//! targets and the truncation matches the observed controller behavior.

use std::time::Duration;

use tracing::debug;

use crate::actuation::TargetPowerSample;
use crate::power::random::RandomSource;
use crate::power::PowerProfile;

/// Fixed wattage, forever.
#[derive(Debug, Clone)]
pub struct ConstantPower {
    watts: u16,
}

impl ConstantPower {
    /// Create a constant profile.
    pub fn new(watts: u16) -> Self {
        Self { watts }
    }
}

impl PowerProfile for ConstantPower {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn tick(&mut self, _elapsed: Duration, _cadence_rpm: Option<f64>) -> TargetPowerSample {
        TargetPowerSample {
            watts: self.watts,
            phase: "constant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalPhase {
    High,
    Low,
}

/// Tabata-style alternation: `high` watts for `high_duration`, then
/// `high * low_ratio` watts for `low_duration`, repeating. Phase switches
/// occur exactly at the duration boundary and reset the phase clock.
#[derive(Debug, Clone)]
pub struct IntervalPower {
    high: u16,
    low: u16,
    high_duration: Duration,
    low_duration: Duration,
    phase: IntervalPhase,
    phase_started: Duration,
}

impl IntervalPower {
    /// Create an interval profile. `low_ratio` scales the high wattage down
    /// for the recovery phase (0.5 gives the classic 20 s on / 10 s off
    /// Tabata at half load).
    pub fn new(high: u16, low_ratio: f64, high_duration: Duration, low_duration: Duration) -> Self {
        Self {
            high,
            low: (f64::from(high) * low_ratio) as u16,
            high_duration,
            low_duration,
            phase: IntervalPhase::High,
            phase_started: Duration::ZERO,
        }
    }
}

impl PowerProfile for IntervalPower {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn tick(&mut self, elapsed: Duration, _cadence_rpm: Option<f64>) -> TargetPowerSample {
        let in_phase = elapsed.saturating_sub(self.phase_started);
        let boundary = match self.phase {
            IntervalPhase::High => self.high_duration,
            IntervalPhase::Low => self.low_duration,
        };

        if in_phase >= boundary {
            self.phase = match self.phase {
                IntervalPhase::High => IntervalPhase::Low,
                IntervalPhase::Low => IntervalPhase::High,
            };
            self.phase_started = elapsed;
            debug!(phase = ?self.phase, "interval phase switch");
        }

        match self.phase {
            IntervalPhase::High => TargetPowerSample {
                watts: self.high,
                phase: "high",
            },
            IntervalPhase::Low => TargetPowerSample {
                watts: self.low,
                phase: "low",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RampPhase {
    Up,
    Down,
}

/// Linear ramp from `low` to `high` over `ramp_up`, then back down over
/// `ramp_down`, repeating. The phase flips exactly when progress reaches
/// 1.0, resetting the phase clock.
#[derive(Debug, Clone)]
pub struct PyramidPower {
    low: u16,
    high: u16,
    ramp_up: Duration,
    ramp_down: Duration,
    phase: RampPhase,
    phase_started: Duration,
}

impl PyramidPower {
    /// Create a pyramid profile.
    pub fn new(low: u16, high: u16, ramp_up: Duration, ramp_down: Duration) -> Self {
        Self {
            low,
            high,
            ramp_up,
            ramp_down,
            phase: RampPhase::Up,
            phase_started: Duration::ZERO,
        }
    }
}

impl PowerProfile for PyramidPower {
    fn name(&self) -> &'static str {
        "pyramid"
    }

    fn tick(&mut self, elapsed: Duration, _cadence_rpm: Option<f64>) -> TargetPowerSample {
        let ramp = match self.phase {
            RampPhase::Up => self.ramp_up,
            RampPhase::Down => self.ramp_down,
        };
        let progress =
            elapsed.saturating_sub(self.phase_started).as_secs_f64() / ramp.as_secs_f64();
        let span = f64::from(self.high) - f64::from(self.low);

        let watts = if progress >= 1.0 {
            // Flip at the boundary and emit the boundary value itself.
            self.phase_started = elapsed;
            match self.phase {
                RampPhase::Up => {
                    self.phase = RampPhase::Down;
                    debug!("pyramid peak reached, ramping down");
                    self.high
                }
                RampPhase::Down => {
                    self.phase = RampPhase::Up;
                    debug!("pyramid cycle complete, ramping up");
                    self.low
                }
            }
        } else {
            match self.phase {
                RampPhase::Up => (f64::from(self.low) + span * progress) as u16,
                RampPhase::Down => (f64::from(self.high) - span * progress) as u16,
            }
        };

        TargetPowerSample {
            watts,
            phase: match self.phase {
                RampPhase::Up => "up",
                RampPhase::Down => "down",
            },
        }
    }
}

/// Continuous oscillation between `low` and `high` over `period`:
/// `watts(t) = low + (high - low) * (sin(2π t / period) + 1) / 2`.
/// Purely continuous; there is no discrete phase to jump between.
#[derive(Debug, Clone)]
pub struct SinePower {
    low: u16,
    high: u16,
    period: Duration,
}

impl SinePower {
    /// Create a sine profile.
    pub fn new(low: u16, high: u16, period: Duration) -> Self {
        Self { low, high, period }
    }

    fn wave_position(&self, elapsed: Duration) -> f64 {
        let period = self.period.as_secs_f64();
        let progress = (elapsed.as_secs_f64() % period) / period;
        ((progress * std::f64::consts::TAU).sin() + 1.0) / 2.0
    }
}

impl PowerProfile for SinePower {
    fn name(&self) -> &'static str {
        "sine"
    }

    fn tick(&mut self, elapsed: Duration, _cadence_rpm: Option<f64>) -> TargetPowerSample {
        let wave = self.wave_position(elapsed);
        let span = f64::from(self.high) - f64::from(self.low);
        let watts = (f64::from(self.low) + span * wave) as u16;

        let phase = if wave < 0.33 {
            "low"
        } else if wave > 0.67 {
            "high"
        } else {
            "mid"
        };

        TargetPowerSample { watts, phase }
    }
}

/// Smallest peak multiplier the scheduler will draw.
pub const MIN_PEAK_MULTIPLIER: f64 = 1.2;
/// Shortest peak, in seconds (reached at the maximum multiplier).
pub const MIN_PEAK_SECONDS: f64 = 3.0;
/// Longest peak, in seconds (reached at the minimum multiplier).
pub const MAX_PEAK_SECONDS: f64 = 15.0;

/// Peak duration for a multiplier: inverse linear interpolation of the
/// normalized multiplier onto `[15, 3]` seconds — higher power, shorter
/// peak — truncated to whole seconds and clamped.
pub fn peak_duration_secs(multiplier: f64, max_multiplier: f64) -> f64 {
    let denom = max_multiplier - MIN_PEAK_MULTIPLIER;
    let normalized = if denom > f64::EPSILON {
        (multiplier - MIN_PEAK_MULTIPLIER) / denom
    } else {
        0.0
    };
    (MAX_PEAK_SECONDS - normalized * (MAX_PEAK_SECONDS - MIN_PEAK_SECONDS))
        .floor()
        .clamp(MIN_PEAK_SECONDS, MAX_PEAK_SECONDS)
}

#[derive(Debug, Clone, Copy)]
struct ActivePeak {
    started_at: f64,
    watts: u16,
    duration: f64,
}

/// Baseline watts with randomly scheduled peaks.
///
/// The scheduler draws a multiplier uniform in `[1.2, max_multiplier]` and a
/// start offset for the next peak; the first peak lands 3–10 s after start,
/// every later one 5–20 s after the previous peak ends. The random source is
/// injected so tests can pin the schedule.
pub struct ChaosPeaksPower {
    base: u16,
    max_multiplier: f64,
    rng: Box<dyn RandomSource>,
    pending_watts: u16,
    pending_duration: f64,
    next_peak_at: f64,
    peak: Option<ActivePeak>,
}

impl ChaosPeaksPower {
    /// Create a chaos-peaks profile over `base` watts.
    pub fn new(base: u16, max_multiplier: f64, mut rng: Box<dyn RandomSource>) -> Self {
        let next_peak_at = rng.range(3.0, 10.0);
        let (pending_watts, pending_duration) = Self::draw_peak(base, max_multiplier, &mut *rng);
        Self {
            base,
            max_multiplier,
            rng,
            pending_watts,
            pending_duration,
            next_peak_at,
            peak: None,
        }
    }

    fn draw_peak(base: u16, max_multiplier: f64, rng: &mut dyn RandomSource) -> (u16, f64) {
        let multiplier = rng.range(MIN_PEAK_MULTIPLIER, max_multiplier);
        let watts = (f64::from(base) * multiplier) as u16;
        (watts, peak_duration_secs(multiplier, max_multiplier))
    }

    fn base_sample(&self) -> TargetPowerSample {
        TargetPowerSample {
            watts: self.base,
            phase: "base",
        }
    }
}

impl PowerProfile for ChaosPeaksPower {
    fn name(&self) -> &'static str {
        "chaos_peaks"
    }

    fn tick(&mut self, elapsed: Duration, _cadence_rpm: Option<f64>) -> TargetPowerSample {
        let t = elapsed.as_secs_f64();

        if let Some(peak) = self.peak {
            if t - peak.started_at >= peak.duration {
                // Peak over: back to base, draw the next one.
                self.peak = None;
                self.next_peak_at = t + self.rng.range(5.0, 20.0);
                let (watts, duration) =
                    Self::draw_peak(self.base, self.max_multiplier, &mut *self.rng);
                self.pending_watts = watts;
                self.pending_duration = duration;
                debug!(next_peak_in = self.next_peak_at - t, "peak over");
                return self.base_sample();
            }
            return TargetPowerSample {
                watts: peak.watts,
                phase: "peak",
            };
        }

        if t >= self.next_peak_at {
            let peak = ActivePeak {
                started_at: t,
                watts: self.pending_watts,
                duration: self.pending_duration,
            };
            debug!(watts = peak.watts, duration = peak.duration, "peak start");
            self.peak = Some(peak);
            return TargetPowerSample {
                watts: peak.watts,
                phase: "peak",
            };
        }

        self.base_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::random::XorShiftRandom;
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Canned random source replaying a fixed sequence of unit values.
    struct Scripted {
        values: Vec<f64>,
        next: usize,
    }

    impl Scripted {
        fn new(values: Vec<f64>) -> Self {
            Self { values, next: 0 }
        }
    }

    impl RandomSource for Scripted {
        fn next_f64(&mut self) -> f64 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }
    }

    #[test]
    fn test_constant() {
        let mut profile = ConstantPower::new(140);
        let sample = profile.tick(secs(0), None);
        assert_eq!(sample.watts, 140);
        assert_eq!(sample.phase, "constant");
        assert_eq!(profile.tick(secs(3600), Some(85.0)).watts, 140);
    }

    #[test]
    fn test_interval_switches_at_boundary() {
        let mut profile = IntervalPower::new(260, 0.5, secs(20), secs(10));

        assert_eq!(profile.tick(secs(0), None).watts, 260);
        assert_eq!(profile.tick(secs(19), None).phase, "high");

        // Exactly at the boundary the phase flips and the clock resets.
        let sample = profile.tick(secs(20), None);
        assert_eq!(sample.phase, "low");
        assert_eq!(sample.watts, 130);

        assert_eq!(profile.tick(secs(29), None).phase, "low");
        assert_eq!(profile.tick(secs(30), None).phase, "high");
    }

    #[test]
    fn test_pyramid_midpoint() {
        let mut profile = PyramidPower::new(100, 200, secs(60), secs(60));
        let sample = profile.tick(secs(30), None);
        assert_eq!(sample.watts, 150);
        assert_eq!(sample.phase, "up");
    }

    #[test]
    fn test_pyramid_flip_and_mirror() {
        let mut profile = PyramidPower::new(100, 200, secs(60), secs(60));

        assert_eq!(profile.tick(secs(0), None).watts, 100);

        // Boundary tick emits the peak and flips the phase.
        let sample = profile.tick(secs(60), None);
        assert_eq!(sample.watts, 200);
        assert_eq!(sample.phase, "down");

        // Half way down the mirror ramp.
        let sample = profile.tick(secs(90), None);
        assert_eq!(sample.watts, 150);
        assert_eq!(sample.phase, "down");

        // Full cycle returns to low and ramps up again.
        let sample = profile.tick(secs(120), None);
        assert_eq!(sample.watts, 100);
        assert_eq!(sample.phase, "up");
    }

    #[test]
    fn test_sine_is_continuous() {
        let mut profile = SinePower::new(130, 260, secs(120));
        // Adjacent millisecond samples never jump more than a watt, across
        // the period wrap included.
        let mut prev = profile.tick(Duration::ZERO, None).watts;
        for ms in (10..=240_000).step_by(10) {
            let watts = profile.tick(Duration::from_millis(ms), None).watts;
            assert!(
                watts.abs_diff(prev) <= 1,
                "discontinuity at {} ms: {} -> {}",
                ms,
                prev,
                watts
            );
            prev = watts;
        }
    }

    #[test]
    fn test_sine_extremes_and_labels() {
        let mut profile = SinePower::new(100, 200, secs(120));

        // Quarter period: wave maximum.
        let sample = profile.tick(secs(30), None);
        assert_eq!(sample.watts, 200);
        assert_eq!(sample.phase, "high");

        // Three quarters: wave minimum.
        let sample = profile.tick(secs(90), None);
        assert_eq!(sample.watts, 100);
        assert_eq!(sample.phase, "low");

        // Start: mid wave.
        assert_eq!(profile.tick(secs(0), None).phase, "mid");
    }

    #[test]
    fn test_peak_duration_endpoints() {
        assert_eq!(peak_duration_secs(1.2, 3.0), 15.0);
        assert_eq!(peak_duration_secs(3.0, 3.0), 3.0);

        // Degenerate config cannot divide by zero.
        assert_eq!(peak_duration_secs(1.2, 1.2), 15.0);
    }

    #[test]
    fn test_peak_duration_monotone() {
        let mut prev = f64::INFINITY;
        for i in 0..=18 {
            let m = 1.2 + 0.1 * f64::from(i);
            let d = peak_duration_secs(m, 3.0);
            assert!(d <= prev);
            assert!((3.0..=15.0).contains(&d));
            prev = d;
        }
    }

    #[test]
    fn test_chaos_peaks_schedule() {
        // Scripted draws: first peak at 3 + 0.0*7 = 3 s; multiplier
        // 1.2 + 1.0*(3.0-1.2) = 3.0 (duration 3 s, watts 300);
        // then gap 5 + 0.5*15 = 12.5 s; multiplier 1.2 (duration 15 s).
        let rng = Scripted::new(vec![0.0, 1.0, 0.5, 0.0]);
        let mut profile = ChaosPeaksPower::new(100, 3.0, Box::new(rng));

        // Before the first peak: base.
        let sample = profile.tick(secs(0), None);
        assert_eq!((sample.watts, sample.phase), (100, "base"));
        assert_eq!(profile.tick(secs(2), None).phase, "base");

        // Peak fires at 3 s with the pre-drawn multiplier.
        let sample = profile.tick(secs(3), None);
        assert_eq!((sample.watts, sample.phase), (300, "peak"));
        assert_eq!(profile.tick(secs(5), None).phase, "peak");

        // 3 s duration elapsed: back to base, next peak drawn 12.5 s out.
        let sample = profile.tick(secs(6), None);
        assert_eq!((sample.watts, sample.phase), (100, "base"));

        assert_eq!(profile.tick(secs(18), None).phase, "base");
        let sample = profile.tick(secs(19), None);
        assert_eq!((sample.watts, sample.phase), (120, "peak"));
    }

    #[test]
    fn test_chaos_peaks_seeded_is_deterministic() {
        let mut a = ChaosPeaksPower::new(150, 3.0, Box::new(XorShiftRandom::new(1234)));
        let mut b = ChaosPeaksPower::new(150, 3.0, Box::new(XorShiftRandom::new(1234)));

        for s in 0..300 {
            let sa = a.tick(secs(s), None);
            let sb = b.tick(secs(s), None);
            assert_eq!(sa, sb);
        }
    }

    #[test]
    fn test_chaos_peaks_bounds() {
        let mut profile = ChaosPeaksPower::new(100, 3.0, Box::new(XorShiftRandom::new(7)));
        for s in 0..600 {
            let sample = profile.tick(secs(s), None);
            match sample.phase {
                "base" => assert_eq!(sample.watts, 100),
                "peak" => {
                    assert!(sample.watts >= 120);
                    assert!(sample.watts <= 300);
                }
                other => panic!("unexpected phase {}", other),
            }
        }
    }
}
