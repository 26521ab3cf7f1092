//! Time-based power profile engine.
//!
//! A profile is a strategy that maps elapsed session time (and, for future
//! strategies, live cadence) to a trainer power target. Profiles are ticked
//! at a fixed rate (1 Hz) by the orchestrator's control task and own their
//! state exclusively; they are re-created at session start.

pub mod profiles;
pub mod random;

use std::time::Duration;

use crate::actuation::TargetPowerSample;

pub use profiles::{
    ChaosPeaksPower, ConstantPower, IntervalPower, PyramidPower, SinePower,
};
pub use random::{RandomSource, XorShiftRandom};

/// A power target strategy driven by the control tick.
pub trait PowerProfile: Send {
    /// Short name for logs and telemetry.
    fn name(&self) -> &'static str;

    /// Compute the power target for this instant.
    ///
    /// `elapsed` is time since the profile started; `cadence_rpm` is the
    /// live cadence when a sensor is attached (unused by the current
    /// strategies, which are pure functions of elapsed time).
    fn tick(&mut self, elapsed: Duration, cadence_rpm: Option<f64>) -> TargetPowerSample;
}
