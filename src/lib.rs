// Allow holding locks across await points - we use parking_lot and never
// hold a guard across an await
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # zwift-play-bridge
//!
//! A cross-platform Rust library that turns Zwift Play controllers and BLE
//! cadence sensors into discrete input events and smart-trainer power
//! targets.
//!
//! The pipeline: notification frames from each device are decoded (a varint
//! keypad frame for controllers, a CSC Measurement frame for cadence
//! sensors), edge-mapped into press/release events against a configurable
//! key table, while a 1 Hz control tick runs a power profile and hands the
//! target to a trainer sink.
//!
//! ## Features
//!
//! - **Controller mapping**: button and paddle edges become key
//!   press/release events through per-side key tables
//! - **Cadence estimation**: RPM from wrapping crank counters, with
//!   staleness detection for stopped cranks
//! - **Power profiles**: constant, interval, pyramid, sine, and
//!   chaos-peaks target generators driven by elapsed time
//! - **Resilient sessions**: per-device state machines that scan, connect,
//!   handshake, subscribe, and retry on a fixed backoff, independently
//! - **Overlay telemetry**: rate-limited JSON datagrams with live cadence
//!   for an external overlay process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zwift_play_bridge::{
//!     ActuationEvent, ActuationSink, Bridge, BridgeConfig, Result,
//!     TargetPowerSample, TrainerControl,
//! };
//!
//! struct LogSink;
//!
//! impl ActuationSink for LogSink {
//!     fn actuate(&self, event: &ActuationEvent) {
//!         println!("{} {} ({})", event.action, event.key, event.device);
//!     }
//! }
//!
//! struct LogTrainer;
//!
//! #[async_trait::async_trait]
//! impl TrainerControl for LogTrainer {
//!     async fn set_target_power(&self, sample: &TargetPowerSample) -> Result<()> {
//!         println!("ERG target {} W [{}]", sample.watts, sample.phase);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::new(
//!         BridgeConfig::default(),
//!         Arc::new(LogSink),
//!         Arc::new(LogTrainer),
//!     )
//!     .await?;
//!
//!     bridge.start();
//!     tokio::signal::ctrl_c().await.ok();
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.

// Public modules
pub mod actuation;
pub mod ble;
pub mod bridge;
pub mod cadence;
pub mod config;
pub mod error;
pub mod mapper;
pub mod power;
pub mod protocol;
pub mod session;
pub mod telemetry;

// Re-exports for convenience
pub use actuation::{
    ActuationEvent, ActuationSink, ActuationSource, KeyAction, TargetPowerSample, TrainerControl,
};
pub use bridge::Bridge;
pub use cadence::CadenceEstimator;
pub use config::{BridgeConfig, CadenceSensorConfig, ControllerConfig, PowerProfileConfig};
pub use error::{Error, Result};
pub use mapper::{ButtonTransitions, CadenceKeyMapper, InputEdgeMapper, KeyMap, KeyMaps};
pub use power::{PowerProfile, RandomSource, XorShiftRandom};
pub use protocol::{ButtonSnapshot, ControllerSide, CrankSample, PadButton};
pub use session::{DeviceRole, DeviceSession, SessionConfig, SessionState};
pub use telemetry::{OverlayClient, OverlayConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Bridge>();
        let _ = std::any::TypeId::of::<BridgeConfig>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<ButtonSnapshot>();
        let _ = std::any::TypeId::of::<CadenceEstimator>();
        let _ = std::any::TypeId::of::<SessionState>();
        let _ = std::any::TypeId::of::<TargetPowerSample>();
    }
}
