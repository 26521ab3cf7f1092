//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality for
//! discovering and communicating with controllers and cadence sensors.

pub mod characteristics;
pub mod scanner;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use scanner::{BleScanner, DeviceFilter, DiscoveredDevice};
pub use uuids::*;
