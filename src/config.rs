//! Configuration surface.
//!
//! Plain serde-backed structs the embedding binary fills in (from a file,
//! flags, or constants). Everything has a usable default so an empty config
//! behaves like the reference setup: two controllers matched by name, the
//! default key tables, a constant 140 W profile.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ble::scanner::DeviceFilter;
use crate::mapper::{CadenceKeys, CadenceThresholds, KeyMaps};
use crate::power::profiles::{
    ChaosPeaksPower, ConstantPower, IntervalPower, PyramidPower, SinePower,
};
use crate::power::random::XorShiftRandom;
use crate::power::PowerProfile;
use crate::session::SessionConfig;
use crate::telemetry::OverlayConfig;

/// Controller discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Name substring to match when no address is pinned.
    pub name_filter: String,
    /// Exact address to connect to instead of the name filter.
    pub address: Option<String>,
    /// How many controllers to run sessions for.
    pub max_controllers: usize,
    /// Bound on each discovery scan, in seconds.
    pub scan_timeout_secs: u64,
    /// Consecutive empty scans before a session enters `Failed`.
    /// `None` retries forever.
    pub max_scan_attempts: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name_filter: "Zwift".to_string(),
            address: None,
            max_controllers: 2,
            scan_timeout_secs: 6,
            max_scan_attempts: None,
        }
    }
}

impl ControllerConfig {
    /// The scan filter this config describes.
    pub fn filter(&self) -> DeviceFilter {
        match &self.address {
            Some(address) => DeviceFilter::by_address(address.clone()),
            None => DeviceFilter::by_name(self.name_filter.clone()),
        }
    }
}

/// External cadence sensor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceSensorConfig {
    /// Address of the sensor.
    pub address: String,
    /// Staleness threshold for the RPM estimate, in seconds.
    #[serde(default = "CadenceSensorConfig::default_stale_secs")]
    pub stale_secs: f64,
}

impl CadenceSensorConfig {
    fn default_stale_secs() -> f64 {
        3.0
    }

    /// The staleness threshold as a duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.stale_secs)
    }
}

/// Which power profile drives the trainer, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PowerProfileConfig {
    /// Fixed wattage.
    Constant {
        /// Target watts.
        watts: u16,
    },
    /// Tabata-style high/low alternation.
    Interval {
        /// Watts during the work phase.
        high_watts: u16,
        /// Recovery wattage as a fraction of the work wattage.
        low_ratio: f64,
        /// Work phase length in seconds.
        high_secs: u64,
        /// Recovery phase length in seconds.
        low_secs: u64,
    },
    /// Linear ramp up then back down.
    Pyramid {
        /// Watts at the bottom of the pyramid.
        low_watts: u16,
        /// Watts at the peak.
        high_watts: u16,
        /// Ramp-up length in seconds.
        ramp_up_secs: u64,
        /// Ramp-down length in seconds.
        ramp_down_secs: u64,
    },
    /// Continuous sine oscillation.
    Sine {
        /// Watts at the wave minimum.
        low_watts: u16,
        /// Watts at the wave maximum.
        high_watts: u16,
        /// Full wave period in seconds.
        period_secs: u64,
    },
    /// Baseline with random peaks.
    ChaosPeaks {
        /// Baseline watts.
        base_watts: u16,
        /// Largest peak multiplier the scheduler may draw.
        max_multiplier: f64,
        /// Seed for the peak scheduler; random when absent.
        seed: Option<u64>,
    },
}

impl Default for PowerProfileConfig {
    fn default() -> Self {
        Self::Constant { watts: 140 }
    }
}

impl PowerProfileConfig {
    /// Build the strategy this config selects.
    pub fn build(&self) -> Box<dyn PowerProfile> {
        match *self {
            Self::Constant { watts } => Box::new(ConstantPower::new(watts)),
            Self::Interval {
                high_watts,
                low_ratio,
                high_secs,
                low_secs,
            } => Box::new(IntervalPower::new(
                high_watts,
                low_ratio,
                Duration::from_secs(high_secs),
                Duration::from_secs(low_secs),
            )),
            Self::Pyramid {
                low_watts,
                high_watts,
                ramp_up_secs,
                ramp_down_secs,
            } => Box::new(PyramidPower::new(
                low_watts,
                high_watts,
                Duration::from_secs(ramp_up_secs),
                Duration::from_secs(ramp_down_secs),
            )),
            Self::Sine {
                low_watts,
                high_watts,
                period_secs,
            } => Box::new(SinePower::new(
                low_watts,
                high_watts,
                Duration::from_secs(period_secs),
            )),
            Self::ChaosPeaks {
                base_watts,
                max_multiplier,
                seed,
            } => {
                let rng = match seed {
                    Some(seed) => XorShiftRandom::new(seed),
                    None => XorShiftRandom::from_entropy(),
                };
                Box::new(ChaosPeaksPower::new(base_watts, max_multiplier, Box::new(rng)))
            }
        }
    }

    /// The classic 20 s on / 10 s off Tabata at half load.
    pub fn tabata(high_watts: u16) -> Self {
        Self::Interval {
            high_watts,
            low_ratio: 0.5,
            high_secs: 20,
            low_secs: 10,
        }
    }
}

/// Top-level configuration for a [`Bridge`](crate::bridge::Bridge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Controller discovery settings.
    pub controllers: ControllerConfig,
    /// External cadence sensor, if one is paired.
    pub cadence_sensor: Option<CadenceSensorConfig>,
    /// Fixed delay between reconnect attempts, in seconds.
    pub reconnect_backoff_secs: u64,
    /// The trainer power profile.
    pub profile: PowerProfileConfig,
    /// Per-side button-to-key tables.
    pub keymaps: KeyMaps,
    /// RPM thresholds for the tick-driven key mapper.
    pub cadence_thresholds: CadenceThresholds,
    /// Keys the tick-driven mapper holds.
    pub cadence_keys: CadenceKeys,
    /// Overlay telemetry settings.
    pub overlay: OverlayConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            controllers: ControllerConfig::default(),
            cadence_sensor: None,
            reconnect_backoff_secs: 5,
            profile: PowerProfileConfig::default(),
            keymaps: KeyMaps::default(),
            cadence_thresholds: CadenceThresholds::default(),
            cadence_keys: CadenceKeys::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Session config for one controller.
    pub fn controller_session(&self) -> SessionConfig {
        SessionConfig {
            filter: self.controllers.filter(),
            scan_timeout: Duration::from_secs(self.controllers.scan_timeout_secs),
            reconnect_backoff: self.backoff(),
            max_scan_attempts: self.controllers.max_scan_attempts,
        }
    }

    /// Session config for the cadence sensor, if configured.
    pub fn cadence_session(&self) -> Option<SessionConfig> {
        self.cadence_sensor.as_ref().map(|sensor| SessionConfig {
            filter: DeviceFilter::by_address(sensor.address.clone()),
            scan_timeout: Duration::from_secs(self.controllers.scan_timeout_secs),
            reconnect_backoff: self.backoff(),
            max_scan_attempts: None,
        })
    }

    fn backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.name_filter, "Zwift");
        assert_eq!(config.max_controllers, 2);
        assert_eq!(config.scan_timeout_secs, 6);
        assert_eq!(config.filter().describe(), "name~='Zwift'");
    }

    #[test]
    fn test_address_overrides_name_filter() {
        let config = ControllerConfig {
            address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().describe(), "address=AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_profile_config_builds() {
        let profile = PowerProfileConfig::default().build();
        assert_eq!(profile.name(), "constant");

        assert_eq!(PowerProfileConfig::tabata(260).build().name(), "interval");

        let chaos = PowerProfileConfig::ChaosPeaks {
            base_watts: 140,
            max_multiplier: 3.0,
            seed: Some(9),
        };
        assert_eq!(chaos.build().name(), "chaos_peaks");
    }

    #[test]
    fn test_bridge_config_round_trip() {
        let config = BridgeConfig {
            cadence_sensor: Some(CadenceSensorConfig {
                address: "5A:AA:25:D1:0D:9E".to_string(),
                stale_secs: 3.0,
            }),
            profile: PowerProfileConfig::Sine {
                low_watts: 130,
                high_watts: 260,
                period_secs: 120,
            },
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.reconnect_backoff_secs, 5);
    }

    #[test]
    fn test_session_configs() {
        let mut config = BridgeConfig::default();
        config.reconnect_backoff_secs = 5;

        let session = config.controller_session();
        assert_eq!(session.scan_timeout, Duration::from_secs(6));
        assert_eq!(session.reconnect_backoff, Duration::from_secs(5));

        assert!(config.cadence_session().is_none());
        config.cadence_sensor = Some(CadenceSensorConfig {
            address: "AA:BB".to_string(),
            stale_secs: 3.0,
        });
        let session = config.cadence_session().unwrap();
        assert_eq!(session.filter.describe(), "address=AA:BB");
    }
}
