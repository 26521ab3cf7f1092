//! Output seams: the artifacts this crate hands to external backends.
//!
//! The keyboard-injection backend and the trainer-control transport are
//! external collaborators; they plug in through the two traits below. The
//! crate never touches a keyboard or an ERG characteristic itself.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::keypad::PadButton;

/// Press or release of one mapped key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Key goes down.
    Press,
    /// Key goes up.
    Release,
}

impl std::fmt::Display for KeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Press => write!(f, "press"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// What produced an actuation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuationSource {
    /// An edge on a controller button or paddle.
    Button(PadButton),
    /// A cadence-threshold crossing on the control tick.
    Cadence,
}

/// One discrete activation/deactivation handed to the actuation sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationEvent {
    /// Label of the device (or logical source) that caused the event.
    pub device: String,
    /// What triggered the event.
    pub source: ActuationSource,
    /// The key the event maps to, from the configured key table.
    pub key: String,
    /// Press or release.
    pub action: KeyAction,
}

impl ActuationEvent {
    /// Convenience constructor for a button-sourced event.
    pub fn button(device: &str, button: PadButton, key: &str, action: KeyAction) -> Self {
        Self {
            device: device.to_string(),
            source: ActuationSource::Button(button),
            key: key.to_string(),
            action,
        }
    }

    /// Convenience constructor for a cadence-sourced event.
    pub fn cadence(device: &str, key: &str, action: KeyAction) -> Self {
        Self {
            device: device.to_string(),
            source: ActuationSource::Cadence,
            key: key.to_string(),
            action,
        }
    }
}

/// One power target handed to the trainer sink each control tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPowerSample {
    /// Requested power in watts.
    pub watts: u16,
    /// Label of the profile phase that produced the value.
    pub phase: &'static str,
}

/// Sink for key press/release events.
///
/// Implementations inject into a keyboard backend, forward over IPC, or just
/// log. Called from session tasks and the control tick; must be cheap and
/// non-blocking.
pub trait ActuationSink: Send + Sync {
    /// Deliver one event.
    fn actuate(&self, event: &ActuationEvent);
}

/// Sink for trainer power targets.
#[async_trait]
pub trait TrainerControl: Send + Sync {
    /// Request the trainer hold this power target.
    async fn set_target_power(&self, sample: &TargetPowerSample) -> Result<()>;
}
