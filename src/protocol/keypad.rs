//! Zwift Play keypad frame parsing.
//!
//! Frames on the async characteristic start with a one-byte message type.
//! The keypad status payload is a protobuf-style sequence of varint fields
//! (field numbers per the reverse-engineered PlayKeyPadStatus message).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::varint::{read_varint, zigzag_decode};

/// Message type for a keypad/axis status frame.
pub const KEYPAD_MESSAGE_TYPE: u8 = 0x07;
/// Message type for an idle keep-alive frame (no payload of interest).
pub const IDLE_MESSAGE_TYPE: u8 = 0x15;
/// Message type for a battery level frame (second payload byte = percent).
pub const BATTERY_MESSAGE_TYPE: u8 = 0x19;

/// A button field is pressed when its raw varint value is exactly this.
///
/// Reverse-engineered convention: 0 = pressed, 1 (or absent) = released.
/// No semantics are assumed for other values.
const BUTTON_PRESSED_RAW: u64 = 0;

/// Axis magnitude at or above which the synthetic paddle counts as engaged.
pub const FULL_DEFLECTION: i64 = 100;

// PlayKeyPadStatus field numbers.
const FIELD_SIDE: u32 = 1; // 0 = right controller, 1 = left
const FIELD_Y: u32 = 2;
const FIELD_Z: u32 = 3;
const FIELD_A: u32 = 4;
const FIELD_B: u32 = 5;
const FIELD_SHIFT: u32 = 6;
const FIELD_POWER: u32 = 7;
const FIELD_ANALOG_LR: u32 = 8; // zigzag-encoded
const FIELD_ANALOG_UD: u32 = 9; // zigzag-encoded

/// Which half of the handlebar a controller is strapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerSide {
    /// Left-hand controller.
    Left,
    /// Right-hand controller.
    Right,
}

impl std::fmt::Display for ControllerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A named controller input, including the synthetic paddle entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadButton {
    /// Top face button.
    Y,
    /// Left face button.
    Z,
    /// Right face button.
    A,
    /// Bottom face button.
    B,
    /// Shift/secondary button on the grip.
    Side,
    /// Power button.
    OnOff,
    /// Synthetic entry for full deflection on the left controller's axis.
    LeftPaddle,
    /// Synthetic entry for full deflection on the right controller's axis.
    RightPaddle,
}

impl PadButton {
    /// Stable name used in events and key-map tables.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Y => "Y",
            Self::Z => "Z",
            Self::A => "A",
            Self::B => "B",
            Self::Side => "Side",
            Self::OnOff => "On/Off",
            Self::LeftPaddle => "left_paddle",
            Self::RightPaddle => "right_paddle",
        }
    }
}

impl std::fmt::Display for PadButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded keypad state from one `0x07` frame.
///
/// Immutable once parsed; a fresh snapshot is produced for every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSnapshot {
    /// Which controller sent the frame.
    pub side: ControllerSide,
    /// Top face button pressed.
    pub y: bool,
    /// Left face button pressed.
    pub z: bool,
    /// Right face button pressed.
    pub a: bool,
    /// Bottom face button pressed.
    pub b: bool,
    /// Shift/secondary button pressed.
    pub shift: bool,
    /// Power button pressed.
    pub power: bool,
    /// Horizontal analog axis, zigzag-decoded (roughly -100..=100).
    pub analog_lr: i64,
    /// Vertical analog axis, zigzag-decoded (roughly -100..=100).
    pub analog_ud: i64,
    /// Fields with numbers outside the known map, retained uninterpreted.
    pub unknown_fields: Vec<(u32, u64)>,
}

impl ButtonSnapshot {
    /// Parse a keypad status payload (the frame minus its type byte).
    ///
    /// # Errors
    ///
    /// `TruncatedFrame` / `VarintOverflow` if a varint is malformed, and
    /// `UnsupportedWireType` for any non-varint field key. All are
    /// frame-scoped: the caller drops the frame and continues.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut side_raw: Option<u64> = None;
        let mut buttons: [Option<u64>; 6] = [None; 6];
        let mut analog_lr: i64 = 0;
        let mut analog_ud: i64 = 0;
        let mut unknown_fields = Vec::new();

        let mut i = 0;
        while i < payload.len() {
            let (key, next) = read_varint(payload, i)?;
            let field_number = (key >> 3) as u32;
            let wire_type = (key & 0x7) as u8;
            if wire_type != 0 {
                return Err(Error::UnsupportedWireType {
                    field_number,
                    wire_type,
                });
            }

            let (value, next) = read_varint(payload, next)?;
            i = next;

            match field_number {
                FIELD_SIDE => side_raw = Some(value),
                FIELD_Y..=FIELD_POWER => buttons[(field_number - FIELD_Y) as usize] = Some(value),
                FIELD_ANALOG_LR => analog_lr = zigzag_decode(value),
                FIELD_ANALOG_UD => analog_ud = zigzag_decode(value),
                _ => unknown_fields.push((field_number, value)),
            }
        }

        // Side flag: 0 = right, 1 = left. Absent defaults to left, matching
        // the pressed/released convention (absent == raw value 1).
        let side = if side_raw == Some(BUTTON_PRESSED_RAW) {
            ControllerSide::Right
        } else {
            ControllerSide::Left
        };

        let pressed = |idx: usize| buttons[idx] == Some(BUTTON_PRESSED_RAW);

        Ok(Self {
            side,
            y: pressed(0),
            z: pressed(1),
            a: pressed(2),
            b: pressed(3),
            shift: pressed(4),
            power: pressed(5),
            analog_lr,
            analog_ud,
            unknown_fields,
        })
    }

    /// The synthetic paddle entry, if the axis is at full deflection.
    ///
    /// The paddle name follows the controller side, not the deflection
    /// direction. There is no hysteresis band around the threshold.
    pub fn paddle(&self) -> Option<PadButton> {
        if self.analog_lr.abs() >= FULL_DEFLECTION {
            Some(match self.side {
                ControllerSide::Left => PadButton::LeftPaddle,
                ControllerSide::Right => PadButton::RightPaddle,
            })
        } else {
            None
        }
    }

    /// All discrete buttons currently pressed, excluding the paddle.
    pub fn pressed_buttons(&self) -> Vec<PadButton> {
        let mut out = Vec::new();
        if self.y {
            out.push(PadButton::Y);
        }
        if self.z {
            out.push(PadButton::Z);
        }
        if self.a {
            out.push(PadButton::A);
        }
        if self.b {
            out.push(PadButton::B);
        }
        if self.shift {
            out.push(PadButton::Side);
        }
        if self.power {
            out.push(PadButton::OnOff);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::varint::{write_varint, zigzag_encode};
    use pretty_assertions::assert_eq;

    /// Build a keypad payload from (field_number, raw_value) pairs.
    fn build_payload(fields: &[(u32, u64)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(field, value) in fields {
            out.extend(write_varint(u64::from(field) << 3));
            out.extend(write_varint(value));
        }
        out
    }

    #[test]
    fn test_parse_pressed_buttons() {
        // Right controller, Y and B pressed, Z explicitly released.
        let payload = build_payload(&[(1, 0), (2, 0), (3, 1), (5, 0)]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();

        assert_eq!(snapshot.side, ControllerSide::Right);
        assert!(snapshot.y);
        assert!(!snapshot.z);
        assert!(!snapshot.a);
        assert!(snapshot.b);
        assert_eq!(
            snapshot.pressed_buttons(),
            vec![PadButton::Y, PadButton::B]
        );
    }

    #[test]
    fn test_parse_absent_fields_are_released() {
        let payload = build_payload(&[(1, 1)]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();

        assert_eq!(snapshot.side, ControllerSide::Left);
        assert!(snapshot.pressed_buttons().is_empty());
        assert_eq!(snapshot.paddle(), None);
    }

    #[test]
    fn test_parse_analog_axes() {
        let payload = build_payload(&[
            (1, 0),
            (8, zigzag_encode(-100)),
            (9, zigzag_encode(42)),
        ]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();

        assert_eq!(snapshot.analog_lr, -100);
        assert_eq!(snapshot.analog_ud, 42);
        // Full deflection on the right controller -> right paddle,
        // regardless of deflection sign.
        assert_eq!(snapshot.paddle(), Some(PadButton::RightPaddle));
    }

    #[test]
    fn test_paddle_below_threshold() {
        let payload = build_payload(&[(1, 1), (8, zigzag_encode(99))]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();
        assert_eq!(snapshot.paddle(), None);

        let payload = build_payload(&[(1, 1), (8, zigzag_encode(100))]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();
        assert_eq!(snapshot.paddle(), Some(PadButton::LeftPaddle));
    }

    #[test]
    fn test_unknown_fields_retained() {
        let payload = build_payload(&[(1, 0), (12, 7), (200, 3)]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();
        assert_eq!(snapshot.unknown_fields, vec![(12, 7), (200, 3)]);
    }

    #[test]
    fn test_unsupported_wire_type() {
        // Field 8, wire type 2 (length-delimited).
        let payload = vec![(8 << 3) | 2, 0x01, 0xFF];
        let err = ButtonSnapshot::parse(&payload).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::UnsupportedWireType {
                field_number: 8,
                wire_type: 2
            }
        ));
    }

    #[test]
    fn test_truncated_payload() {
        // Key says field 2, then a value with a dangling continuation bit.
        let payload = vec![2 << 3, 0x80];
        let err = ButtonSnapshot::parse(&payload).unwrap_err();
        assert!(matches!(err, crate::Error::TruncatedFrame { .. }));

        // A malformed frame must not poison the next one.
        let good = build_payload(&[(1, 0), (2, 0)]);
        let snapshot = ButtonSnapshot::parse(&good).unwrap();
        assert!(snapshot.y);
    }

    #[test]
    fn test_nonzero_nonone_value_is_released() {
        // Only raw value 0 counts as pressed.
        let payload = build_payload(&[(2, 2)]);
        let snapshot = ButtonSnapshot::parse(&payload).unwrap();
        assert!(!snapshot.y);
    }
}
