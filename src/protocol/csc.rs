//! CSC Measurement frame parsing.
//!
//! Standard Cycling Speed and Cadence layout: a one-byte flags field, then
//! optional wheel data (4-byte revolution counter + 2-byte event time) and
//! optional crank data (2-byte revolution counter + 2-byte event time), all
//! little-endian. Only the crank half feeds the cadence estimator; wheel
//! data is skipped over when present.

use crate::error::{Error, Result};

/// Flags bit 0: wheel revolution data present.
const FLAG_WHEEL_DATA: u8 = 0x01;
/// Flags bit 1: crank revolution data present.
const FLAG_CRANK_DATA: u8 = 0x02;

/// One crank revolution sample from a CSC Measurement notification.
///
/// Both counters are fixed-width hardware fields that wrap modulo 65536
/// during normal multi-hour use; only deltas between successive samples are
/// meaningful. Event time is in 1/1024 s ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrankSample {
    /// Cumulative crank revolutions, wrapping at 65536.
    pub cumulative_revolutions: u16,
    /// Time of the last crank event in 1/1024 s ticks, wrapping at 65536.
    pub event_time_ticks: u16,
}

/// Parse a CSC Measurement payload into a crank sample.
///
/// Returns `Ok(None)` when the frame carries no crank data (not an error —
/// wheel-only sensors send such frames routinely).
///
/// # Errors
///
/// `TruncatedFrame` if the flags byte is missing or a declared field does
/// not fit in the remaining payload. Frame-scoped: drop and continue.
pub fn parse_csc_measurement(payload: &[u8]) -> Result<Option<CrankSample>> {
    let flags = *payload.first().ok_or_else(|| Error::TruncatedFrame {
        context: "CSC measurement missing flags byte".to_string(),
    })?;

    let wheel_present = flags & FLAG_WHEEL_DATA != 0;
    let crank_present = flags & FLAG_CRANK_DATA != 0;

    let mut idx = 1;

    if wheel_present {
        // 4-byte cumulative wheel revolutions + 2-byte event time, unused
        // for cadence but must be skipped to find the crank fields.
        if payload.len() < idx + 6 {
            return Err(Error::TruncatedFrame {
                context: "CSC wheel data declared but missing".to_string(),
            });
        }
        idx += 6;
    }

    if !crank_present {
        return Ok(None);
    }

    if payload.len() < idx + 4 {
        return Err(Error::TruncatedFrame {
            context: "CSC crank data declared but missing".to_string(),
        });
    }

    let cumulative_revolutions = u16::from_le_bytes([payload[idx], payload[idx + 1]]);
    let event_time_ticks = u16::from_le_bytes([payload[idx + 2], payload[idx + 3]]);

    Ok(Some(CrankSample {
        cumulative_revolutions,
        event_time_ticks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crank_only_frame() {
        // Flags 0x02, revs = 0x1234, time = 0xABCD.
        let payload = [0x02, 0x34, 0x12, 0xCD, 0xAB];
        let sample = parse_csc_measurement(&payload).unwrap().unwrap();
        assert_eq!(sample.cumulative_revolutions, 0x1234);
        assert_eq!(sample.event_time_ticks, 0xABCD);
    }

    #[test]
    fn test_wheel_and_crank_frame() {
        // Wheel data occupies six bytes before the crank fields.
        let payload = [
            0x03, // flags: wheel + crank
            0x01, 0x02, 0x03, 0x04, // wheel revolutions
            0x05, 0x06, // wheel event time
            0x0A, 0x00, // crank revolutions = 10
            0x00, 0x04, // crank event time = 1024
        ];
        let sample = parse_csc_measurement(&payload).unwrap().unwrap();
        assert_eq!(sample.cumulative_revolutions, 10);
        assert_eq!(sample.event_time_ticks, 1024);
    }

    #[test]
    fn test_no_crank_data_is_not_an_error() {
        // Wheel-only frame.
        let payload = [0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(parse_csc_measurement(&payload).unwrap(), None);

        // Nothing present at all.
        let payload = [0x00];
        assert_eq!(parse_csc_measurement(&payload).unwrap(), None);
    }

    #[test]
    fn test_truncated_frames() {
        let err = parse_csc_measurement(&[]).unwrap_err();
        assert!(matches!(err, crate::Error::TruncatedFrame { .. }));

        // Crank declared, only two of four bytes present.
        let err = parse_csc_measurement(&[0x02, 0x34, 0x12]).unwrap_err();
        assert!(matches!(err, crate::Error::TruncatedFrame { .. }));

        // Wheel declared but missing entirely.
        let err = parse_csc_measurement(&[0x01, 0x00]).unwrap_err();
        assert!(matches!(err, crate::Error::TruncatedFrame { .. }));
    }
}
