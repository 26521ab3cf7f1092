//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for controller and cadence-sensor
//! communication, plus the vendor handshake payload.

use uuid::Uuid;

// Zwift Play custom service (reverse-engineered).
/// Zwift Play custom service UUID.
pub const PLAY_SERVICE_UUID: Uuid = Uuid::from_u128(0x00000001_19CA_4651_86E5_FA29DCDD09D1);
/// Async characteristic UUID (Notify): the button/axis frame stream.
pub const PLAY_ASYNC_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000002_19CA_4651_86E5_FA29DCDD09D1);
/// Sync RX characteristic UUID (Write Without Response): handshake/control.
pub const PLAY_SYNC_RX_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000003_19CA_4651_86E5_FA29DCDD09D1);
/// Sync TX characteristic UUID (Indicate/Notify): command responses.
pub const PLAY_SYNC_TX_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000004_19CA_4651_86E5_FA29DCDD09D1);

// Cycling Speed and Cadence (Standard BLE).
/// Standard CSC Service UUID.
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_00805f9b34fb);
/// Standard CSC Measurement characteristic UUID (Notify).
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_00805f9b34fb);

/// Vendor handshake payload written to the sync RX characteristic after
/// connecting: the six ASCII bytes "RideOn". No response is expected.
pub const RIDE_ON: [u8; 6] = *b"RideOn";

/// Check if a service UUID belongs to the controller's custom family.
pub fn is_play_service(uuid: &Uuid) -> bool {
    *uuid == PLAY_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        let service = PLAY_SERVICE_UUID.to_string();
        assert!(service.starts_with("00000001"));
        assert!(service.ends_with("fa29dcdd09d1"));

        let csc = CSC_MEASUREMENT_UUID.to_string();
        assert!(csc.contains("2a5b"));
    }

    #[test]
    fn test_handshake_bytes() {
        assert_eq!(&RIDE_ON, &[0x52, 0x69, 0x64, 0x65, 0x4F, 0x6E]);
    }

    #[test]
    fn test_is_play_service() {
        assert!(is_play_service(&PLAY_SERVICE_UUID));
        assert!(!is_play_service(&CSC_SERVICE_UUID));
        assert!(!is_play_service(&PLAY_ASYNC_CHARACTERISTIC_UUID));
    }
}
