//! Error types for the zwift-play-bridge crate.

use thiserror::Error;

/// The main error type for this crate.
///
/// Decode errors (`TruncatedFrame`, `VarintOverflow`, `UnsupportedWireType`)
/// are frame-scoped: callers drop the offending frame and keep consuming the
/// notification stream. Transport errors are session-scoped and feed the
/// reconnect backoff. Nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No device matched the configured scan filter.
    #[error("Device not found: {filter}")]
    DeviceNotFound {
        /// Description of the filter that matched nothing.
        filter: String,
    },

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection to the device was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// A frame ended before a complete field could be read.
    #[error("Truncated frame: {context}")]
    TruncatedFrame {
        /// Description of what was being read when the frame ran out.
        context: String,
    },

    /// A varint ran past 64 bits of payload.
    #[error("Varint exceeds 64 bits")]
    VarintOverflow,

    /// A keypad frame carried a field with a wire type other than varint.
    #[error("Unsupported wire type {wire_type} for field {field_number}")]
    UnsupportedWireType {
        /// The protobuf field number the bad key referred to.
        field_number: u32,
        /// The wire type carried by the key (only 0 is valid here).
        wire_type: u8,
    },

    /// The vendor handshake write was rejected. Non-fatal: the session
    /// proceeds to subscribe anyway.
    #[error("Handshake write failed: {reason}")]
    HandshakeWriteFailed {
        /// Description of the write failure.
        reason: String,
    },

    /// Subscribing to one notification characteristic failed. Independent
    /// per characteristic: the session continues with whichever succeeded.
    #[error("Subscription failed for {uuid}: {reason}")]
    SubscriptionFailed {
        /// The UUID of the characteristic.
        uuid: String,
        /// Description of the failure.
        reason: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is scoped to a single frame.
    ///
    /// Frame-scoped errors are logged and the frame dropped; the session
    /// keeps processing subsequent frames.
    pub fn is_frame_scoped(&self) -> bool {
        matches!(
            self,
            Self::TruncatedFrame { .. } | Self::VarintOverflow | Self::UnsupportedWireType { .. }
        )
    }
}
