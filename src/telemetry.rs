//! Cadence telemetry for the external overlay process.
//!
//! Sends small JSON datagrams to a local UDP port that an overlay window
//! (out of scope here) listens on. Delivery is best-effort and rate-limited
//! so a chatty sensor cannot flood the loopback.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Default UDP port the overlay listens on.
pub const DEFAULT_OVERLAY_PORT: u16 = 49555;

/// Overlay telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Whether to send overlay datagrams at all.
    pub enabled: bool,
    /// Destination port on 127.0.0.1.
    pub port: u16,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_OVERLAY_PORT,
        }
    }
}

/// UDP sender for cadence overlay datagrams.
pub struct OverlayClient {
    socket: UdpSocket,
    port: u16,
    last_send: Mutex<Option<Instant>>,
}

impl OverlayClient {
    /// Minimum spacing between datagrams (10 messages per second).
    pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);

    /// Bind a sender socket, or `None` when the overlay is disabled.
    pub async fn bind(config: &OverlayConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| Error::Internal(format!("overlay socket bind failed: {}", e)))?;

        debug!("Overlay telemetry bound, target port {}", config.port);

        Ok(Some(Self {
            socket,
            port: config.port,
            last_send: Mutex::new(None),
        }))
    }

    /// Send one cadence reading. Returns whether a datagram went out;
    /// rate-limited calls and send failures are absorbed silently.
    pub async fn send(&self, cadence_rpm: f64, source: &str) -> bool {
        if !self.ready_at(Instant::now()) {
            return false;
        }

        let payload = overlay_payload(cadence_rpm, source);
        match self
            .socket
            .send_to(payload.as_bytes(), (Ipv4Addr::LOCALHOST, self.port))
            .await
        {
            Ok(_) => {
                trace!("Overlay datagram sent: {}", payload);
                true
            }
            Err(e) => {
                // Nobody listening is the normal case; keep it quiet.
                trace!("Overlay send failed: {}", e);
                false
            }
        }
    }

    /// Rate-limiter check: claims a send slot when one is available.
    fn ready_at(&self, now: Instant) -> bool {
        let mut last = self.last_send.lock();
        match *last {
            Some(at) if now.saturating_duration_since(at) < Self::MIN_SEND_INTERVAL => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// The overlay wire format: `{"cadence": <float>, "source": <string>}`.
fn overlay_payload(cadence_rpm: f64, source: &str) -> String {
    serde_json::json!({
        "cadence": cadence_rpm,
        "source": source,
    })
    .to_string()
}
