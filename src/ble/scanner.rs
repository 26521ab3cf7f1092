//! BLE scanning functionality.
//!
//! Provides bounded-timeout discovery of controllers and cadence sensors by
//! name substring or address. Sessions own their scan cycle, so scans are
//! serialized over the shared adapter.

use std::collections::HashSet;
use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// Which device a scan is looking for.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    /// Exact address (or platform peripheral id) to match, if known.
    pub address: Option<String>,
    /// Case-insensitive name substring to match when no address is pinned.
    pub name_contains: Option<String>,
}

impl DeviceFilter {
    /// Filter by address.
    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            name_contains: None,
        }
    }

    /// Filter by name substring.
    pub fn by_name(substr: impl Into<String>) -> Self {
        Self {
            address: None,
            name_contains: Some(substr.into()),
        }
    }

    /// Human-readable description for logs and errors.
    pub fn describe(&self) -> String {
        match (&self.address, &self.name_contains) {
            (Some(addr), _) => format!("address={}", addr),
            (None, Some(name)) => format!("name~='{}'", name),
            (None, None) => "any".to_string(),
        }
    }

    fn matches(&self, id: &str, address: &str, name: Option<&str>) -> bool {
        if let Some(want) = &self.address {
            return want.eq_ignore_ascii_case(address) || want.eq_ignore_ascii_case(id);
        }
        if let Some(want) = &self.name_contains {
            return name
                .map(|n| n.to_lowercase().contains(&want.to_lowercase()))
                .unwrap_or(false);
        }
        true
    }
}

/// A peripheral that matched a scan filter.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Platform peripheral identifier (stable for the adapter's lifetime).
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// The peripheral handle.
    pub peripheral: Peripheral,
}

impl DiscoveredDevice {
    /// Display label: the advertised name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// BLE scanner shared by all sessions.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Serializes scan cycles: concurrent sessions take turns.
    scan_lock: Mutex<()>,
}

impl BleScanner {
    /// Create a new BLE scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            scan_lock: Mutex::new(()),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Run one bounded scan and return the first match not in `claimed`.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a match; callers
    /// decide whether that feeds a retry or a terminal state.
    pub async fn scan_for(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
        claimed: &HashSet<String>,
    ) -> Result<Option<DiscoveredDevice>> {
        let _guard = self.scan_lock.lock().await;

        debug!("Scanning for {} (timeout {:?})", filter.describe(), timeout);

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        let result = self.scan_loop(filter, timeout, claimed).await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        match &result {
            Ok(Some(device)) => info!("Found {} ({})", device.label(), filter.describe()),
            Ok(None) => debug!("No device matched {} before timeout", filter.describe()),
            Err(e) => debug!("Scan failed: {}", e),
        }

        result
    }

    async fn scan_loop(
        &self,
        filter: &DeviceFilter,
        timeout: Duration,
        claimed: &HashSet<String>,
    ) -> Result<Option<DiscoveredDevice>> {
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let deadline = tokio::time::Instant::now() + timeout;

        // Peripherals the adapter already knows about never re-announce, so
        // sweep the cache before waiting on fresh advertisements.
        for peripheral in self.adapter.peripherals().await.map_err(Error::Bluetooth)? {
            if let Some(device) = self.check_peripheral(peripheral, filter, claimed).await {
                return Ok(Some(device));
            }
        }

        loop {
            tokio::select! {
                maybe_event = events.next() => {
                    let Some(event) = maybe_event else {
                        return Ok(None);
                    };

                    use btleplug::api::CentralEvent;
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => continue,
                    };

                    let peripheral = match self.adapter.peripheral(&id).await {
                        Ok(p) => p,
                        Err(e) => {
                            trace!("Failed to get peripheral {:?}: {}", id, e);
                            continue;
                        }
                    };

                    if let Some(device) = self.check_peripheral(peripheral, filter, claimed).await {
                        return Ok(Some(device));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(None);
                }
            }
        }
    }

    async fn check_peripheral(
        &self,
        peripheral: Peripheral,
        filter: &DeviceFilter,
        claimed: &HashSet<String>,
    ) -> Option<DiscoveredDevice> {
        let id = peripheral.id().to_string();
        if claimed.contains(&id) {
            return None;
        }

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let address = properties.address.to_string();
        let name = properties.local_name;

        if !filter.matches(&id, &address, name.as_deref()) {
            trace!("Skipping {} ({:?})", address, name);
            return None;
        }

        Some(DiscoveredDevice {
            id,
            name,
            peripheral,
        })
    }
}
