//! GATT characteristic handling.
//!
//! Caches a connected peripheral's characteristics and provides write,
//! subscribe/unsubscribe, and the raw notification stream. The stream is
//! handed to the session task unwrapped so frames are consumed in receipt
//! order; it is the per-device queue.

use btleplug::api::{Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Handler for GATT characteristics on a connected device.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Note: services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    /// Discover and cache all characteristics.
    ///
    /// This should be called after connecting and discovering services.
    pub fn discover_characteristics(&self) {
        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                trace!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid,
                    service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    fn get(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Write to a characteristic.
    pub async fn write(&self, uuid: &Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let characteristic = self.get(uuid)?;

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral
            .write(&characteristic, data, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), uuid);

        Ok(())
    }

    /// Subscribe to notifications from a characteristic.
    ///
    /// Failures are reported as `SubscriptionFailed` so callers can treat
    /// each characteristic independently.
    pub async fn subscribe(&self, uuid: &Uuid) -> Result<()> {
        let characteristic = self.get(uuid).map_err(|e| Error::SubscriptionFailed {
            uuid: uuid.to_string(),
            reason: e.to_string(),
        })?;

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| Error::SubscriptionFailed {
                uuid: uuid.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Subscribed to notifications from {}", uuid);

        Ok(())
    }

    /// Unsubscribe from notifications from a characteristic.
    pub async fn unsubscribe(&self, uuid: &Uuid) -> Result<()> {
        let characteristic = self.get(uuid)?;

        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", uuid);

        Ok(())
    }

    /// The peripheral's notification stream.
    ///
    /// One stream per session; items arrive in receipt order across all
    /// subscribed characteristics of this device.
    pub async fn notifications(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = ValueNotification> + Send>>> {
        self.peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)
    }

    /// Number of cached characteristics.
    pub fn characteristic_count(&self) -> usize {
        self.characteristics.read().len()
    }
}

impl std::fmt::Debug for CharacteristicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacteristicHandler")
            .field("characteristics", &self.characteristic_count())
            .finish()
    }
}
