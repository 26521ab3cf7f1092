//! Device session lifecycle.
//!
//! One `DeviceSession` owns one physical device: its scan/connect cycle, the
//! vendor handshake, notification subscriptions, in-order frame dispatch,
//! and reconnect backoff. Sessions are isolated from each other; a failure
//! in one never touches another session or the control tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Peripheral as _, ValueNotification};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::actuation::{ActuationEvent, ActuationSink, KeyAction};
use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::scanner::{BleScanner, DeviceFilter, DiscoveredDevice};
use crate::ble::uuids::{
    CSC_MEASUREMENT_UUID, PLAY_ASYNC_CHARACTERISTIC_UUID, PLAY_SYNC_RX_CHARACTERISTIC_UUID,
    PLAY_SYNC_TX_CHARACTERISTIC_UUID, RIDE_ON,
};
use crate::cadence::CadenceEstimator;
use crate::error::{Error, Result};
use crate::mapper::{InputEdgeMapper, KeyMaps};
use crate::protocol::csc::parse_csc_measurement;
use crate::protocol::keypad::{
    ButtonSnapshot, ControllerSide, PadButton, BATTERY_MESSAGE_TYPE, IDLE_MESSAGE_TYPE,
    KEYPAD_MESSAGE_TYPE,
};

/// Addresses currently bound to a session, shared so two controller
/// sessions never claim the same physical device.
pub type ClaimedDevices = Arc<Mutex<HashSet<String>>>;

/// Lifecycle state of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Session created, not yet started.
    #[default]
    Idle,
    /// Running a bounded discovery scan.
    Scanning,
    /// Connecting to the matched peripheral.
    Connecting,
    /// Writing the vendor handshake.
    Handshaking,
    /// Registering notification subscriptions.
    Subscribed,
    /// Consuming the notification stream.
    Active,
    /// Between connection attempts (backoff).
    Disconnected,
    /// Scan filter matched nothing after the configured attempts.
    /// Terminal until discovery is restarted externally.
    Failed,
}

impl SessionState {
    /// Check if the session is processing frames.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the session has given up permanently.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Active => write!(f, "Active"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What kind of device a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// A play controller: handshake, keypad frames, edge mapping.
    Controller,
    /// A cadence sensor: CSC measurement frames into the estimator.
    CadenceSensor,
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scan filter for this session's device.
    pub filter: DeviceFilter,
    /// Bound on each discovery scan.
    pub scan_timeout: Duration,
    /// Fixed delay between reconnect attempts (not exponential).
    pub reconnect_backoff: Duration,
    /// Consecutive empty scans before entering `Failed`. `None` retries
    /// forever.
    pub max_scan_attempts: Option<u32>,
}

impl SessionConfig {
    /// Default scan timeout.
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(6);
    /// Default reconnect backoff.
    pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

    /// Config with defaults for a filter.
    pub fn new(filter: DeviceFilter) -> Self {
        Self {
            filter,
            scan_timeout: Self::DEFAULT_SCAN_TIMEOUT,
            reconnect_backoff: Self::DEFAULT_RECONNECT_BACKOFF,
            max_scan_attempts: None,
        }
    }
}

enum RoleState {
    Controller {
        keymaps: Arc<KeyMaps>,
        sink: Arc<dyn ActuationSink>,
    },
    CadenceSensor {
        estimator: Arc<Mutex<CadenceEstimator>>,
    },
}

/// A session bound to one physical device for its whole lifetime.
pub struct DeviceSession {
    label: String,
    config: SessionConfig,
    role: RoleState,
    state: RwLock<SessionState>,
    state_tx: broadcast::Sender<SessionState>,
    battery_percent: RwLock<Option<u8>>,
    claimed: ClaimedDevices,
}

impl DeviceSession {
    /// Create a controller session.
    pub fn controller(
        label: impl Into<String>,
        config: SessionConfig,
        keymaps: Arc<KeyMaps>,
        sink: Arc<dyn ActuationSink>,
        claimed: ClaimedDevices,
    ) -> Self {
        Self::new(label, config, RoleState::Controller { keymaps, sink }, claimed)
    }

    /// Create a cadence-sensor session feeding the given estimator.
    pub fn cadence_sensor(
        label: impl Into<String>,
        config: SessionConfig,
        estimator: Arc<Mutex<CadenceEstimator>>,
        claimed: ClaimedDevices,
    ) -> Self {
        Self::new(label, config, RoleState::CadenceSensor { estimator }, claimed)
    }

    fn new(
        label: impl Into<String>,
        config: SessionConfig,
        role: RoleState,
        claimed: ClaimedDevices,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(16);
        Self {
            label: label.into(),
            config,
            role,
            state: RwLock::new(SessionState::Idle),
            state_tx,
            battery_percent: RwLock::new(None),
            claimed,
        }
    }

    /// The session's display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The session's device role.
    pub fn role(&self) -> DeviceRole {
        match self.role {
            RoleState::Controller { .. } => DeviceRole::Controller,
            RoleState::CadenceSensor { .. } => DeviceRole::CadenceSensor,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> broadcast::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Last reported battery level, if the device sent one.
    pub fn battery_percent(&self) -> Option<u8> {
        *self.battery_percent.read()
    }

    /// Run the session until shutdown or `Failed`.
    ///
    /// Scan, connect, process, and on any transport error fall back to a
    /// fixed backoff and scan again, indefinitely.
    pub async fn run(
        self: Arc<Self>,
        scanner: Arc<BleScanner>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut empty_scans: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(SessionState::Scanning);
            let claimed_snapshot = self.claimed.lock().clone();
            let found = scanner
                .scan_for(&self.config.filter, self.config.scan_timeout, &claimed_snapshot)
                .await;

            match found {
                Ok(Some(device)) => {
                    empty_scans = 0;
                    self.claimed.lock().insert(device.id.clone());

                    let outcome = self.drive(&device, &mut shutdown).await;

                    self.claimed.lock().remove(&device.id);
                    if let Err(e) = outcome {
                        warn!("[{}] Session ended: {}", self.label, e);
                    }
                    self.set_state(SessionState::Disconnected);
                }
                Ok(None) => {
                    empty_scans += 1;
                    if let Some(max) = self.config.max_scan_attempts {
                        if empty_scans >= max {
                            warn!(
                                "[{}] No device matched {} after {} attempts, giving up",
                                self.label,
                                self.config.filter.describe(),
                                empty_scans
                            );
                            self.set_state(SessionState::Failed);
                            return;
                        }
                    }
                    self.set_state(SessionState::Disconnected);
                }
                Err(e) => {
                    warn!("[{}] Scan failed: {}", self.label, e);
                    self.set_state(SessionState::Disconnected);
                }
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }

        self.set_state(SessionState::Disconnected);
        debug!("[{}] Session task ended", self.label);
    }

    /// One connection's worth of work: connect, handshake, subscribe,
    /// dispatch frames until the stream ends or shutdown is requested.
    async fn drive(
        &self,
        device: &DiscoveredDevice,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        self.set_state(SessionState::Connecting);
        info!("[{}] Connecting to {}", self.label, device.label());

        device
            .peripheral
            .connect()
            .await
            .map_err(|e| Error::ConnectionFailed {
                reason: e.to_string(),
            })?;

        if let Err(e) = device.peripheral.discover_services().await {
            warn!("[{}] Failed to discover services: {}", self.label, e);
        }

        let handler = CharacteristicHandler::new(device.peripheral.clone());
        handler.discover_characteristics();

        if matches!(self.role, RoleState::Controller { .. }) {
            self.set_state(SessionState::Handshaking);
            // Write-without-response; some firmware accepts notifications
            // without the hello, so a failure is a warning, not an exit.
            match handler
                .write(&PLAY_SYNC_RX_CHARACTERISTIC_UUID, &RIDE_ON, false)
                .await
            {
                Ok(()) => debug!("[{}] Handshake written", self.label),
                Err(e) => {
                    let err = Error::HandshakeWriteFailed {
                        reason: e.to_string(),
                    };
                    warn!("[{}] {}", self.label, err);
                }
            }
        }

        self.set_state(SessionState::Subscribed);
        let notify_uuids = self.notify_characteristics();
        let mut subscribed = 0usize;
        for uuid in &notify_uuids {
            // Each characteristic is independent: one failing does not stop
            // the other from being used.
            match handler.subscribe(uuid).await {
                Ok(()) => subscribed += 1,
                Err(e) => warn!("[{}] {}", self.label, e),
            }
        }
        if subscribed == 0 {
            warn!(
                "[{}] No subscription succeeded; idling until disconnect",
                self.label
            );
        }

        let mut frames = handler.notifications().await?;

        self.set_state(SessionState::Active);
        info!("[{}] Ready", self.label);

        let mut mapper = InputEdgeMapper::new();
        let mut last_side = ControllerSide::Left;

        let outcome = loop {
            tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                maybe_frame = frames.next() => match maybe_frame {
                    Some(frame) => self.dispatch(&frame, &mut mapper, &mut last_side),
                    None => break Err(Error::ConnectionLost),
                }
            }
        };

        self.teardown(&device.peripheral, &handler, &mut mapper, last_side, &notify_uuids)
            .await;

        outcome
    }

    /// The notification characteristics this role consumes.
    fn notify_characteristics(&self) -> Vec<Uuid> {
        match self.role {
            RoleState::Controller { .. } => vec![
                PLAY_ASYNC_CHARACTERISTIC_UUID,
                PLAY_SYNC_TX_CHARACTERISTIC_UUID,
            ],
            RoleState::CadenceSensor { .. } => vec![CSC_MEASUREMENT_UUID],
        }
    }

    /// Route one notification. Decode failures drop the frame only.
    fn dispatch(
        &self,
        frame: &ValueNotification,
        mapper: &mut InputEdgeMapper,
        last_side: &mut ControllerSide,
    ) {
        match &self.role {
            RoleState::Controller { keymaps, sink } => {
                if frame.uuid == PLAY_ASYNC_CHARACTERISTIC_UUID {
                    self.dispatch_controller_frame(&frame.value, mapper, last_side, keymaps, sink);
                } else if frame.uuid == PLAY_SYNC_TX_CHARACTERISTIC_UUID {
                    trace!("[{}] Sync response: {:02X?}", self.label, frame.value);
                } else {
                    trace!("[{}] Notification on unexpected {}", self.label, frame.uuid);
                }
            }
            RoleState::CadenceSensor { estimator } => {
                if frame.uuid != CSC_MEASUREMENT_UUID {
                    trace!("[{}] Notification on unexpected {}", self.label, frame.uuid);
                    return;
                }
                match parse_csc_measurement(&frame.value) {
                    Ok(Some(sample)) => {
                        let rpm = estimator.lock().update(sample);
                        trace!("[{}] Cadence {:.1} RPM", self.label, rpm);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("[{}] Dropping CSC frame: {}", self.label, e),
                }
            }
        }
    }

    /// Decode one controller frame by its type tag.
    fn dispatch_controller_frame(
        &self,
        frame: &[u8],
        mapper: &mut InputEdgeMapper,
        last_side: &mut ControllerSide,
        keymaps: &KeyMaps,
        sink: &Arc<dyn ActuationSink>,
    ) {
        let Some((&msg_type, payload)) = frame.split_first() else {
            return;
        };

        match msg_type {
            KEYPAD_MESSAGE_TYPE => match ButtonSnapshot::parse(payload) {
                Ok(snapshot) => {
                    *last_side = snapshot.side;
                    let transitions = mapper.apply(&snapshot);
                    let keymap = keymaps.for_side(snapshot.side);

                    // Releases first so a key shared between buttons is
                    // never left stuck by a same-frame press.
                    for button in &transitions.to_release {
                        self.emit(sink, keymap, *button, KeyAction::Release);
                    }
                    for button in &transitions.to_press {
                        self.emit(sink, keymap, *button, KeyAction::Press);
                    }
                }
                Err(e) => warn!(
                    "[{}] Dropping keypad frame: {} (raw {:02X?})",
                    self.label, e, payload
                ),
            },
            IDLE_MESSAGE_TYPE => trace!("[{}] Idle keep-alive", self.label),
            BATTERY_MESSAGE_TYPE => {
                if let Some(&pct) = payload.get(1) {
                    *self.battery_percent.write() = Some(pct);
                    debug!("[{}] Battery: {}%", self.label, pct);
                }
            }
            other => debug!(
                "[{}] Unrecognized message type {:#04x}, dropping",
                self.label, other
            ),
        }
    }

    fn emit(&self, sink: &Arc<dyn ActuationSink>, keymap: &crate::mapper::KeyMap, button: PadButton, action: KeyAction) {
        // Unmapped buttons produce no event at all.
        let Some(key) = keymap.key_for(button) else {
            return;
        };
        debug!("[{}] {} {} -> {}", self.label, action, button, key);
        sink.actuate(&ActuationEvent::button(&self.label, button, key, action));
    }

    /// Release everything still held, so no key outlives the connection.
    fn flush_releases(&self, mapper: &mut InputEdgeMapper, last_side: ControllerSide) {
        if let RoleState::Controller { keymaps, sink } = &self.role {
            let keymap = keymaps.for_side(last_side);
            for button in mapper.flush() {
                self.emit(sink, keymap, button, KeyAction::Release);
            }
        }
    }

    /// Best-effort teardown: flush releases, unsubscribe, disconnect.
    async fn teardown(
        &self,
        peripheral: &Peripheral,
        handler: &CharacteristicHandler,
        mapper: &mut InputEdgeMapper,
        last_side: ControllerSide,
        notify_uuids: &[Uuid],
    ) {
        self.flush_releases(mapper, last_side);

        for uuid in notify_uuids {
            if let Err(e) = handler.unsubscribe(uuid).await {
                debug!("[{}] Unsubscribe {} failed: {}", self.label, uuid, e);
            }
        }

        if let Err(e) = peripheral.disconnect().await {
            debug!("[{}] Disconnect failed: {}", self.label, e);
        }

        info!("[{}] Disconnected", self.label);
    }

    fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("[{}] State: {} -> {}", self.label, old_state, new_state);
            let _ = self.state_tx.send(new_state);
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("label", &self.label)
            .field("role", &self.role())
            .field("state", &self.state())
            .finish()
    }
}
