//! Bridge orchestrator.
//!
//! Owns the scanner, the per-device sessions, and the 1 Hz control tick
//! that drives the power profile, the cadence key mapper, and overlay
//! telemetry. The tick task and every session get their own tokio task;
//! the only state shared across them is the cadence estimator handle and
//! the immutable key tables.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::actuation::{ActuationEvent, ActuationSink, KeyAction, TrainerControl};
use crate::ble::scanner::BleScanner;
use crate::cadence::CadenceEstimator;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::mapper::CadenceKeyMapper;
use crate::session::{ClaimedDevices, DeviceSession, SessionState};
use crate::telemetry::OverlayClient;

/// Device label used for events emitted by the control tick.
const TICK_DEVICE_LABEL: &str = "cadence";

/// Central orchestrator: N controller sessions, an optional cadence-sensor
/// session, and the control tick.
pub struct Bridge {
    config: BridgeConfig,
    scanner: Arc<BleScanner>,
    sink: Arc<dyn ActuationSink>,
    trainer: Arc<dyn TrainerControl>,
    sessions: Vec<Arc<DeviceSession>>,
    estimator: Arc<Mutex<CadenceEstimator>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl Bridge {
    /// Control tick period.
    pub const TICK_PERIOD: Duration = Duration::from_secs(1);
    /// Bound on each task's teardown during shutdown.
    pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Create a bridge on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(
        config: BridgeConfig,
        sink: Arc<dyn ActuationSink>,
        trainer: Arc<dyn TrainerControl>,
    ) -> Result<Self> {
        let scanner = Arc::new(BleScanner::new().await?);
        Ok(Self::with_scanner(config, sink, trainer, scanner))
    }

    /// Create a bridge over an existing scanner.
    pub fn with_scanner(
        config: BridgeConfig,
        sink: Arc<dyn ActuationSink>,
        trainer: Arc<dyn TrainerControl>,
        scanner: Arc<BleScanner>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let estimator = Arc::new(Mutex::new(match &config.cadence_sensor {
            Some(sensor) => CadenceEstimator::with_stale_after(sensor.stale_after()),
            None => CadenceEstimator::new(),
        }));

        let claimed = ClaimedDevices::default();
        let keymaps = Arc::new(config.keymaps.clone());

        let mut sessions = Vec::new();
        for n in 1..=config.controllers.max_controllers {
            sessions.push(Arc::new(DeviceSession::controller(
                format!("pad-{}", n),
                config.controller_session(),
                keymaps.clone(),
                sink.clone(),
                claimed.clone(),
            )));
        }

        if let Some(session_config) = config.cadence_session() {
            sessions.push(Arc::new(DeviceSession::cadence_sensor(
                TICK_DEVICE_LABEL,
                session_config,
                estimator.clone(),
                claimed.clone(),
            )));
        }

        Self {
            config,
            scanner,
            sink,
            trainer,
            sessions,
            estimator,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Spawn every session task and the control tick.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Bridge already running");
            return;
        }

        info!("Starting bridge: {} session(s)", self.sessions.len());

        let mut handles = self.handles.lock();

        for session in &self.sessions {
            let task = session.clone().run(self.scanner.clone(), self.shutdown_rx.clone());
            handles.push(tokio::spawn(task));
        }

        handles.push(self.spawn_control_tick());
    }

    /// The tick task: power profile, cadence keys, overlay telemetry.
    fn spawn_control_tick(&self) -> JoinHandle<()> {
        let mut profile = self.config.profile.build();
        let trainer = self.trainer.clone();
        let sink = self.sink.clone();
        let estimator = self.estimator.clone();
        let overlay_config = self.config.overlay.clone();
        let mut cadence_keys =
            CadenceKeyMapper::new(self.config.cadence_thresholds, self.config.cadence_keys.clone());
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            info!("Control tick started, profile '{}'", profile.name());

            let overlay = match OverlayClient::bind(&overlay_config).await {
                Ok(client) => client,
                Err(e) => {
                    warn!("Overlay telemetry unavailable: {}", e);
                    None
                }
            };

            let started = Instant::now();
            let mut interval = tokio::time::interval(Bridge::TICK_PERIOD);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        let rpm = estimator.lock().current_rpm();
                        let sample = profile.tick(started.elapsed(), Some(rpm));

                        trace!(
                            "Tick: target {} W [{}], cadence {:.1} RPM",
                            sample.watts, sample.phase, rpm
                        );

                        if let Err(e) = trainer.set_target_power(&sample).await {
                            warn!("Trainer target write failed: {}", e);
                        }

                        let transitions = cadence_keys.apply(rpm);
                        for key in &transitions.to_release {
                            sink.actuate(&ActuationEvent::cadence(
                                TICK_DEVICE_LABEL, key, KeyAction::Release,
                            ));
                        }
                        for key in &transitions.to_press {
                            sink.actuate(&ActuationEvent::cadence(
                                TICK_DEVICE_LABEL, key, KeyAction::Press,
                            ));
                        }

                        if let Some(overlay) = &overlay {
                            overlay.send(rpm, "csc").await;
                        }
                    }
                }
            }

            // Leave no key held once the tick stops driving them.
            for key in cadence_keys.flush() {
                sink.actuate(&ActuationEvent::cadence(
                    TICK_DEVICE_LABEL,
                    &key,
                    KeyAction::Release,
                ));
            }

            debug!("Control tick ended");
        })
    }

    /// The sessions this bridge runs.
    pub fn sessions(&self) -> &[Arc<DeviceSession>] {
        &self.sessions
    }

    /// Snapshot of every session's state.
    pub fn session_states(&self) -> Vec<(String, SessionState)> {
        self.sessions
            .iter()
            .map(|s| (s.label().to_string(), s.state()))
            .collect()
    }

    /// Current staleness-aware cadence.
    pub fn cadence_rpm(&self) -> f64 {
        self.estimator.lock().current_rpm()
    }

    /// Whether the bridge has been started and not shut down.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait for every task's teardown, bounding each
    /// wait; a task that overruns the bound is abandoned.
    pub async fn shutdown(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down bridge");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for mut handle in handles {
            match tokio::time::timeout(Self::TEARDOWN_TIMEOUT, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Task teardown overran {:?}, abandoning", Self::TEARDOWN_TIMEOUT);
                    handle.abort();
                }
            }
        }

        info!("Bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // Tasks poll the watch channel; flipping it here covers the case
        // where the bridge is dropped without an explicit shutdown().
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("sessions", &self.sessions.len())
            .field("is_running", &self.is_running())
            .finish()
    }
}
