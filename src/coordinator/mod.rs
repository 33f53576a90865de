pub mod command;
pub mod config;
pub mod direction;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::axis::snapshot::AxisSnapshot;
use crate::axis::AxisController;
use crate::error::{ControlError, RejectReason};
use crate::registry::{DeviceRegistry, REQUIRED_DEVICE_COUNT};
use crate::settings::{self, SavedSerials};

use command::{AxisCommand, Responder};
use config::CoordinatorConfig;
use direction::{resolve_direction, JogControl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    X,
    Y,
}

impl AxisId {
    pub const BOTH: [AxisId; 2] = [AxisId::X, AxisId::Y];
}

impl std::fmt::Display for AxisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisId::X => write!(f, "x"),
            AxisId::Y => write!(f, "y"),
        }
    }
}

/// Operator-facing view of one axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisReadModel {
    pub serial: String,
    pub voltage: f64,
    pub jog_step: f64,
    pub max_voltage: f64,
    pub connected: bool,
    pub enabled: bool,
    pub increase_allowed: bool,
    pub decrease_allowed: bool,
}

struct AxisHandle {
    serial: String,
    tx: mpsc::Sender<AxisCommand>,
    /// Direction flag: true means the labelled controls match the physical
    /// jog sense. Reset to true whenever the axis is reassigned.
    direction_unflipped: AtomicBool,
}

/// Owns both axis controllers, each behind its own spawned command loop so
/// a slow operation on one axis never orders against the other. The only
/// shared state across axes is this coordinator's joint construction,
/// reassignment and shutdown.
pub struct DualAxisCoordinator {
    registry: DeviceRegistry,
    x: RwLock<AxisHandle>,
    y: RwLock<AxisHandle>,
    cache: Cache<String, Value>,
    config: CoordinatorConfig,
    settings_path: PathBuf,
}

impl DualAxisCoordinator {
    pub async fn new(
        registry: DeviceRegistry,
        config: CoordinatorConfig,
        serial_x: &str,
        serial_y: &str,
        settings_path: impl Into<PathBuf>,
    ) -> Result<Self, ControlError> {
        let x = Self::spawn_axis(&registry, serial_x, &config).await?;
        let y = Self::spawn_axis(&registry, serial_y, &config).await?;

        let cache = Cache::builder()
            .max_capacity(config.cache_capacity as u64)
            .time_to_live(config.read_model_ttl)
            .build();

        Ok(Self {
            registry,
            x: RwLock::new(x),
            y: RwLock::new(y),
            cache,
            config,
            settings_path: settings_path.into(),
        })
    }

    async fn spawn_axis(
        registry: &DeviceRegistry,
        serial: &str,
        config: &CoordinatorConfig,
    ) -> Result<AxisHandle, ControlError> {
        let controller = AxisController::connect(registry, serial).await?;
        let (tx, rx) = mpsc::channel(config.command_buffer);
        tokio::spawn(Self::axis_loop(controller, rx));
        Ok(AxisHandle {
            serial: serial.to_string(),
            tx,
            direction_unflipped: AtomicBool::new(true),
        })
    }

    async fn axis_loop(mut controller: AxisController, mut rx: mpsc::Receiver<AxisCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                AxisCommand::SetVoltage { value, resp } => {
                    let _ = resp.send(controller.set_voltage(value).await);
                }
                AxisCommand::SetJogStep { value, resp } => {
                    let _ = resp.send(controller.set_jog_step(value).await);
                }
                AxisCommand::Jog { direction, resp } => {
                    let _ = resp.send(controller.jog(direction).await);
                }
                AxisCommand::Zero { resp } => {
                    let _ = resp.send(controller.set_zero().await);
                }
                AxisCommand::Reconnect { resp } => {
                    let _ = resp.send(controller.reconnect().await);
                }
                AxisCommand::Disconnect { resp } => {
                    let _ = resp.send(controller.disconnect().await);
                }
                AxisCommand::Enable { resp } => {
                    let _ = resp.send(controller.enable().await);
                }
                AxisCommand::Disable { resp } => {
                    let _ = resp.send(controller.disable().await);
                }
                AxisCommand::Refresh { resp } => {
                    let result = controller.refresh().await.map(|_| controller.snapshot());
                    let _ = resp.send(result);
                }
                AxisCommand::Snapshot { resp } => {
                    let _ = resp.send(Ok(controller.snapshot()));
                }
                AxisCommand::Stop { resp } => {
                    let _ = resp.send(controller.stop().await);
                }
            }
        }
        // Handle replaced or dropped: leave the hardware stopped.
        if let Err(e) = controller.stop().await {
            warn!("Failed to stop axis {} on loop exit: {}", controller.serial(), e);
        }
    }

    fn handle(&self, axis: AxisId) -> &RwLock<AxisHandle> {
        match axis {
            AxisId::X => &self.x,
            AxisId::Y => &self.y,
        }
    }

    fn cache_key(axis: AxisId) -> String {
        format!("{}::read_model", axis)
    }

    async fn invalidate(&self, axis: AxisId) {
        self.cache.invalidate(&Self::cache_key(axis)).await;
    }

    async fn sender(&self, axis: AxisId) -> mpsc::Sender<AxisCommand> {
        self.handle(axis).read().await.tx.clone()
    }

    async fn send_unit<F>(&self, axis: AxisId, build: F) -> Result<(), ControlError>
    where
        F: FnOnce(Responder<()>) -> AxisCommand,
    {
        let tx = self.sender(axis).await;
        let (resp, rx) = oneshot::channel();
        tx.send(build(resp))
            .await
            .map_err(|_| ControlError::Rejected(RejectReason::Stopped))?;
        rx.await
            .map_err(|_| ControlError::Rejected(RejectReason::Stopped))?
    }

    async fn send_snapshot<F>(&self, axis: AxisId, build: F) -> Result<AxisSnapshot, ControlError>
    where
        F: FnOnce(Responder<AxisSnapshot>) -> AxisCommand,
    {
        let tx = self.sender(axis).await;
        let (resp, rx) = oneshot::channel();
        tx.send(build(resp))
            .await
            .map_err(|_| ControlError::Rejected(RejectReason::Stopped))?;
        rx.await
            .map_err(|_| ControlError::Rejected(RejectReason::Stopped))?
    }

    async fn mutate<F>(&self, axis: AxisId, build: F) -> Result<(), ControlError>
    where
        F: FnOnce(Responder<()>) -> AxisCommand,
    {
        let result = self.send_unit(axis, build).await;
        if result.is_ok() {
            self.invalidate(axis).await;
        }
        result
    }

    pub async fn set_voltage(&self, axis: AxisId, value: f64) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::SetVoltage { value, resp })
            .await
    }

    pub async fn set_jog_step(&self, axis: AxisId, value: f64) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::SetJogStep { value, resp })
            .await
    }

    pub async fn zero(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Zero { resp }).await
    }

    pub async fn connect(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Reconnect { resp })
            .await
    }

    pub async fn disconnect(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Disconnect { resp })
            .await
    }

    pub async fn enable(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Enable { resp }).await
    }

    pub async fn disable(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Disable { resp })
            .await
    }

    pub async fn stop_axis(&self, axis: AxisId) -> Result<(), ControlError> {
        self.mutate(axis, |resp| AxisCommand::Stop { resp }).await
    }

    pub async fn increase(&self, axis: AxisId) -> Result<(), ControlError> {
        self.jog_control(axis, JogControl::Increase).await
    }

    pub async fn decrease(&self, axis: AxisId) -> Result<(), ControlError> {
        self.jog_control(axis, JogControl::Decrease).await
    }

    async fn jog_control(&self, axis: AxisId, control: JogControl) -> Result<(), ControlError> {
        let unflipped = self
            .handle(axis)
            .read()
            .await
            .direction_unflipped
            .load(Ordering::Relaxed);
        let direction = resolve_direction(unflipped, control);
        self.mutate(axis, |resp| AxisCommand::Jog { direction, resp })
            .await
    }

    /// Flip the direction flag. Returns the new flag value; flipping twice
    /// restores the original control mapping.
    pub async fn toggle_direction(&self, axis: AxisId) -> bool {
        let previous = self
            .handle(axis)
            .read()
            .await
            .direction_unflipped
            .fetch_xor(true, Ordering::Relaxed);
        self.invalidate(axis).await;
        info!("Axis {} direction flag toggled to {}", axis, !previous);
        !previous
    }

    async fn build_model(&self, axis: AxisId, snapshot: AxisSnapshot) -> AxisReadModel {
        let unflipped = self
            .handle(axis)
            .read()
            .await
            .direction_unflipped
            .load(Ordering::Relaxed);
        let interlock = snapshot.interlock().through_direction(unflipped);
        AxisReadModel {
            serial: snapshot.serial.clone(),
            voltage: snapshot.voltage,
            jog_step: snapshot.jog_step,
            max_voltage: snapshot.max_voltage,
            connected: snapshot.is_connected(),
            enabled: snapshot.is_enabled(),
            increase_allowed: interlock.increase_allowed,
            decrease_allowed: interlock.decrease_allowed,
        }
    }

    pub async fn read_model(&self, axis: AxisId) -> Result<AxisReadModel, ControlError> {
        let key = Self::cache_key(axis);
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(model) = serde_json::from_value(value) {
                return Ok(model);
            }
        }

        let snapshot = self
            .send_snapshot(axis, |resp| AxisCommand::Snapshot { resp })
            .await?;
        let model = self.build_model(axis, snapshot).await;
        if let Ok(value) = serde_json::to_value(&model) {
            self.cache.insert(key, value).await;
        }
        Ok(model)
    }

    /// One poll tick for one axis: refresh the observed voltage when the
    /// axis is connected, recompute the interlock and rewrite the cached
    /// read model. Not connected is a silent skip, not an error.
    pub async fn poll_axis(&self, axis: AxisId) -> Result<(), ControlError> {
        let mut snapshot = self
            .send_snapshot(axis, |resp| AxisCommand::Snapshot { resp })
            .await?;
        if snapshot.is_connected() {
            snapshot = self
                .send_snapshot(axis, |resp| AxisCommand::Refresh { resp })
                .await?;
        }
        let model = self.build_model(axis, snapshot).await;
        if let Ok(value) = serde_json::to_value(&model) {
            self.cache.insert(Self::cache_key(axis), value).await;
        }
        Ok(())
    }

    /// Re-map which physical controller backs which axis label. Identity is
    /// validated against the live enumeration before either axis is touched;
    /// a validation failure leaves both axes running. A construction failure
    /// after that point leaves both axes stopped for explicit operator
    /// remediation (no automatic retry).
    pub async fn reassign_serials(
        &self,
        new_x: &str,
        new_y: &str,
    ) -> Result<(), ControlError> {
        self.registry
            .require_minimum_count(REQUIRED_DEVICE_COUNT)
            .await?;
        self.registry.validate(new_x).await?;
        self.registry.validate(new_y).await?;

        self.stop_axis(AxisId::X).await?;
        self.stop_axis(AxisId::Y).await?;

        let x = Self::spawn_axis(&self.registry, new_x, &self.config).await?;
        let y = Self::spawn_axis(&self.registry, new_y, &self.config).await?;
        *self.x.write().await = x;
        *self.y.write().await = y;
        self.cache.invalidate_all();

        let saved = SavedSerials {
            serial_x: new_x.to_string(),
            serial_y: new_y.to_string(),
        };
        if let Err(e) = settings::save(&self.settings_path, &saved).await {
            error!("Failed to persist reassigned serials: {}", e);
        }

        info!("Reassigned axes: X={}, Y={}", new_x, new_y);
        Ok(())
    }

    pub async fn serials(&self) -> (String, String) {
        let x = self.x.read().await.serial.clone();
        let y = self.y.read().await.serial.clone();
        (x, y)
    }

    /// Stop both axes. Stop is idempotent per axis, so shutdown may be
    /// called more than once.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.stop_axis(AxisId::X).await?;
        self.stop_axis(AxisId::Y).await?;
        info!("Both axes stopped");
        Ok(())
    }
}
