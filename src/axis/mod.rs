pub mod interlock;
pub mod settle;
pub mod snapshot;
pub mod state;

use tokio::time::Duration;
use tracing::{debug, info};

use crate::driver::{JogDirection, PiezoDevice};
use crate::error::{ControlError, RejectReason};
use crate::registry::{DeviceRegistry, REQUIRED_DEVICE_COUNT};

use settle::SettleWindow;
use snapshot::AxisSnapshot;
use state::AxisState;

/// Cadence of the device's own internal refresh loop.
pub const DEVICE_POLL_INTERVAL_MS: u64 = 250;
pub const SETTINGS_INIT_TIMEOUT_MS: u64 = 10_000;
pub const MAX_JOG_STEP: f64 = 10.0;

const CONNECT_SETTLE: Duration = Duration::from_millis(500);
const ENABLE_SETTLE: Duration = Duration::from_millis(250);
const VOLTAGE_SETTLE: Duration = Duration::from_secs(1);
const JOG_STEP_SETTLE: Duration = Duration::from_millis(250);
const DISCONNECT_SETTLE: Duration = Duration::from_secs(1);

/// Owns one controller device and drives its connect/enable lifecycle.
///
/// Fixed hardware settle delays are not slept through: each one is recorded
/// as a [`SettleWindow`] and commands arriving inside the window are rejected
/// with `Rejected(Settling)`. The one genuine wait is the bounded
/// settings-initialization wait during bring-up.
pub struct AxisController {
    serial: String,
    device: Box<dyn PiezoDevice>,
    state: AxisState,
    settle: Option<SettleWindow>,
    max_voltage: f64,
    observed_voltage: f64,
    jog_step: f64,
}

impl std::fmt::Debug for AxisController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisController")
            .field("serial", &self.serial)
            .field("device", &"<dyn PiezoDevice>")
            .field("state", &self.state)
            .field("settle", &self.settle)
            .field("max_voltage", &self.max_voltage)
            .field("observed_voltage", &self.observed_voltage)
            .field("jog_step", &self.jog_step)
            .finish()
    }
}

impl AxisController {
    /// Validates the serial against the registry, opens the device and runs
    /// the full bring-up sequence. On any failure no controller escapes.
    pub async fn connect(
        registry: &DeviceRegistry,
        serial: &str,
    ) -> Result<Self, ControlError> {
        registry.require_minimum_count(REQUIRED_DEVICE_COUNT).await?;
        registry.validate(serial).await?;

        let device = registry.open(serial).await?;
        let mut controller = Self {
            serial: serial.to_string(),
            device,
            state: AxisState::Disconnected,
            settle: None,
            max_voltage: 0.0,
            observed_voltage: 0.0,
            jog_step: 0.0,
        };
        controller.bring_up().await?;

        controller.max_voltage = controller.device.get_max_output_voltage().await?;
        controller.jog_step = controller.device.get_jog_step().await?;
        controller.observed_voltage = controller.device.get_output_voltage().await?;

        info!("Initialized axis {}", controller.serial);
        Ok(controller)
    }

    /// Connect, start the device's internal polling and enable output.
    /// Shared by construction and operator reconnect.
    async fn bring_up(&mut self) -> Result<(), ControlError> {
        self.state = AxisState::Connecting;

        if !self.device.is_connected().await {
            self.device.connect().await?;
        }
        self.device.start_polling(DEVICE_POLL_INTERVAL_MS).await?;
        tokio::time::sleep(CONNECT_SETTLE).await;
        self.state = AxisState::ConnectedDisabled;

        self.device.enable().await?;
        self.state = AxisState::ConnectedEnabled;
        self.settle = Some(SettleWindow::after(ENABLE_SETTLE));

        if !self.device.is_settings_initialized().await {
            let initialized = self
                .device
                .wait_for_settings_initialized(SETTINGS_INIT_TIMEOUT_MS)
                .await?;
            if !initialized {
                return Err(ControlError::Timeout {
                    waited_ms: SETTINGS_INIT_TIMEOUT_MS,
                });
            }
        }
        Ok(())
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn state(&self) -> AxisState {
        self.state
    }

    pub fn voltage(&self) -> f64 {
        self.observed_voltage
    }

    pub fn jog_step(&self) -> f64 {
        self.jog_step
    }

    pub fn max_voltage(&self) -> f64 {
        self.max_voltage
    }

    pub fn is_settling(&self) -> bool {
        self.settle.map(|w| w.is_active()).unwrap_or(false)
    }

    pub fn snapshot(&self) -> AxisSnapshot {
        AxisSnapshot {
            serial: self.serial.clone(),
            state: self.state,
            voltage: self.observed_voltage,
            jog_step: self.jog_step,
            max_voltage: self.max_voltage,
        }
    }

    fn ensure_accepting(&mut self) -> Result<(), ControlError> {
        if self.state.is_stopped() {
            return Err(ControlError::Rejected(RejectReason::Stopped));
        }
        if let Some(window) = self.settle {
            if window.is_active() {
                return Err(ControlError::Rejected(RejectReason::Settling));
            }
            self.settle = None;
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), ControlError> {
        if !self.state.is_connected() {
            return Err(ControlError::Rejected(RejectReason::NotConnected));
        }
        Ok(())
    }

    /// Commit a new output voltage. Accepted only inside `0..=max_voltage`;
    /// a rejection leaves both the device and the stored voltage untouched.
    pub async fn set_voltage(&mut self, voltage: f64) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        if !(0.0..=self.max_voltage).contains(&voltage) {
            return Err(ControlError::Rejected(RejectReason::VoltageOutOfRange {
                requested: voltage,
                max: self.max_voltage,
            }));
        }

        self.device.set_output_voltage(voltage).await?;
        self.observed_voltage = voltage;
        self.settle = Some(SettleWindow::after(VOLTAGE_SETTLE));
        debug!("Axis {} voltage set to {}", self.serial, voltage);
        Ok(())
    }

    pub async fn set_jog_step(&mut self, step: f64) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        if !(0.0..=MAX_JOG_STEP).contains(&step) {
            return Err(ControlError::Rejected(RejectReason::JogStepOutOfRange {
                requested: step,
            }));
        }

        self.device.set_jog_step(step).await?;
        self.jog_step = step;
        self.settle = Some(SettleWindow::after(JOG_STEP_SETTLE));
        debug!("Axis {} jog step set to {}", self.serial, step);
        Ok(())
    }

    /// Single step move by the configured jog step. The pre-check only
    /// guards against jogging from an already-invalid voltage reading; the
    /// firmware enforces the physical floor and ceiling on the move itself.
    pub async fn jog(&mut self, direction: JogDirection) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        if !(0.0..=self.max_voltage).contains(&self.observed_voltage) {
            return Err(ControlError::Rejected(
                RejectReason::ObservedVoltageOutOfRange {
                    observed: self.observed_voltage,
                    max: self.max_voltage,
                },
            ));
        }

        self.device.jog(direction).await?;
        self.observed_voltage = self.device.get_output_voltage().await?;
        Ok(())
    }

    /// Command the device to its zero reference.
    pub async fn set_zero(&mut self) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        self.device.set_zero().await?;
        self.observed_voltage = self.device.get_output_voltage().await?;
        Ok(())
    }

    /// Re-read the device's reported output voltage. A read, so it bypasses
    /// the settle window; silently no-ops when not connected.
    pub async fn refresh(&mut self) -> Result<(), ControlError> {
        if !self.state.is_connected() {
            return Ok(());
        }
        self.observed_voltage = self.device.get_output_voltage().await?;
        Ok(())
    }

    /// Stop the device's internal polling and drop the hardware connection
    /// without disabling the output stage. No-op when already disconnected.
    pub async fn disconnect(&mut self) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        if !self.state.is_connected() {
            return Ok(());
        }
        self.device.stop_polling().await?;
        self.device.disconnect().await?;
        self.state = AxisState::Disconnected;
        self.settle = Some(SettleWindow::after(DISCONNECT_SETTLE));
        info!("Axis {} disconnected", self.serial);
        Ok(())
    }

    /// Re-run the bring-up sequence after an operator disconnect.
    pub async fn reconnect(&mut self) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.bring_up().await?;
        self.observed_voltage = self.device.get_output_voltage().await?;
        info!("Axis {} reconnected", self.serial);
        Ok(())
    }

    /// Re-enable the output stage.
    ///
    /// The device keeps the memory of the last commanded voltage across a
    /// disable/enable cycle: the output comes back near zero, but a jog
    /// issued right after re-enabling moves relative to the pre-disable
    /// voltage, not from the output. Firmware behavior, not ours to fix.
    pub async fn enable(&mut self) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        self.device.enable().await?;
        self.state = AxisState::ConnectedEnabled;
        self.settle = Some(SettleWindow::after(ENABLE_SETTLE));
        Ok(())
    }

    /// Disable the output stage. The hardware connection stays up.
    pub async fn disable(&mut self) -> Result<(), ControlError> {
        self.ensure_accepting()?;
        self.ensure_connected()?;
        self.device.disable().await?;
        self.state = AxisState::ConnectedDisabled;
        self.settle = Some(SettleWindow::after(ENABLE_SETTLE));
        Ok(())
    }

    /// Disable, stop polling and disconnect; the axis is terminal afterwards
    /// and a new controller must be constructed to resume control of this
    /// serial. Idempotent: stopping a stopped axis is an Ok no-op. Stop is
    /// the one command that does not respect an active settle window.
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        if self.state.is_stopped() {
            return Ok(());
        }
        if self.state.is_connected() {
            self.device.disable().await?;
            self.device.stop_polling().await?;
            self.device.disconnect().await?;
        }
        self.state = AxisState::Stopped;
        self.settle = None;
        info!("Stopped axis {}", self.serial);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockDeviceState, MockPiezoDriver};
    use std::sync::Arc;

    async fn test_setup() -> (DeviceRegistry, Arc<MockDeviceState>) {
        let mut driver = MockPiezoDriver::new();
        let device = driver.add_device("29251927", 75.0);
        driver.add_device("29251900", 75.0);
        (DeviceRegistry::new(Arc::new(driver)), device)
    }

    async fn connected_axis() -> (AxisController, Arc<MockDeviceState>) {
        let (registry, device) = test_setup().await;
        let axis = AxisController::connect(&registry, "29251927").await.unwrap();
        // Let the post-enable settle window elapse.
        tokio::time::advance(Duration::from_millis(251)).await;
        (axis, device)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reaches_enabled_state() {
        let (registry, device) = test_setup().await;
        let axis = AxisController::connect(&registry, "29251927").await.unwrap();

        assert_eq!(axis.state(), AxisState::ConnectedEnabled);
        assert_eq!(axis.max_voltage(), 75.0);
        assert!(device.is_polling().await);
        // The post-enable settle window is still open.
        assert!(axis.is_settling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_fails_on_settings_timeout() {
        let (registry, device) = test_setup().await;
        device.set_settings_init_delay(None).await;

        let err = AxisController::connect(&registry, "29251927")
            .await
            .unwrap_err();
        match err {
            ControlError::Timeout { waited_ms } => assert_eq!(waited_ms, 10_000),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_voltage_commits_in_range() {
        let (mut axis, device) = connected_axis().await;

        axis.set_voltage(40.0).await.unwrap();
        assert_eq!(axis.voltage(), 40.0);
        assert_eq!(device.output_voltage().await, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_voltage_rejects_out_of_range() {
        let (mut axis, device) = connected_axis().await;
        axis.set_voltage(40.0).await.unwrap();
        tokio::time::advance(Duration::from_millis(1001)).await;

        let err = axis.set_voltage(80.0).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Rejected(RejectReason::VoltageOutOfRange { .. })
        ));
        let err = axis.set_voltage(-1.0).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Rejected(RejectReason::VoltageOutOfRange { .. })
        ));
        // No partial mutation on rejection.
        assert_eq!(axis.voltage(), 40.0);
        assert_eq!(device.output_voltage().await, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_rejected_while_settling() {
        let (mut axis, _device) = connected_axis().await;

        axis.set_voltage(10.0).await.unwrap();
        let err = axis.set_voltage(20.0).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Rejected(RejectReason::Settling)
        ));

        tokio::time::advance(Duration::from_millis(1001)).await;
        axis.set_voltage(20.0).await.unwrap();
        assert_eq!(axis.voltage(), 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jog_step_round_trip_and_bounds() {
        let (mut axis, _device) = connected_axis().await;

        axis.set_jog_step(2.5).await.unwrap();
        assert_eq!(axis.jog_step(), 2.5);

        tokio::time::advance(Duration::from_millis(251)).await;
        let err = axis.set_jog_step(10.5).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Rejected(RejectReason::JogStepOutOfRange { .. })
        ));
        assert_eq!(axis.jog_step(), 2.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jog_moves_by_configured_step() {
        let (mut axis, _device) = connected_axis().await;
        axis.set_voltage(40.0).await.unwrap();
        tokio::time::advance(Duration::from_millis(1001)).await;
        axis.set_jog_step(5.0).await.unwrap();
        tokio::time::advance(Duration::from_millis(251)).await;

        axis.jog(JogDirection::Increase).await.unwrap();
        assert_eq!(axis.voltage(), 45.0);
        axis.jog(JogDirection::Decrease).await.unwrap();
        axis.jog(JogDirection::Decrease).await.unwrap();
        assert_eq!(axis.voltage(), 35.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenable_keeps_remembered_voltage_for_jog() {
        let (mut axis, _device) = connected_axis().await;
        axis.set_voltage(0.6).await.unwrap();
        tokio::time::advance(Duration::from_millis(1001)).await;
        axis.set_jog_step(0.1).await.unwrap();
        tokio::time::advance(Duration::from_millis(251)).await;

        axis.disable().await.unwrap();
        tokio::time::advance(Duration::from_millis(251)).await;
        axis.enable().await.unwrap();
        tokio::time::advance(Duration::from_millis(251)).await;

        axis.refresh().await.unwrap();
        assert_eq!(axis.voltage(), 0.0);

        // Jogs from the remembered 0.6 V, not from the near-zero output.
        axis.jog(JogDirection::Increase).await.unwrap();
        assert!((axis.voltage() - 0.7).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_terminal() {
        let (mut axis, device) = connected_axis().await;

        axis.stop().await.unwrap();
        assert_eq!(axis.state(), AxisState::Stopped);
        assert!(!device.is_polling().await);

        // Second stop is an Ok no-op, not an error.
        axis.stop().await.unwrap();
        assert_eq!(axis.state(), AxisState::Stopped);

        let err = axis.set_voltage(10.0).await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected(RejectReason::Stopped)));
        let err = axis.jog(JogDirection::Increase).await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected(RejectReason::Stopped)));
        let err = axis.reconnect().await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected(RejectReason::Stopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_and_reconnect_cycle() {
        let (mut axis, device) = connected_axis().await;

        axis.disconnect().await.unwrap();
        assert_eq!(axis.state(), AxisState::Disconnected);
        assert!(!device.is_polling().await);

        // Disconnect settle window, then bring the axis back.
        tokio::time::advance(Duration::from_millis(1001)).await;
        axis.reconnect().await.unwrap();
        assert_eq!(axis.state(), AxisState::ConnectedEnabled);
        assert!(device.is_polling().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_tracks_device_output() {
        let (mut axis, device) = connected_axis().await;
        axis.set_voltage(12.5).await.unwrap();
        assert_eq!(device.output_voltage().await, 12.5);

        axis.refresh().await.unwrap();
        assert_eq!(axis.voltage(), 12.5);
    }
}
