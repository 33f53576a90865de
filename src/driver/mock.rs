use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use super::{JogDirection, PiezoDevice, PiezoDriver};

#[derive(Debug)]
struct DeviceInner {
    connected: bool,
    polling_interval_ms: Option<u64>,
    enabled: bool,
    settings_initialized: bool,
    /// Last commanded target voltage. Survives a disable/enable cycle, which
    /// is exactly what the real firmware does: a jog issued right after
    /// re-enable moves relative to this value, not from the near-zero output.
    target_voltage: f64,
    output_voltage: f64,
    jog_step: f64,
    max_voltage: f64,
}

/// Shared state of one simulated controller device. The driver hands out
/// handles that all point at the same state, like a vendor stack would.
#[derive(Debug)]
pub struct MockDeviceState {
    serial: String,
    inner: RwLock<DeviceInner>,
    /// How long after a `wait_for_settings_initialized` call the settings
    /// become ready. `None` simulates a device that never initializes.
    settings_init_delay: RwLock<Option<Duration>>,
}

impl MockDeviceState {
    pub fn new(serial: &str, max_voltage: f64) -> Self {
        Self {
            serial: serial.to_string(),
            inner: RwLock::new(DeviceInner {
                connected: false,
                polling_interval_ms: None,
                enabled: false,
                settings_initialized: false,
                target_voltage: 0.0,
                output_voltage: 0.0,
                jog_step: 1.0,
                max_voltage,
            }),
            settings_init_delay: RwLock::new(Some(Duration::from_millis(0))),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub async fn set_settings_init_delay(&self, delay: Option<Duration>) {
        *self.settings_init_delay.write().await = delay;
    }

    pub async fn output_voltage(&self) -> f64 {
        self.inner.read().await.output_voltage
    }

    pub async fn target_voltage(&self) -> f64 {
        self.inner.read().await.target_voltage
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.read().await.polling_interval_ms.is_some()
    }
}

pub struct MockPiezoDevice {
    state: Arc<MockDeviceState>,
}

#[async_trait::async_trait]
impl PiezoDevice for MockPiezoDevice {
    async fn is_connected(&self) -> bool {
        self.state.inner.read().await.connected
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.connected = true;
        debug!("mock device {} connected", self.state.serial);
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.connected = false;
        inner.polling_interval_ms = None;
        debug!("mock device {} disconnected", self.state.serial);
        Ok(())
    }

    async fn start_polling(&self, interval_ms: u64) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        if !inner.connected {
            return Err(anyhow::anyhow!(
                "Device {} is not connected",
                self.state.serial
            ));
        }
        inner.polling_interval_ms = Some(interval_ms);
        Ok(())
    }

    async fn stop_polling(&self) -> anyhow::Result<()> {
        self.state.inner.write().await.polling_interval_ms = None;
        Ok(())
    }

    async fn enable(&self) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.enabled = true;
        // Output stage comes back up near zero. The remembered target is
        // deliberately left in place, matching the firmware.
        inner.output_voltage = 0.0;
        Ok(())
    }

    async fn disable(&self) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.enabled = false;
        inner.output_voltage = 0.0;
        Ok(())
    }

    async fn is_settings_initialized(&self) -> bool {
        self.state.inner.read().await.settings_initialized
    }

    async fn wait_for_settings_initialized(&self, timeout_ms: u64) -> anyhow::Result<bool> {
        if self.state.inner.read().await.settings_initialized {
            return Ok(true);
        }
        let delay = *self.state.settings_init_delay.read().await;
        let timeout = Duration::from_millis(timeout_ms);
        match delay {
            Some(delay) if delay <= timeout => {
                tokio::time::sleep(delay).await;
                self.state.inner.write().await.settings_initialized = true;
                Ok(true)
            }
            _ => {
                tokio::time::sleep(timeout).await;
                Ok(false)
            }
        }
    }

    async fn get_output_voltage(&self) -> anyhow::Result<f64> {
        Ok(self.state.inner.read().await.output_voltage)
    }

    async fn set_output_voltage(&self, voltage: f64) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.target_voltage = voltage;
        if inner.enabled {
            inner.output_voltage = voltage;
        }
        Ok(())
    }

    async fn get_max_output_voltage(&self) -> anyhow::Result<f64> {
        Ok(self.state.inner.read().await.max_voltage)
    }

    async fn get_jog_step(&self) -> anyhow::Result<f64> {
        Ok(self.state.inner.read().await.jog_step)
    }

    async fn set_jog_step(&self, step: f64) -> anyhow::Result<()> {
        self.state.inner.write().await.jog_step = step;
        Ok(())
    }

    async fn jog(&self, direction: JogDirection) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        let step = inner.jog_step;
        let next = match direction {
            JogDirection::Increase => inner.target_voltage + step,
            JogDirection::Decrease => inner.target_voltage - step,
        };
        // Firmware clamps at the physical floor and ceiling.
        inner.target_voltage = next.clamp(0.0, inner.max_voltage);
        if inner.enabled {
            inner.output_voltage = inner.target_voltage;
        }
        Ok(())
    }

    async fn set_zero(&self) -> anyhow::Result<()> {
        let mut inner = self.state.inner.write().await;
        inner.target_voltage = 0.0;
        if inner.enabled {
            inner.output_voltage = 0.0;
        }
        Ok(())
    }
}

/// In-memory driver stack for tests and the demo daemon.
pub struct MockPiezoDriver {
    devices: BTreeMap<String, Arc<MockDeviceState>>,
}

impl MockPiezoDriver {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
        }
    }

    pub fn add_device(&mut self, serial: &str, max_voltage: f64) -> Arc<MockDeviceState> {
        let state = Arc::new(MockDeviceState::new(serial, max_voltage));
        self.devices.insert(serial.to_string(), state.clone());
        state
    }

    pub fn device(&self, serial: &str) -> Option<Arc<MockDeviceState>> {
        self.devices.get(serial).cloned()
    }
}

impl Default for MockPiezoDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PiezoDriver for MockPiezoDriver {
    async fn enumerate(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.devices.keys().cloned().collect())
    }

    async fn open(&self, serial: &str) -> anyhow::Result<Box<dyn PiezoDevice>> {
        let state = self
            .devices
            .get(serial)
            .ok_or_else(|| anyhow::anyhow!("No device with serial {}", serial))?
            .clone();
        Ok(Box::new(MockPiezoDevice { state }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_lists_all_serials() {
        let mut driver = MockPiezoDriver::new();
        driver.add_device("29251927", 75.0);
        driver.add_device("29251900", 75.0);

        let serials = driver.enumerate().await.unwrap();
        assert_eq!(serials.len(), 2);
        assert!(serials.contains(&"29251927".to_string()));
        assert!(serials.contains(&"29251900".to_string()));
    }

    #[tokio::test]
    async fn test_jog_clamps_at_floor_and_ceiling() {
        let mut driver = MockPiezoDriver::new();
        driver.add_device("29251927", 75.0);
        let device = driver.open("29251927").await.unwrap();
        device.connect().await.unwrap();
        device.enable().await.unwrap();
        device.set_jog_step(50.0).await.unwrap();

        device.jog(JogDirection::Decrease).await.unwrap();
        assert_eq!(device.get_output_voltage().await.unwrap(), 0.0);

        device.jog(JogDirection::Increase).await.unwrap();
        device.jog(JogDirection::Increase).await.unwrap();
        assert_eq!(device.get_output_voltage().await.unwrap(), 75.0);
    }

    #[tokio::test]
    async fn test_reenable_keeps_remembered_target() {
        let mut driver = MockPiezoDriver::new();
        driver.add_device("29251927", 75.0);
        let device = driver.open("29251927").await.unwrap();
        device.connect().await.unwrap();
        device.enable().await.unwrap();

        device.set_output_voltage(0.6).await.unwrap();
        device.set_jog_step(0.1).await.unwrap();

        device.disable().await.unwrap();
        device.enable().await.unwrap();
        // Output is back near zero, but the remembered target is not.
        assert_eq!(device.get_output_voltage().await.unwrap(), 0.0);

        device.jog(JogDirection::Increase).await.unwrap();
        let voltage = device.get_output_voltage().await.unwrap();
        assert!((voltage - 0.7).abs() < 1e-9);
    }
}
