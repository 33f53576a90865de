pub mod mock;

use serde::{Deserialize, Serialize};

/// Direction of a single jog step, in the device's own voltage sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JogDirection {
    Increase,
    Decrease,
}

/// Entry point into a vendor driver stack: enumerates connected controller
/// devices and opens handles to them. Enumeration is always a live query.
#[async_trait::async_trait]
pub trait PiezoDriver: Send + Sync {
    async fn enumerate(&self) -> anyhow::Result<Vec<String>>;
    async fn open(&self, serial: &str) -> anyhow::Result<Box<dyn PiezoDevice>>;
}

/// Capability surface of one opened controller device.
///
/// `start_polling` is the device's own internal refresh loop (reference
/// cadence 250 ms). It runs concurrently with anything this crate does, so
/// every `get_output_voltage` read is a snapshot, not a read-after-write.
#[async_trait::async_trait]
pub trait PiezoDevice: Send + Sync {
    async fn is_connected(&self) -> bool;
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self) -> anyhow::Result<()>;

    async fn start_polling(&self, interval_ms: u64) -> anyhow::Result<()>;
    async fn stop_polling(&self) -> anyhow::Result<()>;

    async fn enable(&self) -> anyhow::Result<()>;
    async fn disable(&self) -> anyhow::Result<()>;

    async fn is_settings_initialized(&self) -> bool;
    /// Returns false if the wait hit the timeout without initialization.
    async fn wait_for_settings_initialized(&self, timeout_ms: u64) -> anyhow::Result<bool>;

    async fn get_output_voltage(&self) -> anyhow::Result<f64>;
    async fn set_output_voltage(&self, voltage: f64) -> anyhow::Result<()>;
    async fn get_max_output_voltage(&self) -> anyhow::Result<f64>;

    async fn get_jog_step(&self) -> anyhow::Result<f64>;
    async fn set_jog_step(&self, step: f64) -> anyhow::Result<()>;
    async fn jog(&self, direction: JogDirection) -> anyhow::Result<()>;

    async fn set_zero(&self) -> anyhow::Result<()>;
}
