use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::coordinator::{AxisId, DualAxisCoordinator};

/// Reference cadence of the operator-facing refresh.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed-interval driver: each tick refreshes every connected axis's
/// observed voltage and recomputes its interlock. The two axes are polled
/// independently; a fault on one is logged and never affects the other.
pub struct PollLoop {
    coordinator: Arc<DualAxisCoordinator>,
    interval: Duration,
}

impl PollLoop {
    pub fn new(coordinator: Arc<DualAxisCoordinator>) -> Self {
        Self {
            coordinator,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                for axis in AxisId::BOTH {
                    if let Err(e) = self.coordinator.poll_axis(axis).await {
                        debug!("Poll tick skipped for axis {}: {}", axis, e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::config::CoordinatorConfig;
    use crate::driver::mock::MockPiezoDriver;
    use crate::driver::PiezoDriver;
    use crate::registry::DeviceRegistry;

    #[tokio::test(start_paused = true)]
    async fn test_tick_refreshes_read_model() {
        let mut driver = MockPiezoDriver::new();
        driver.add_device("29251927", 75.0);
        driver.add_device("29251900", 75.0);
        let driver = Arc::new(driver);

        let registry = DeviceRegistry::new(driver.clone());
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(
            DualAxisCoordinator::new(
                registry,
                CoordinatorConfig::default(),
                "29251927",
                "29251900",
                dir.path().join("saved_serial_numbers.json"),
            )
            .await
            .unwrap(),
        );
        tokio::time::advance(Duration::from_millis(251)).await;

        // Move the device output underneath the axis, as its own internal
        // poller would observe.
        let side_channel = driver.open("29251927").await.unwrap();
        side_channel.set_output_voltage(33.0).await.unwrap();

        let handle = PollLoop::new(coordinator.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let model = coordinator.read_model(AxisId::X).await.unwrap();
        assert_eq!(model.voltage, 33.0);

        handle.abort();
    }
}
