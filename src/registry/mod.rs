use std::sync::Arc;

use tracing::debug;

use crate::driver::{PiezoDevice, PiezoDriver};
use crate::error::ControlError;

/// Both axes must have their controller physically present; fewer devices
/// than this indicates a wiring or power fault, not a software state.
pub const REQUIRED_DEVICE_COUNT: usize = 2;

/// Validates requested serial numbers against the set of controllers the
/// driver stack currently sees. Constructed once and passed into every axis
/// construction; enumeration is never cached.
#[derive(Clone)]
pub struct DeviceRegistry {
    driver: Arc<dyn PiezoDriver>,
}

impl DeviceRegistry {
    pub fn new(driver: Arc<dyn PiezoDriver>) -> Self {
        Self { driver }
    }

    pub async fn enumerate(&self) -> Result<Vec<String>, ControlError> {
        let serials = self.driver.enumerate().await?;
        debug!("Enumerated {} devices: {:?}", serials.len(), serials);
        Ok(serials)
    }

    pub async fn require_minimum_count(&self, required: usize) -> Result<(), ControlError> {
        let count = self.enumerate().await?.len();
        if count < required {
            return Err(ControlError::DeviceCount { count });
        }
        Ok(())
    }

    pub async fn validate(&self, serial: &str) -> Result<(), ControlError> {
        let actual = self.enumerate().await?;
        if !actual.iter().any(|s| s == serial) {
            return Err(ControlError::MismatchSerial {
                attempted: serial.to_string(),
                actual,
            });
        }
        Ok(())
    }

    pub async fn open(&self, serial: &str) -> Result<Box<dyn PiezoDevice>, ControlError> {
        Ok(self.driver.open(serial).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockPiezoDriver;

    fn registry_with(serials: &[&str]) -> DeviceRegistry {
        let mut driver = MockPiezoDriver::new();
        for serial in serials {
            driver.add_device(serial, 75.0);
        }
        DeviceRegistry::new(Arc::new(driver))
    }

    #[tokio::test]
    async fn test_count_error_carries_enumerated_length() {
        let registry = registry_with(&["29251927"]);
        let err = registry
            .require_minimum_count(REQUIRED_DEVICE_COUNT)
            .await
            .unwrap_err();
        match err {
            ControlError::DeviceCount { count } => assert_eq!(count, 1),
            other => panic!("Expected DeviceCount, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_count_ok_with_two_devices() {
        let registry = registry_with(&["29251927", "29251900"]);
        registry
            .require_minimum_count(REQUIRED_DEVICE_COUNT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_reports_full_enumerated_set() {
        let registry = registry_with(&["29251900", "29251927"]);
        let err = registry.validate("00000000").await.unwrap_err();
        match err {
            ControlError::MismatchSerial { attempted, actual } => {
                assert_eq!(attempted, "00000000");
                assert_eq!(
                    actual,
                    vec!["29251900".to_string(), "29251927".to_string()]
                );
            }
            other => panic!("Expected MismatchSerial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_accepts_connected_serial() {
        let registry = registry_with(&["29251927", "29251900"]);
        registry.validate("29251927").await.unwrap();
    }
}
