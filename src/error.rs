#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    VoltageOutOfRange { requested: f64, max: f64 },
    JogStepOutOfRange { requested: f64 },
    ObservedVoltageOutOfRange { observed: f64, max: f64 },
    Settling,
    NotConnected,
    Stopped,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::VoltageOutOfRange { requested, max } => {
                write!(f, "Requested voltage {} outside 0..={}", requested, max)
            }
            RejectReason::JogStepOutOfRange { requested } => {
                write!(f, "Requested jog step {} outside 0..=10", requested)
            }
            RejectReason::ObservedVoltageOutOfRange { observed, max } => {
                write!(f, "Observed voltage {} outside 0..={}", observed, max)
            }
            RejectReason::Settling => write!(f, "Axis is settling after a previous command"),
            RejectReason::NotConnected => write!(f, "Axis is not connected"),
            RejectReason::Stopped => write!(f, "Axis has been stopped"),
        }
    }
}

#[derive(Debug)]
pub enum ControlError {
    DeviceCount { count: usize },
    MismatchSerial { attempted: String, actual: Vec<String> },
    Rejected(RejectReason),
    Timeout { waited_ms: u64 },
    Driver(anyhow::Error),
}

impl ControlError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ControlError::Rejected(_))
    }

    /// Stable machine-readable code for the operator-facing protocol.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::DeviceCount { .. } => "device_count",
            ControlError::MismatchSerial { .. } => "mismatch_serial",
            ControlError::Rejected(_) => "rejected",
            ControlError::Timeout { .. } => "timeout",
            ControlError::Driver(_) => "driver",
        }
    }
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::DeviceCount { count } => {
                write!(f, "The number of connected devices is {}", count)
            }
            ControlError::MismatchSerial { attempted, actual } => {
                write!(
                    f,
                    "The serial numbers do not match: requested {}, connected {:?}",
                    attempted, actual
                )
            }
            ControlError::Rejected(reason) => write!(f, "Command rejected: {}", reason),
            ControlError::Timeout { waited_ms } => {
                write!(f, "Settings were not initialized within {} ms", waited_ms)
            }
            ControlError::Driver(err) => write!(f, "Driver error: {}", err),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Driver(err)
    }
}
