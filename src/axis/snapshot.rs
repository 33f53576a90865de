use super::interlock::JogInterlock;
use super::state::AxisState;

/// Point-in-time view of one axis, as last observed. Voltage comes from the
/// device's own poller, so it may lag a command that is still settling.
#[derive(Debug, Clone)]
pub struct AxisSnapshot {
    pub serial: String,
    pub state: AxisState,
    pub voltage: f64,
    pub jog_step: f64,
    pub max_voltage: f64,
}

impl AxisSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Interlock in the physical jog sense, before direction remapping.
    pub fn interlock(&self) -> JogInterlock {
        JogInterlock::compute(self.voltage, self.jog_step, self.max_voltage)
    }
}
