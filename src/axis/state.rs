#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Disconnected,
    Connecting,
    ConnectedDisabled,
    ConnectedEnabled,
    Stopped,
}

impl AxisState {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            AxisState::ConnectedDisabled | AxisState::ConnectedEnabled
        )
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, AxisState::ConnectedEnabled)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, AxisState::Stopped)
    }
}
