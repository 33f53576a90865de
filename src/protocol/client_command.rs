use serde::{Deserialize, Serialize};

use crate::coordinator::AxisId;

/// Operator commands, one JSON object per line. `axis` selects the X or Y
/// controller; `id` is echoed back in the response when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "increase")]
    Increase {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "decrease")]
    Decrease {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "set_voltage")]
    SetVoltage {
        axis: AxisId,
        value: f64,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "set_jog_step")]
    SetJogStep {
        axis: AxisId,
        value: f64,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "zero")]
    Zero {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "connect")]
    Connect {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "disconnect")]
    Disconnect {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "enable")]
    Enable {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "disable")]
    Disable {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "toggle_direction")]
    ToggleDirection {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "get_state")]
    GetState {
        axis: AxisId,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "reassign_serials")]
    ReassignSerials {
        serial_x: String,
        serial_y: String,
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(default)]
        id: Option<String>,
    },
}

impl ClientCommand {
    pub fn id(&self) -> Option<&String> {
        match self {
            ClientCommand::Increase { id, .. } => id.as_ref(),
            ClientCommand::Decrease { id, .. } => id.as_ref(),
            ClientCommand::SetVoltage { id, .. } => id.as_ref(),
            ClientCommand::SetJogStep { id, .. } => id.as_ref(),
            ClientCommand::Zero { id, .. } => id.as_ref(),
            ClientCommand::Connect { id, .. } => id.as_ref(),
            ClientCommand::Disconnect { id, .. } => id.as_ref(),
            ClientCommand::Enable { id, .. } => id.as_ref(),
            ClientCommand::Disable { id, .. } => id.as_ref(),
            ClientCommand::ToggleDirection { id, .. } => id.as_ref(),
            ClientCommand::GetState { id, .. } => id.as_ref(),
            ClientCommand::ReassignSerials { id, .. } => id.as_ref(),
            ClientCommand::Ping { id, .. } => id.as_ref(),
        }
    }
}
