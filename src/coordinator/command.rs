use tokio::sync::oneshot;

use crate::axis::snapshot::AxisSnapshot;
use crate::driver::JogDirection;
use crate::error::ControlError;

pub type Responder<T> = oneshot::Sender<Result<T, ControlError>>;

/// One request to an axis command loop. Every command carries a oneshot
/// responder so the caller observes acceptance or a typed rejection.
#[derive(Debug)]
pub enum AxisCommand {
    SetVoltage {
        value: f64,
        resp: Responder<()>,
    },
    SetJogStep {
        value: f64,
        resp: Responder<()>,
    },
    Jog {
        direction: JogDirection,
        resp: Responder<()>,
    },
    Zero {
        resp: Responder<()>,
    },
    Reconnect {
        resp: Responder<()>,
    },
    Disconnect {
        resp: Responder<()>,
    },
    Enable {
        resp: Responder<()>,
    },
    Disable {
        resp: Responder<()>,
    },
    Refresh {
        resp: Responder<AxisSnapshot>,
    },
    Snapshot {
        resp: Responder<AxisSnapshot>,
    },
    Stop {
        resp: Responder<()>,
    },
}
