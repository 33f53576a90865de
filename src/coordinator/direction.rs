use serde::{Deserialize, Serialize};

use crate::driver::JogDirection;

/// The operator's two labelled jog controls for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JogControl {
    Increase,
    Decrease,
}

/// Map a labelled control to the physical jog direction. With the flag
/// unflipped the labels match the physical sense; flipping the flag inverts
/// the mapping. Purely a remap of control semantics, nothing is rewired.
pub fn resolve_direction(unflipped: bool, control: JogControl) -> JogDirection {
    match (unflipped, control) {
        (true, JogControl::Increase) | (false, JogControl::Decrease) => JogDirection::Increase,
        (true, JogControl::Decrease) | (false, JogControl::Increase) => JogDirection::Decrease,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unflipped_mapping_is_identity() {
        assert_eq!(
            resolve_direction(true, JogControl::Increase),
            JogDirection::Increase
        );
        assert_eq!(
            resolve_direction(true, JogControl::Decrease),
            JogDirection::Decrease
        );
    }

    #[test]
    fn test_flipped_mapping_inverts() {
        assert_eq!(
            resolve_direction(false, JogControl::Increase),
            JogDirection::Decrease
        );
        assert_eq!(
            resolve_direction(false, JogControl::Decrease),
            JogDirection::Increase
        );
    }

    #[test]
    fn test_toggling_twice_restores_mapping() {
        let mut unflipped = true;
        let before = resolve_direction(unflipped, JogControl::Increase);
        unflipped = !unflipped;
        unflipped = !unflipped;
        assert_eq!(resolve_direction(unflipped, JogControl::Increase), before);
    }
}
