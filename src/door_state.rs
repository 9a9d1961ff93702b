use std::fmt;

/// Current position of the door as far as the controller can tell.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DoorState {
    Closed,
    Opening,
    Open,
    Closing,
    Stopped,
}

impl DoorState {
    /// Open and Closed are the only states the sensor can confirm, and the
    /// only ones with a matching target.
    pub fn target(self) -> Option<TargetState> {
        match self {
            DoorState::Open => Some(TargetState::Open),
            DoorState::Closed => Some(TargetState::Closed),
            DoorState::Opening | DoorState::Closing | DoorState::Stopped => None,
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorState::Closed => f.write_str("CLOSED"),
            DoorState::Opening => f.write_str("OPENING"),
            DoorState::Open => f.write_str("OPEN"),
            DoorState::Closing => f.write_str("CLOSING"),
            DoorState::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Where the door has been asked to go.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetState {
    Open,
    Closed,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Open => f.write_str("OPEN"),
            TargetState::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Level of the reed switch mounted at the fully open position.
///
/// `Closed` only means the switch is not triggered: the door may be anywhere
/// short of fully open.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorReading {
    Open,
    Closed,
}

impl From<bool> for SensorReading {
    fn from(triggered: bool) -> Self {
        if triggered {
            SensorReading::Open
        } else {
            SensorReading::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_terminal_states_to_targets() {
        assert_eq!(DoorState::Open.target(), Some(TargetState::Open));
        assert_eq!(DoorState::Closed.target(), Some(TargetState::Closed));
        assert_eq!(DoorState::Opening.target(), None);
        assert_eq!(DoorState::Closing.target(), None);
        assert_eq!(DoorState::Stopped.target(), None);
    }

    #[test]
    fn should_display_upper_case_names() {
        assert_eq!(DoorState::Opening.to_string(), "OPENING");
        assert_eq!(DoorState::Stopped.to_string(), "STOPPED");
        assert_eq!(TargetState::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn should_treat_triggered_switch_as_open() {
        assert_eq!(SensorReading::from(true), SensorReading::Open);
        assert_eq!(SensorReading::from(false), SensorReading::Closed);
    }
}
