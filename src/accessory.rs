//! The outward face of the controller: whatever shows the door to the user.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::info;

use crate::{DoorState, TargetState};

/// Receives every published state change.
pub trait AccessorySink: Send + Sync {
    fn current_state(&self, state: DoorState);

    fn target_state(&self, target: TargetState);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub current: DoorState,
    pub target: TargetState,
    /// When `current` last changed.
    pub since: Instant,
}

/// Sink that keeps the latest published state for the status server.
#[derive(Clone)]
pub struct StatusBoard {
    name: String,
    status: Arc<RwLock<Status>>,
}

impl StatusBoard {
    pub fn new(name: &str) -> Self {
        StatusBoard {
            name: name.to_string(),
            status: Arc::new(RwLock::new(Status {
                current: DoorState::Closed,
                target: TargetState::Closed,
                since: Instant::now(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A poisoned lock still holds a valid status, so read through it.
    pub fn status(&self) -> Status {
        match self.status.read() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update<F: FnOnce(&mut Status)>(&self, f: F) {
        match self.status.write() {
            Ok(mut status) => f(&mut status),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl AccessorySink for StatusBoard {
    fn current_state(&self, state: DoorState) {
        info!("{}: current state {}", self.name, state);
        self.update(|status| {
            if status.current != state {
                status.since = Instant::now();
            }
            status.current = state;
        });
    }

    fn target_state(&self, target: TargetState) {
        info!("{}: target state {}", self.name, target);
        self.update(|status| status.target = target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_closed() {
        let board = StatusBoard::new("Garage");
        let status = board.status();
        assert_eq!(status.current, DoorState::Closed);
        assert_eq!(status.target, TargetState::Closed);
    }

    #[test]
    fn should_record_published_states() {
        let board = StatusBoard::new("Garage");
        let before = board.status().since;
        board.current_state(DoorState::Opening);
        board.target_state(TargetState::Open);
        let status = board.status();
        assert_eq!(status.current, DoorState::Opening);
        assert_eq!(status.target, TargetState::Open);
        assert!(status.since >= before);
    }

    #[test]
    fn should_keep_since_when_state_repeats() {
        let board = StatusBoard::new("Garage");
        board.current_state(DoorState::Open);
        let since = board.status().since;
        board.current_state(DoorState::Open);
        assert_eq!(board.status().since, since);
    }
}
