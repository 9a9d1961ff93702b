//! The door state machine.
//!
//! The only sensor is a reed switch at the fully open position, so sensor
//! readings can confirm arrival at `Open` or reaching/staying `Closed`, but
//! say nothing about a door in motion. The intermediate states are entered
//! and left only by the open/close commands.
//!
//! Serialisation: commands take `command` for their whole sequence, so only
//! one relay pulse is ever in flight. A command is checked against the state
//! when it is issued and again once it holds `command`; failing either check
//! makes it a no-op, so a command never queues behind a running one. Sensor
//! readings (poll loop and webhook) only take the short-lived `state` lock
//! and are applied immediately, even while a command is waiting for the door
//! to move. A command resolves to its confirmed state regardless of what
//! readings arrived in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::accessory::AccessorySink;
use crate::device::Device;
use crate::error::DeviceError;
use crate::{DoorState, SensorReading, TargetState};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
const ONE_SECOND: Duration = Duration::from_secs(1);

/// Result of a command that didn't fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The door wasn't in a state the command applies to; nothing was done.
    Ignored,
    /// The relay was pulsed and the door settled in this state.
    Completed(DoorState),
}

pub struct DoorController<D, S> {
    device: D,
    sink: S,
    state: Mutex<DoorState>,
    command: Mutex<()>,
    wait_open: Duration,
    wait_closed: Duration,
}

/// The state a sensor reading moves the door to, if any.
pub fn reconcile(current: DoorState, reading: SensorReading) -> Option<DoorState> {
    match (reading, current) {
        (SensorReading::Open, DoorState::Closed) => Some(DoorState::Open),
        (SensorReading::Open, _) => None,
        // Mid-opening the switch hasn't been reached yet.
        (SensorReading::Closed, DoorState::Closed | DoorState::Opening) => None,
        (SensorReading::Closed, _) => Some(DoorState::Closed),
    }
}

impl<D: Device, S: AccessorySink> DoorController<D, S> {
    /// The real door position is unknown at startup; assume closed and let
    /// the first poll correct it.
    pub fn new(device: D, sink: S, wait_open: Duration, wait_closed: Duration) -> Self {
        DoorController {
            device,
            sink,
            state: Mutex::new(DoorState::Closed),
            command: Mutex::new(()),
            wait_open,
            wait_closed,
        }
    }

    pub fn state(&self) -> DoorState {
        *self.lock_state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns true if the reading changed the door state.
    pub fn apply_sensor_reading(&self, reading: SensorReading) -> bool {
        let mut state = self.lock_state();
        match reconcile(*state, reading) {
            Some(next) => {
                self.set_state(&mut state, next);
                true
            }
            None => false,
        }
    }

    /// Entry point for the accessory: move the door towards `target`. An
    /// accepted command publishes `target` before the door starts moving.
    pub fn set_target(&self, target: TargetState) -> Result<CommandOutcome, DeviceError> {
        info!("set target {}", target);
        match target {
            TargetState::Open => self.open(),
            TargetState::Closed => self.close(),
        }
    }

    pub fn open(&self) -> Result<CommandOutcome, DeviceError> {
        if !self.issued_from(DoorState::Closed, "open") {
            return Ok(CommandOutcome::Ignored);
        }
        let _command = self.lock_command();
        {
            let mut state = self.lock_state();
            // Another command may have finished while we waited for ours.
            if *state != DoorState::Closed {
                debug!("open ignored, door is {}", *state);
                return Ok(CommandOutcome::Ignored);
            }
            self.sink.target_state(TargetState::Open);
            self.set_state(&mut state, DoorState::Opening);
        }

        if let Err(err) = self.device.toggle_relay() {
            error!("open: relay toggle failed: {}", err);
            self.resolve(DoorState::Closed);
            return Err(err);
        }

        thread::sleep(self.wait_open);
        let confirmed = self.device.read_sensor();
        let settled = match confirmed {
            Ok(SensorReading::Open) => DoorState::Open,
            Ok(SensorReading::Closed) => DoorState::Closed,
            Err(ref err) => {
                error!("open: unable to confirm door position: {}", err);
                DoorState::Closed
            }
        };
        self.resolve(settled);
        confirmed.map(|_| CommandOutcome::Completed(settled))
    }

    pub fn close(&self) -> Result<CommandOutcome, DeviceError> {
        if !self.issued_from(DoorState::Open, "close") {
            return Ok(CommandOutcome::Ignored);
        }
        let _command = self.lock_command();
        {
            let state = self.lock_state();
            if *state != DoorState::Open {
                debug!("close ignored, door is {}", *state);
                return Ok(CommandOutcome::Ignored);
            }
            self.sink.target_state(TargetState::Closed);
        }

        if let Err(err) = self.device.toggle_relay() {
            error!("close: relay toggle failed: {}", err);
            // Nothing has moved yet, so the door is still open.
            self.resolve(DoorState::Open);
            return Err(err);
        }
        self.resolve(DoorState::Closing);

        thread::sleep(self.wait_closed);
        let confirmed = self.device.read_sensor();
        let settled = match confirmed {
            Ok(SensorReading::Closed) => DoorState::Closed,
            Ok(SensorReading::Open) => DoorState::Open,
            Err(ref err) => {
                error!("close: unable to confirm door position: {}", err);
                DoorState::Open
            }
        };
        self.resolve(settled);
        confirmed.map(|_| CommandOutcome::Completed(settled))
    }

    /// Read the sensor once and apply it. Failures are logged and dropped;
    /// the next poll tries again.
    pub fn poll_once(&self) {
        match self.device.read_sensor() {
            Ok(reading) => {
                debug!("poll: sensor {:?}", reading);
                self.apply_sensor_reading(reading);
            }
            Err(err) => warn!("poll: {}", err),
        }
    }

    pub fn run_poll_loop(&self, term: &AtomicBool) {
        while !term.load(Ordering::Relaxed) {
            self.poll_once();
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Apply webhook readings until the sender goes away or `term` is set.
    pub fn run_event_loop(&self, events: Receiver<SensorReading>, term: &AtomicBool) {
        while !term.load(Ordering::Relaxed) {
            match events.recv_timeout(ONE_SECOND) {
                Ok(reading) => {
                    debug!("webhook: sensor {:?}", reading);
                    self.apply_sensor_reading(reading);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn issued_from(&self, required: DoorState, command: &str) -> bool {
        let state = self.state();
        if state != required {
            debug!("{} ignored, door is {}", command, state);
        }
        state == required
    }

    /// The only place the state changes. Publishes while `current` is still
    /// locked so observers see changes in the order they happened.
    fn set_state(&self, current: &mut MutexGuard<'_, DoorState>, next: DoorState) {
        info!("Setting door state to {}", next);
        **current = next;
        self.sink.current_state(next);
        if let Some(target) = next.target() {
            self.sink.target_state(target);
        }
    }

    fn resolve(&self, next: DoorState) {
        let mut state = self.lock_state();
        self.set_state(&mut state, next);
    }

    // A panic mid-publish leaves a valid DoorState behind, so poisoning is
    // not a reason to stop.
    fn lock_state(&self) -> MutexGuard<'_, DoorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_command(&self) -> MutexGuard<'_, ()> {
        self.command
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
