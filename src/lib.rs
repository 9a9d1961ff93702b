pub mod accessory;
pub mod config;
pub mod controller;
pub mod device;
mod door_state;
pub mod error;
pub mod http;
pub mod webhook;

pub use config::DeviceConfig;
pub use controller::{CommandOutcome, DoorController};
pub use door_state::{DoorState, SensorReading, TargetState};

