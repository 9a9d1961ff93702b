//! Error types shared by the configuration loader, the device client and
//! the door controller.

use std::io;

/// Problems found while loading [`crate::DeviceConfig`]. All of them are
/// fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The device address is not a dotted-quad IPv4 address.
    #[error("invalid IP configuration: {0:?}")]
    InvalidAddress(String),

    #[error("unable to read config file")]
    Read(#[source] io::Error),

    #[error("unable to parse config file")]
    Parse(#[source] toml::de::Error),
}

/// Failures talking to the relay/sensor device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The request never produced a response (connection refused, DNS,
    /// timeout, ...).
    #[error("device unreachable: {0}")]
    Unreachable(#[source] Box<ureq::Error>),

    /// The device answered with something we don't understand.
    #[error("unexpected response from device: {0}")]
    Protocol(String),
}

impl From<ureq::Error> for DeviceError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => DeviceError::Protocol(format!("HTTP status {}", code)),
            transport @ ureq::Error::Transport(_) => DeviceError::Unreachable(Box::new(transport)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_invalid_address() {
        let err = ConfigError::InvalidAddress("garage.local".to_string());
        assert_eq!(err.to_string(), "invalid IP configuration: \"garage.local\"");
    }

    #[test]
    fn should_display_protocol_error() {
        let err = DeviceError::Protocol("missing state".to_string());
        assert_eq!(err.to_string(), "unexpected response from device: missing state");
    }
}
