//! Daemon configuration, read from a TOML file.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The file as written by the user, before validation.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub ip: String,
    pub webhook_port: u16,
    /// Seconds to wait after pulsing the relay before checking the door opened.
    pub wait_open: u64,
    /// Seconds to wait after pulsing the relay before checking the door closed.
    pub wait_closed: u64,
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default = "default_status_addr")]
    pub status_addr: SocketAddr,
}

fn default_name() -> String {
    String::from("Garage Door")
}

fn default_status_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8888))
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub name: String,
    pub ip: Ipv4Addr,
    pub webhook_port: u16,
    pub wait_open: Duration,
    pub wait_closed: Duration,
    /// Applied to every outbound request to the device.
    pub request_timeout: Duration,
    pub status_addr: SocketAddr,
}

impl DeviceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DeviceConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Read)?;
        DeviceConfig::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<DeviceConfig, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(ConfigError::Parse)?;
        DeviceConfig::try_from(raw)
    }
}

impl TryFrom<RawConfig> for DeviceConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let ip = raw
            .ip
            .parse::<Ipv4Addr>()
            .map_err(|_| ConfigError::InvalidAddress(raw.ip.clone()))?;
        Ok(DeviceConfig {
            name: raw.name,
            ip,
            webhook_port: raw.webhook_port,
            wait_open: Duration::from_secs(raw.wait_open),
            wait_closed: Duration::from_secs(raw.wait_closed),
            request_timeout: raw
                .request_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            status_addr: raw.status_addr,
        })
    }
}
