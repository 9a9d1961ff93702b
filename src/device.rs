//! Outbound calls to the relay/input device (a Shelly-style RPC endpoint
//! with a single switch and a single input, both `id=0`).

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::DeviceError;
use crate::SensorReading;

/// How long the relay is held closed. The door opener reacts to a pulse.
pub const RELAY_PULSE: Duration = Duration::from_secs(1);

/// What the door controller needs from the hardware.
pub trait Device: Send + Sync {
    fn read_sensor(&self) -> Result<SensorReading, DeviceError>;

    /// Pulse the relay: on, wait [`RELAY_PULSE`], off. If either call fails
    /// the relay may be left on.
    fn toggle_relay(&self) -> Result<(), DeviceError>;
}

pub struct DeviceClient {
    agent: ureq::Agent,
    base_url: String,
    pulse: Duration,
}

impl DeviceClient {
    pub fn new(ip: Ipv4Addr, timeout: Duration) -> DeviceClient {
        DeviceClient {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: format!("http://{}", ip),
            pulse: RELAY_PULSE,
        }
    }

    fn get(&self, path: &str) -> Result<ureq::Response, DeviceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        self.agent.get(&url).call().map_err(DeviceError::from)
    }

    fn set_switch(&self, on: bool) -> Result<(), DeviceError> {
        self.get(&format!("/rpc/Switch.Set?id=0&on={}", on)).map(|_| ())
    }
}

impl Device for DeviceClient {
    fn read_sensor(&self) -> Result<SensorReading, DeviceError> {
        let body = self
            .get("/rpc/Input.GetStatus?id=0")?
            .into_string()
            .map_err(|err| DeviceError::Protocol(format!("unreadable body: {}", err)))?;
        parse_input_status(&body)
    }

    fn toggle_relay(&self) -> Result<(), DeviceError> {
        self.set_switch(true)?;
        thread::sleep(self.pulse);
        self.set_switch(false)
    }
}

/// Extract the `state` field of an `Input.GetStatus` reply, e.g.
/// `{"id":0,"state":true}`.
fn parse_input_status(body: &str) -> Result<SensorReading, DeviceError> {
    let status = json::parse(body)
        .map_err(|err| DeviceError::Protocol(format!("invalid JSON: {}", err)))?;
    status["state"]
        .as_bool()
        .map(SensorReading::from)
        .ok_or_else(|| DeviceError::Protocol(String::from("missing boolean state field")))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread::JoinHandle;

    use tiny_http::{Response, Server};

    use super::*;

    /// Serve `replies` in order on a loopback port, sending each request URL
    /// back through the channel.
    fn fake_device(
        replies: Vec<(u16, &'static str)>,
    ) -> (DeviceClient, mpsc::Receiver<String>, JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            for (status, body) in replies {
                let request = server.recv().unwrap();
                tx.send(request.url().to_string()).unwrap();
                let _ = request.respond(Response::from_string(body).with_status_code(status));
            }
        });
        let client = DeviceClient {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(5))
                .build(),
            base_url: format!("http://127.0.0.1:{}", port),
            pulse: Duration::from_millis(10),
        };
        (client, rx, handle)
    }

    #[test]
    fn should_parse_input_status() {
        assert_eq!(
            parse_input_status(r#"{"id":0,"state":true}"#).unwrap(),
            SensorReading::Open
        );
        assert_eq!(
            parse_input_status(r#"{"id":0,"state":false}"#).unwrap(),
            SensorReading::Closed
        );
    }

    #[test]
    fn should_reject_malformed_input_status() {
        for body in &["", "not json", r#"{"id":0}"#, r#"{"state":"on"}"#, "[true]"] {
            assert!(matches!(
                parse_input_status(body),
                Err(DeviceError::Protocol(_))
            ));
        }
    }

    #[test]
    fn should_read_sensor_over_http() {
        let (client, urls, handle) = fake_device(vec![(200, r#"{"id":0,"state":true}"#)]);
        assert_eq!(client.read_sensor().unwrap(), SensorReading::Open);
        assert_eq!(urls.recv().unwrap(), "/rpc/Input.GetStatus?id=0");
        handle.join().unwrap();
    }

    #[test]
    fn should_treat_error_status_as_protocol_error() {
        let (client, _urls, handle) = fake_device(vec![(500, "oops")]);
        assert!(matches!(client.read_sensor(), Err(DeviceError::Protocol(_))));
        handle.join().unwrap();
    }

    #[test]
    fn should_pulse_relay_on_then_off() {
        let (client, urls, handle) = fake_device(vec![(200, "{}"), (200, "{}")]);
        client.toggle_relay().unwrap();
        assert_eq!(urls.recv().unwrap(), "/rpc/Switch.Set?id=0&on=true");
        assert_eq!(urls.recv().unwrap(), "/rpc/Switch.Set?id=0&on=false");
        handle.join().unwrap();
    }

    #[test]
    fn should_report_unreachable_device() {
        // Bind then drop a listener so the port is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = DeviceClient {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(2))
                .build(),
            base_url: format!("http://127.0.0.1:{}", port),
            pulse: Duration::from_millis(10),
        };
        let err = client.toggle_relay().unwrap_err();
        assert!(matches!(err, DeviceError::Unreachable(_)));
    }
}
