//! Listener for the device's "input changed" webhook.
//!
//! The device is configured to call `http://<us>:<port>/...?status=<n>`
//! whenever the input flips. Any method and path are accepted.

use std::error::Error;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use log::{debug, info};
use tiny_http::Response;
use url::form_urlencoded;

use crate::SensorReading;

pub struct WebhookListener {
    server: tiny_http::Server,
    subscribers: Mutex<Vec<Sender<SensorReading>>>,
}

impl WebhookListener {
    /// Binds `0.0.0.0:<port>` immediately. Port 0 picks a free port.
    pub fn bind(port: u16) -> Result<WebhookListener, Box<dyn Error + Send + Sync + 'static>> {
        let server = tiny_http::Server::http(("0.0.0.0", port))?;
        info!("Listening for device webhook on port {}", port);
        Ok(WebhookListener {
            server,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        self.server.server_addr().to_ip().map(|addr| addr.port())
    }

    /// Every reading received after this call is delivered to the returned
    /// receiver.
    pub fn subscribe(&self) -> Receiver<SensorReading> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Serve requests until [`WebhookListener::shutdown`] is called.
    pub fn handle_requests(&self) {
        for request in self.server.incoming_requests() {
            debug!("webhook {} {}", request.method(), request.url());
            if let Some(reading) = status_from_url(request.url()) {
                self.emit(reading);
            }
            // The device doesn't care about the answer; ignore I/O errors.
            let _ = request.respond(Response::empty(200));
        }
    }

    pub fn shutdown(&self) {
        self.server.unblock();
    }

    fn emit(&self, reading: SensorReading) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(reading).is_ok());
        }
    }
}

/// The first `status` query parameter, read as an integer: non-zero means
/// the sensor is triggered. A value that isn't a number counts as zero.
fn status_from_url(url: &str) -> Option<SensorReading> {
    let query = url.splitn(2, '?').nth(1)?;
    let (_, value) = form_urlencoded::parse(query.as_bytes()).find(|(key, _)| key == "status")?;
    let triggered = parse_leading_int(&value).map_or(false, |status| status != 0);
    Some(SensorReading::from(triggered))
}

/// Lenient integer parse: surrounding whitespace and an optional sign, then
/// as many decimal digits as are present. `"1abc"` is 1, `"abc"` is `None`.
fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    // Only the zero/non-zero distinction matters, so saturate on overflow.
    let magnitude = rest[..digits].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn should_read_status_from_query() {
        assert_eq!(status_from_url("/?status=1"), Some(SensorReading::Open));
        assert_eq!(status_from_url("/?status=0"), Some(SensorReading::Closed));
        assert_eq!(status_from_url("/hook/x?foo=bar&status=7"), Some(SensorReading::Open));
        assert_eq!(status_from_url("/?status=-2"), Some(SensorReading::Open));
    }

    #[test]
    fn should_use_first_status_parameter() {
        assert_eq!(status_from_url("/?status=0&status=1"), Some(SensorReading::Closed));
    }

    #[test]
    fn should_ignore_requests_without_status() {
        assert_eq!(status_from_url("/"), None);
        assert_eq!(status_from_url("/?"), None);
        assert_eq!(status_from_url("/?state=1"), None);
    }

    #[test]
    fn should_treat_non_numeric_status_as_closed() {
        assert_eq!(status_from_url("/?status="), Some(SensorReading::Closed));
        assert_eq!(status_from_url("/?status=on"), Some(SensorReading::Closed));
        assert_eq!(status_from_url("/?status=-"), Some(SensorReading::Closed));
    }

    #[test]
    fn should_parse_integers_leniently() {
        assert_eq!(parse_leading_int("1abc"), Some(1));
        assert_eq!(parse_leading_int(" 0 "), Some(0));
        assert_eq!(parse_leading_int("+3"), Some(3));
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int("99999999999999999999"), Some(i64::MAX));
    }

    #[test]
    fn should_publish_webhook_to_every_subscriber() {
        let listener = Arc::new(WebhookListener::bind(0).unwrap());
        let port = listener.local_port().unwrap();
        let first = listener.subscribe();
        let second = listener.subscribe();
        let server = {
            let listener = Arc::clone(&listener);
            thread::spawn(move || listener.handle_requests())
        };

        let base = format!("http://127.0.0.1:{}", port);
        let response = ureq::post(&format!("{}/any/path?status=1", base)).call().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.into_string().unwrap(), "");
        // No event, still acknowledged.
        let response = ureq::get(&format!("{}/?other=1", base)).call().unwrap();
        assert_eq!(response.status(), 200);
        let response = ureq::get(&format!("{}/?status=bogus", base)).call().unwrap();
        assert_eq!(response.status(), 200);
        ureq::get(&format!("{}/?status=1", base)).call().unwrap();

        for rx in &[first, second] {
            let timeout = Duration::from_secs(2);
            assert_eq!(rx.recv_timeout(timeout).unwrap(), SensorReading::Open);
            assert_eq!(rx.recv_timeout(timeout).unwrap(), SensorReading::Closed);
            assert_eq!(rx.recv_timeout(timeout).unwrap(), SensorReading::Open);
            assert!(rx.try_recv().is_err());
        }

        listener.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn should_drop_disconnected_subscribers() {
        let listener = WebhookListener::bind(0).unwrap();
        drop(listener.subscribe());
        let kept = listener.subscribe();
        listener.emit(SensorReading::Open);
        assert_eq!(listener.subscribers.lock().unwrap().len(), 1);
        assert_eq!(kept.try_recv().unwrap(), SensorReading::Open);
    }
}
