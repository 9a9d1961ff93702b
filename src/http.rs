use std::error::Error;
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use json::object;
use log::debug;
use tiny_http::{Header, Method, Request, Response};

use crate::accessory::StatusBoard;
use crate::controller::{CommandOutcome, DoorController};
use crate::device::Device;
use crate::error::DeviceError;
use crate::{DoorState, TargetState};

const HTML: &str = include_str!("home.html");

type Controller<D> = Arc<DoorController<D, StatusBoard>>;

/// Status page, JSON status and open/close endpoints.
pub struct Server(tiny_http::Server);

impl Server {
    pub fn new<A>(addr: A) -> Result<Server, Box<dyn Error + Send + Sync + 'static>>
    where
        A: ToSocketAddrs,
    {
        tiny_http::Server::http(addr).map(Server)
    }

    pub fn local_port(&self) -> Option<u16> {
        self.0.server_addr().to_ip().map(|addr| addr.port())
    }

    pub fn handle_requests<D: Device + 'static>(&self, controller: Controller<D>) {
        for request in self.0.incoming_requests() {
            debug!("status server {} {}", request.method(), request.url());
            let target = match (request.method(), request.url()) {
                (Method::Post, "/open") => Some(TargetState::Open),
                (Method::Post, "/close") => Some(TargetState::Closed),
                _ => None,
            };
            match target {
                // Commands wait for the door to move, keep serving meanwhile.
                Some(target) => {
                    let controller = Arc::clone(&controller);
                    thread::spawn(move || run_command(request, &controller, target));
                }
                None => {
                    let response = status_response(&request, &controller);
                    // Ignoring I/O errors that occur here so that we don't take down the process if there
                    // is an issue sending the response.
                    let _ = request.respond(response);
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

fn status_response<D: Device>(
    request: &Request,
    controller: &Controller<D>,
) -> Response<Cursor<Vec<u8>>> {
    let board = controller.sink();
    let current = board.status();
    match (request.method(), request.url()) {
        (Method::Get, "/") => {
            let since = Instant::now().duration_since(current.since);
            let entered = timeago::Formatter::new().convert(since);
            let status = match current.current {
                DoorState::Open => format!("🔴 Open since {}", entered),
                DoorState::Closed => format!("🟢 Closed since {}", entered),
                moving => format!("🟠 {} ({})", moving, entered),
            };
            let html = HTML
                .replace("$name$", &escape_html(board.name()))
                .replace("$doorstate$", &status);
            with_content_type(Response::from_string(html), "text/html; charset=utf-8")
        }
        (Method::Get, "/door.json") => {
            let obj = object! {
                name: board.name(),
                state: current.current.to_string(),
                target: current.target.to_string(),
                secs_in_state: Instant::now().duration_since(current.since).as_secs()
            };
            json_response(200, &obj)
        }
        _ => Response::from_string("Not found").with_status_code(404),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn run_command<D: Device>(request: Request, controller: &Controller<D>, target: TargetState) {
    let response = match controller.set_target(target) {
        Ok(outcome) => json_response(200, &command_body(outcome, controller.state())),
        Err(err) => json_response(502, &failure_body(&err)),
    };
    let _ = request.respond(response);
}

fn command_body(outcome: CommandOutcome, current: DoorState) -> json::JsonValue {
    match outcome {
        CommandOutcome::Ignored => object! {
            result: "ignored",
            state: current.to_string()
        },
        CommandOutcome::Completed(settled) => object! {
            result: "completed",
            state: settled.to_string()
        },
    }
}

fn failure_body(err: &DeviceError) -> json::JsonValue {
    object! {
        result: "communication failure",
        error: err.to_string()
    }
}

fn json_response(status: u16, body: &json::JsonValue) -> Response<Cursor<Vec<u8>>> {
    let response =
        Response::from_string(json::stringify_pretty(body.clone(), 2)).with_status_code(status);
    with_content_type(response, "application/json; charset=utf-8")
}

fn with_content_type(
    response: Response<Cursor<Vec<u8>>>,
    value: &str,
) -> Response<Cursor<Vec<u8>>> {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
