use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{io, process, thread};

use clap::Parser;
use log::{info, LevelFilter};
use syslog::Facility;

use garage_door_controller::accessory::StatusBoard;
use garage_door_controller::device::DeviceClient;
use garage_door_controller::webhook::WebhookListener;
use garage_door_controller::{http, DeviceConfig, DoorController};

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Drive a garage door opener through a relay/input device, keeping track of
/// the door position from polls and webhook notifications.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "/etc/garage-door-controller.toml")]
    config: PathBuf,

    /// Minimum level sent to syslog (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();
    let level = match args.log_level.parse::<LevelFilter>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("invalid log level: {}", args.log_level);
            process::exit(1);
        }
    };
    if let Err(err) = syslog::init(Facility::LOG_DAEMON, level, Some(env!("CARGO_PKG_NAME"))) {
        eprintln!("unable to connect to syslog, logging disabled: {}", err);
    }

    let config = match DeviceConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {}", args.config.display(), report(&err));
            process::exit(1);
        }
    };

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))?;

    let listener = match WebhookListener::bind(config.webhook_port) {
        Ok(listener) => Arc::new(listener),
        Err(err) => {
            eprintln!(
                "Unable to listen for webhooks on port {}: {}",
                config.webhook_port, err
            );
            process::exit(1);
        }
    };
    let events = listener.subscribe();

    let controller = Arc::new(DoorController::new(
        DeviceClient::new(config.ip, config.request_timeout),
        StatusBoard::new(&config.name),
        config.wait_open,
        config.wait_closed,
    ));
    info!("{} controlling device at {}", config.name, config.ip);

    let server = match http::Server::new(config.status_addr) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            eprintln!(
                "Unable to start http server on {}: {}",
                config.status_addr, err
            );
            process::exit(1);
        }
    };
    eprintln!("http server running on {}", config.status_addr);

    let mut threads = Vec::new();

    // Webhook server
    {
        let listener = Arc::clone(&listener);
        threads.push(thread::spawn(move || {
            listener.handle_requests();
            eprintln!("webhook thread exiting");
        }));
    }

    // Webhook readings
    {
        let term = Arc::clone(&term);
        let controller = Arc::clone(&controller);
        threads.push(thread::spawn(move || {
            controller.run_event_loop(events, &term);
            eprintln!("event thread exiting");
        }));
    }

    // Sensor polling
    {
        let term = Arc::clone(&term);
        let controller = Arc::clone(&controller);
        threads.push(thread::spawn(move || {
            controller.run_poll_loop(&term);
            eprintln!("poll thread exiting");
        }));
    }

    // Status page and commands
    {
        let server = Arc::clone(&server);
        let controller = Arc::clone(&controller);
        threads.push(thread::spawn(move || {
            server.handle_requests(controller);
            eprintln!("server thread exiting");
        }));
    }

    // Wait for signals to exit
    while !term.load(Ordering::Relaxed) {
        thread::sleep(ONE_SECOND);
    }
    info!("shutting down");
    listener.shutdown();
    server.shutdown();

    for thread in threads {
        let _ = thread.join();
    }

    Ok(())
}

/// An error followed by its chain of causes.
fn report(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
