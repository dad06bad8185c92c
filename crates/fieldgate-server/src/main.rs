//! Fieldgate gateway binary.
//!
//! # Usage
//!
//! ```bash
//! # Streaming backend, Unix and TCP device transports
//! fieldgate --config /etc/fieldgate/gateway.conf
//!
//! # REST backend plus a device on a serial line
//! fieldgate --config gateway.conf --proto http --tty /dev/ttyUSB0
//! ```

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use fieldgate_server::{
    DEFAULT_CONFIG_PATH, Gateway, GatewaySettings,
    node::{DEFAULT_SOCKET_PATH, DEFAULT_TCP_BIND},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fieldgate IoT gateway
#[derive(Parser, Debug)]
#[command(name = "fieldgate")]
#[command(about = "Bridges local IoT devices to a cloud backend")]
#[command(version)]
struct Args {
    /// Credential and cloud configuration file (INI)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Cloud protocol driver (http, ws)
    #[arg(short, long, default_value = "ws")]
    proto: String,

    /// Serial device for the serial node driver
    #[arg(short, long)]
    tty: Option<PathBuf>,

    /// Unix socket path for local devices
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    unix_socket: PathBuf,

    /// TCP bind address for network devices
    #[arg(long, default_value = DEFAULT_TCP_BIND)]
    tcp_bind: String,

    /// Maximum concurrent sessions
    #[arg(long, default_value = "1024")]
    max_sessions: usize,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "500")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(protocol = %args.proto, "fieldgate starting");

    let settings = GatewaySettings {
        config_path: args.config,
        protocol: args.proto,
        tty: args.tty,
        unix_socket: args.unix_socket,
        tcp_bind: args.tcp_bind,
        max_sessions: args.max_sessions,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        ..Default::default()
    };

    let result = Gateway::start(settings).and_then(|gateway| {
        gateway.register_signals()?;
        gateway.run()
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fieldgate failed");
            ExitCode::FAILURE
        },
    }
}
