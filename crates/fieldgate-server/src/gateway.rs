//! Production gateway runtime.
//!
//! Loads the credential file, registers the compiled-in drivers, starts the
//! [`SessionManager`] over [`PollPoller`] and runs it until SIGINT or SIGTERM.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use fieldgate_core::{DriverRegistry, GatewayConfig, ManagerConfig, SessionManager, manager};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::{
    error::ServerError,
    node::{self, DEFAULT_SOCKET_PATH, DEFAULT_TCP_BIND, SerialNode, TcpNode, UnixNode},
    poller::PollPoller,
    protocol,
    relay::RelayProcessor,
};

/// Default credential file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fieldgate/gateway.conf";

/// Session manager as run by the daemon.
pub type GatewayManager = SessionManager<PollPoller, RelayProcessor>;

/// Runtime settings (CLI level).
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Credential/config file
    pub config_path: PathBuf,
    /// Protocol driver name
    pub protocol: String,
    /// Serial device path; the serial driver is skipped without one
    pub tty: Option<PathBuf>,
    /// Unix node socket path
    pub unix_socket: PathBuf,
    /// TCP node bind address
    pub tcp_bind: String,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Receive/reply buffer size
    pub frame_size: usize,
    /// Upper bound on one poll wait; bounds stop-flag latency
    pub poll_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            protocol: manager::DEFAULT_PROTOCOL.to_string(),
            tty: None,
            unix_socket: PathBuf::from(DEFAULT_SOCKET_PATH),
            tcp_bind: DEFAULT_TCP_BIND.to_string(),
            max_sessions: manager.max_sessions,
            frame_size: manager.frame_size,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Production gateway.
pub struct Gateway {
    manager: GatewayManager,
    stop: Arc<AtomicBool>,
}

impl Gateway {
    /// Load configuration and start the session manager.
    pub fn start(settings: GatewaySettings) -> Result<Self, ServerError> {
        let config = GatewayConfig::load(&settings.config_path)?;
        tracing::info!(
            config = %settings.config_path.display(),
            cloud = %config.cloud.host,
            "configuration loaded"
        );

        let registry = protocol::register(DriverRegistry::new(), &config.cloud);
        let registry = node::register(
            registry,
            UnixNode::new(&settings.unix_socket),
            SerialNode::new(settings.tty.clone()),
            TcpNode::new(settings.tcp_bind.clone()),
        );
        tracing::debug!(?registry, "drivers registered");

        let manager_config = ManagerConfig {
            protocol: settings.protocol,
            transports: config.transports,
            max_sessions: settings.max_sessions,
            frame_size: settings.frame_size,
            poll_interval: Some(settings.poll_interval),
        };

        let manager = SessionManager::start(
            manager_config,
            config.credential,
            registry,
            RelayProcessor::new(),
            PollPoller::new(),
        )?;

        Ok(Self { manager, stop: Arc::new(AtomicBool::new(false)) })
    }

    /// Set the stop flag on SIGINT and SIGTERM.
    pub fn register_signals(&self) -> Result<(), ServerError> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.stop))?;
        }
        Ok(())
    }

    /// Flag that stops [`Gateway::run`] after the current pass.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Run the event loop until stopped, then shut down.
    pub fn run(mut self) -> Result<(), ServerError> {
        let result = self.manager.run(&self.stop);
        if result.is_err() {
            self.manager.shutdown();
        }

        let stats = self.manager.stats();
        tracing::info!(
            opened = stats.sessions_opened,
            closed = stats.sessions_closed,
            rejected = stats.sessions_rejected,
            relayed = stats.frames_relayed,
            "gateway exiting"
        );

        result.map_err(ServerError::from)
    }

    /// The session manager.
    pub fn manager(&self) -> &GatewayManager {
        &self.manager
    }

    /// The session manager, for stepping the loop by hand.
    pub fn manager_mut(&mut self) -> &mut GatewayManager {
        &mut self.manager
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("manager", &self.manager)
            .field("stopping", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}
