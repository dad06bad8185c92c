//! Streaming protocol driver.
//!
//! Keeps one long-lived backend connection per session. Reads are not
//! bounded, and a session's connection is flushed before release.

use std::io::Write;

use fieldgate_core::{Channel, CloudConfig, DriverError, ProtocolDriver};

use super::TcpBackend;

/// Default streaming port.
pub const DEFAULT_WS_PORT: u16 = 80;

/// Persistent streaming backend.
#[derive(Debug, Clone)]
pub struct WsProtocol {
    backend: TcpBackend,
}

impl WsProtocol {
    /// Driver name.
    pub const NAME: &'static str = "ws";

    /// Driver for the cloud host in `cloud`.
    pub fn new(cloud: &CloudConfig) -> Self {
        Self { backend: TcpBackend::new(Self::NAME, cloud, DEFAULT_WS_PORT) }
    }

    /// Backend host and port.
    pub fn endpoint(&self) -> (&str, u16) {
        self.backend.endpoint()
    }
}

impl ProtocolDriver for WsProtocol {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        self.backend.resolve().map(|_| ())
    }

    fn connect(&mut self) -> Result<Channel, DriverError> {
        self.backend.connect(Self::NAME)
    }

    fn close(&mut self, channel: &mut Channel) {
        if channel.is_shut_down() {
            return;
        }
        if let Err(e) = channel.flush() {
            tracing::debug!(protocol = Self::NAME, error = %e, "flush on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_from_config() {
        let cloud = CloudConfig { host: "cloud.example".to_string(), port: Some(8080) };
        let ws = WsProtocol::new(&cloud);
        assert_eq!(ws.endpoint(), ("cloud.example", 8080));
    }

    #[test]
    fn close_after_shutdown_is_quiet() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut channel = Channel::new("pair", a);
        channel.shutdown();

        let mut ws = WsProtocol::new(&CloudConfig::default());
        ws.close(&mut channel);
        assert!(channel.is_shut_down());
    }
}
