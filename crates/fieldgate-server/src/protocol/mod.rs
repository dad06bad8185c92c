//! Protocol drivers for the cloud backend.
//!
//! Both drivers open plain TCP connections to the configured cloud host. The
//! host is resolved once by `probe`; `connect` blocks for at most the connect
//! timeout.

mod http;
mod ws;

use std::{
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use fieldgate_core::{Channel, CloudConfig, DriverError, DriverRegistry};
pub use http::HttpProtocol;
pub use ws::WsProtocol;

/// Default bound on a blocking backend connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Append the compiled-in protocol drivers for `cloud`.
#[must_use]
pub fn register(registry: DriverRegistry, cloud: &CloudConfig) -> DriverRegistry {
    registry.with_protocol(HttpProtocol::new(cloud)).with_protocol(WsProtocol::new(cloud))
}

/// Resolved TCP endpoint shared by the protocol drivers.
#[derive(Debug, Clone)]
struct TcpBackend {
    driver: &'static str,
    host: String,
    port: u16,
    addr: Option<SocketAddr>,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl TcpBackend {
    fn new(driver: &'static str, cloud: &CloudConfig, default_port: u16) -> Self {
        Self {
            driver,
            host: cloud.host.clone(),
            port: cloud.port.unwrap_or(default_port),
            addr: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
        }
    }

    fn resolve(&mut self) -> Result<SocketAddr, DriverError> {
        let unavailable = |reason: String| DriverError::Unavailable { driver: self.driver, reason };

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| unavailable(format!("cannot resolve {}: {e}", self.host)))?
            .next()
            .ok_or_else(|| unavailable(format!("no address for {}", self.host)))?;

        tracing::info!(protocol = self.driver, host = %self.host, %addr, "backend resolved");
        self.addr = Some(addr);
        Ok(addr)
    }

    fn connect(&mut self, label: &'static str) -> Result<Channel, DriverError> {
        let addr = match self.addr {
            Some(addr) => addr,
            None => self.resolve()?,
        };

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout)?;

        tracing::debug!(protocol = self.driver, %addr, "backend connected");
        Ok(Channel::new(label, stream))
    }

    fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use fieldgate_core::ProtocolDriver;

    use super::*;

    fn local_cloud(port: u16) -> CloudConfig {
        CloudConfig { host: "127.0.0.1".to_string(), port: Some(port) }
    }

    #[test]
    fn registers_both_protocols() {
        let registry = register(DriverRegistry::new(), &CloudConfig::default());
        assert_eq!(registry.protocol_names().collect::<Vec<_>>(), vec!["http", "ws"]);
    }

    #[test]
    fn connects_to_resolved_backend() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();

        let mut http = HttpProtocol::new(&local_cloud(port));
        http.probe().unwrap();
        let channel = http.connect().unwrap();
        assert_eq!(channel.label(), "http");
        assert!(server.accept().is_ok());
    }

    #[test]
    fn refused_connect_is_an_error() {
        let port = {
            let server = TcpListener::bind("127.0.0.1:0").unwrap();
            server.local_addr().unwrap().port()
        };

        let mut ws = WsProtocol::new(&local_cloud(port));
        ws.probe().unwrap();
        let err = ws.connect().unwrap_err();
        assert!(matches!(err, DriverError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused));
    }
}
