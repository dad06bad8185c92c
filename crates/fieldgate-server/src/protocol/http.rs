//! REST protocol driver.

use std::time::Duration;

use fieldgate_core::{Channel, CloudConfig, DriverError, ProtocolDriver};

use super::TcpBackend;

/// Default REST port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Request/response backend: every relayed frame expects a prompt reply, so
/// backend reads are bounded.
#[derive(Debug, Clone)]
pub struct HttpProtocol {
    backend: TcpBackend,
}

impl HttpProtocol {
    /// Driver name.
    pub const NAME: &'static str = "http";

    /// Driver for the cloud host in `cloud`.
    pub fn new(cloud: &CloudConfig) -> Self {
        let mut backend = TcpBackend::new(Self::NAME, cloud, DEFAULT_HTTP_PORT);
        backend.read_timeout = Some(Duration::from_secs(10));
        Self { backend }
    }

    /// Backend host and port.
    pub fn endpoint(&self) -> (&str, u16) {
        self.backend.endpoint()
    }
}

impl ProtocolDriver for HttpProtocol {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        self.backend.resolve().map(|_| ())
    }

    fn connect(&mut self) -> Result<Channel, DriverError> {
        self.backend.connect(Self::NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_applies_without_override() {
        let http = HttpProtocol::new(&CloudConfig::default());
        assert_eq!(http.endpoint(), ("localhost", DEFAULT_HTTP_PORT));
    }

    #[test]
    fn auth_hooks_are_not_supported() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut channel = Channel::new("pair", a);
        let mut http = HttpProtocol::new(&CloudConfig::default());

        assert!(http.signup(&mut channel, b"{}").unwrap_err().is_not_supported());
        assert!(http.signin(&mut channel, "token").unwrap_err().is_not_supported());
    }
}
