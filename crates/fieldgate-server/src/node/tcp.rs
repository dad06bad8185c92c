//! TCP node driver for devices on the local network.

use std::{
    io,
    net::{SocketAddr, TcpListener},
    os::fd::{AsFd, BorrowedFd},
};

use fieldgate_core::{Acceptor, Channel, DriverError, Listener, NodeDriver};

/// Default bind address.
pub const DEFAULT_TCP_BIND: &str = "127.0.0.1:8884";

/// Node driver listening on a TCP port.
#[derive(Debug, Clone)]
pub struct TcpNode {
    bind: String,
    local_addr: Option<SocketAddr>,
}

impl TcpNode {
    /// Driver name.
    pub const NAME: &'static str = "TCP";

    /// Listen on `bind` (`host:port`).
    pub fn new(bind: impl Into<String>) -> Self {
        Self { bind: bind.into(), local_addr: None }
    }

    /// Bound address, once listening. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Default for TcpNode {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_BIND)
    }
}

impl NodeDriver for TcpNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        self.bind.parse::<SocketAddr>().map(|_| ()).map_err(|e| DriverError::Unavailable {
            driver: Self::NAME,
            reason: format!("invalid bind address '{}': {e}", self.bind),
        })
    }

    fn listen(&mut self) -> Result<Listener, DriverError> {
        let listener = TcpListener::bind(&self.bind)?;
        listener.set_nonblocking(true)?;

        let addr = listener.local_addr()?;
        self.local_addr = Some(addr);

        tracing::info!(%addr, "tcp node listening");
        Ok(Listener::new(TcpAcceptor { listener }))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
}

impl Acceptor for TcpAcceptor {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.listener.as_fd())
    }

    fn accept(&mut self) -> io::Result<Channel> {
        let (stream, peer) = self.listener.accept()?;
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        tracing::debug!(%peer, "tcp device connected");
        Ok(Channel::new(TcpNode::NAME, stream))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;

    use super::*;

    #[test]
    fn listens_on_ephemeral_port() {
        let mut node = TcpNode::new("127.0.0.1:0");
        node.probe().unwrap();
        let mut listener = node.listen().unwrap();

        let addr = node.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let _device = TcpStream::connect(addr).unwrap();
        let channel = node.accept(&mut listener).unwrap();
        assert_eq!(channel.label(), "TCP");
    }

    #[test]
    fn probe_rejects_bad_address() {
        let mut node = TcpNode::new("not an address");
        let err = node.probe().unwrap_err();
        assert!(err.to_string().starts_with("TCP unavailable"));
    }
}
