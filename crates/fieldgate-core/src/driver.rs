//! Node and protocol driver contracts.
//!
//! A [`NodeDriver`] exposes one local device transport (Unix socket, serial
//! line, radio, TCP) as a listening socket abstraction. A [`ProtocolDriver`]
//! exposes the cloud backend as a connectable socket abstraction. Concrete
//! drivers are plugged into a [`DriverRegistry`] in a fixed order; the session
//! manager selects and activates a subset at startup.

use std::{
    fmt, io,
    io::{Read, Write},
    os::fd::BorrowedFd,
};

use thiserror::Error;

use crate::channel::Channel;

/// Errors reported by drivers.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The transport or backend is not usable on this host.
    #[error("{driver} unavailable: {reason}")]
    Unavailable {
        /// Driver name
        driver: &'static str,
        /// Why the driver cannot be used
        reason: String,
    },

    /// The driver does not implement this optional operation.
    ///
    /// This is a capability gap, not an I/O failure.
    #[error("{operation} not supported")]
    NotSupported {
        /// Operation that was requested
        operation: &'static str,
    },
}

impl DriverError {
    /// Returns true if the error reports an unimplemented optional hook.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Listening endpoint that yields device channels.
pub trait Acceptor {
    /// Descriptor that becomes readable when a connection is pending.
    fn poll_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Accept one pending connection.
    fn accept(&mut self) -> io::Result<Channel>;
}

/// Listening handle returned by [`NodeDriver::listen`].
pub struct Listener {
    acceptor: Box<dyn Acceptor>,
}

impl Listener {
    /// Wrap an acceptor.
    pub fn new(acceptor: impl Acceptor + 'static) -> Self {
        Self { acceptor: Box::new(acceptor) }
    }

    /// Descriptor to poll, if any.
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        self.acceptor.poll_fd()
    }

    /// Accept one pending connection.
    pub fn accept(&mut self) -> io::Result<Channel> {
        self.acceptor.accept()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("fd", &self.poll_fd()).finish()
    }
}

/// Local device transport.
///
/// The default `accept`, `recv` and `send` delegate to the listener and
/// channel; drivers with framing (serial, radio) override them.
pub trait NodeDriver {
    /// Stable driver name, matched against the transport allow-list.
    fn name(&self) -> &'static str;

    /// Whether configuration provides what this driver needs (e.g. a serial
    /// device path). Unconfigured drivers are skipped without probing.
    fn is_configured(&self) -> bool {
        true
    }

    /// Check whether the transport is available on this host.
    fn probe(&mut self) -> Result<(), DriverError>;

    /// Start listening for device connections.
    fn listen(&mut self) -> Result<Listener, DriverError>;

    /// Accept one device connection from `listener`.
    fn accept(&mut self, listener: &mut Listener) -> Result<Channel, DriverError> {
        Ok(listener.accept()?)
    }

    /// Receive one inbound frame into `buf`, returning the byte count.
    /// `Ok(0)` means the device closed its end of the stream.
    fn recv(&mut self, channel: &mut Channel, buf: &mut [u8]) -> Result<usize, DriverError> {
        Ok(channel.read(buf)?)
    }

    /// Send `buf` to the device, returning the byte count.
    fn send(&mut self, channel: &mut Channel, buf: &[u8]) -> Result<usize, DriverError> {
        channel.write_all(buf)?;
        Ok(buf.len())
    }

    /// Release driver-held resources.
    fn remove(&mut self) {}
}

/// Cloud backend transport.
pub trait ProtocolDriver {
    /// Stable protocol name, matched against the requested protocol.
    fn name(&self) -> &'static str;

    /// Check whether the backend is reachable/usable.
    fn probe(&mut self) -> Result<(), DriverError>;

    /// Open a new backend connection. May block briefly.
    fn connect(&mut self) -> Result<Channel, DriverError>;

    /// Protocol-level close of a backend connection before it is dropped.
    fn close(&mut self, channel: &mut Channel) {
        let _ = channel;
    }

    /// Register a new device with the backend. Optional.
    fn signup(&mut self, channel: &mut Channel, payload: &[u8]) -> Result<Vec<u8>, DriverError> {
        let _ = (channel, payload);
        Err(DriverError::NotSupported { operation: "signup" })
    }

    /// Authenticate an existing device. Optional.
    fn signin(&mut self, channel: &mut Channel, token: &str) -> Result<(), DriverError> {
        let _ = (channel, token);
        Err(DriverError::NotSupported { operation: "signin" })
    }

    /// Release driver-held resources.
    fn remove(&mut self) {}
}

/// Ordered set of compiled-in drivers.
///
/// Order is significant: node drivers are probed and activated in insertion
/// order.
#[derive(Default)]
pub struct DriverRegistry {
    protocols: Vec<Box<dyn ProtocolDriver>>,
    nodes: Vec<Box<dyn NodeDriver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a protocol driver.
    #[must_use]
    pub fn with_protocol(mut self, driver: impl ProtocolDriver + 'static) -> Self {
        self.protocols.push(Box::new(driver));
        self
    }

    /// Append a node driver.
    #[must_use]
    pub fn with_node(mut self, driver: impl NodeDriver + 'static) -> Self {
        self.nodes.push(Box::new(driver));
        self
    }

    /// Names of the registered protocol drivers, in order.
    pub fn protocol_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.protocols.iter().map(|d| d.name())
    }

    /// Names of the registered node drivers, in order.
    pub fn node_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.iter().map(|d| d.name())
    }

    /// Split into protocol and node driver lists.
    pub(crate) fn into_parts(self) -> (Vec<Box<dyn ProtocolDriver>>, Vec<Box<dyn NodeDriver>>) {
        (self.protocols, self.nodes)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("protocols", &self.protocol_names().collect::<Vec<_>>())
            .field("nodes", &self.node_names().collect::<Vec<_>>())
            .finish()
    }
}
