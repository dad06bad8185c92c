//! Node drivers for local device transports.
//!
//! Registration order matters: drivers are probed and activated in the order
//! [`register`] adds them.

mod serial;
mod tcp;
mod unix;

use fieldgate_core::DriverRegistry;
pub use serial::SerialNode;
pub use tcp::{DEFAULT_TCP_BIND, TcpNode};
pub use unix::{DEFAULT_SOCKET_PATH, UnixNode};

/// Append the compiled-in node drivers: Unix socket, serial line, TCP.
#[must_use]
pub fn register(registry: DriverRegistry, unix: UnixNode, serial: SerialNode, tcp: TcpNode) -> DriverRegistry {
    registry.with_node(unix).with_node(serial).with_node(tcp)
}
