//! Fieldgate production daemon.
//!
//! Production "glue" around [`fieldgate_core`]: a `poll(2)` poller, the
//! compiled-in node and protocol drivers, a pass-through message processor
//! and the [`Gateway`] runtime that wires them to the session manager.
//!
//! # Components
//!
//! - [`Gateway`]: loads configuration, starts the manager, handles signals
//! - [`PollPoller`]: readiness via `poll(2)`
//! - [`UnixNode`], [`SerialNode`], [`TcpNode`]: device transports
//! - [`HttpProtocol`], [`WsProtocol`]: backend transports
//! - [`RelayProcessor`]: forwards frames unchanged

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod gateway;
pub mod node;
mod poller;
pub mod protocol;
mod relay;

pub use error::ServerError;
pub use gateway::{DEFAULT_CONFIG_PATH, Gateway, GatewayManager, GatewaySettings};
pub use node::{SerialNode, TcpNode, UnixNode};
pub use poller::PollPoller;
pub use protocol::{HttpProtocol, WsProtocol};
pub use relay::RelayProcessor;
