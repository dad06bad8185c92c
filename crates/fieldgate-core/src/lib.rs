//! Fieldgate core.
//!
//! Session management for a gateway that bridges local IoT devices to a cloud
//! backend. Devices connect over node drivers (Unix socket, TCP, serial); each
//! accepted device is paired with one backend connection opened by the active
//! protocol driver, and frames are relayed through a [`MessageProcessor`].
//!
//! # Architecture
//!
//! The core does no I/O scheduling of its own. A [`Poller`] reports readiness
//! for the watches held by the [`Reactor`], and the [`SessionManager`] runs the
//! matching callback to completion on the calling thread. Watch removal runs a
//! destroy notifier exactly once; the notifiers of the two sides of a session
//! cascade so that a fault on either side tears down the whole session.
//!
//! # Components
//!
//! - [`SessionManager`]: driver selection, accept handling, relay, teardown
//! - [`Reactor`]: watch registrations and the [`Poller`] seam
//! - [`NodeDriver`] / [`ProtocolDriver`]: device and backend transports
//! - [`GatewayConfig`]: credential and cloud settings from the config file

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod credential;
pub mod driver;
pub mod error;
pub mod manager;
pub mod processor;
pub mod reactor;
pub mod session;

pub use channel::{Channel, Stream};
pub use config::{CloudConfig, ConfigError, GatewayConfig};
pub use credential::{Credential, CredentialError};
pub use driver::{Acceptor, DriverError, DriverRegistry, Listener, NodeDriver, ProtocolDriver};
pub use error::GatewayError;
pub use manager::{ManagerConfig, ManagerStats, SessionManager};
pub use processor::{MessageProcessor, ProcessError};
pub use reactor::{Condition, PollRequest, Poller, Reactor, Readiness, WatchId, WatchTarget};
pub use session::{Session, SessionId, SessionState, Side};
