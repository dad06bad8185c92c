//! Deterministic simulation harness for Fieldgate.
//!
//! Simulated streams, drivers, poller and processor that let tests run the
//! real [`SessionManager`](fieldgate_core::SessionManager) without sockets.
//! Every simulated stream journals its reads, writes, shutdown and release,
//! so tests can assert on teardown order.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! dispatch pass (watch accounting, single teardown, channel release). Use
//! [`InvariantRegistry::standard()`] together with [`SimGateway::snapshot`].
//!
//! # Randomized Testing
//!
//! The `operation` module generates event sequences from a seed or from
//! `arbitrary` input and applies them to a [`SimGateway`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod journal;
pub mod operation;
pub mod processor;
pub mod sim_driver;
pub mod sim_gateway;
pub mod sim_poller;
pub mod sim_stream;

use fieldgate_core::{GatewayError, ManagerConfig};
pub use invariants::{
    BalancedSessions, ChannelRelease, ClosedSession, GatewaySnapshot, Invariant,
    InvariantRegistry, InvariantResult, SessionSnapshot, SingleTeardown, Violation,
    WatchAccounting,
};
pub use journal::{Journal, StreamEvent, StreamKind, StreamTag};
pub use operation::{CHAOS_NODES, FaultKind, Operation, SidePick, apply, random_operations};
pub use processor::{ScriptedProcessor, Step};
pub use sim_driver::{SimNodeDriver, SimNodeHandle, SimProtocolDriver, SimProtocolHandle};
pub use sim_gateway::{SimGateway, SimManager, SimSetup, TEST_TOKEN, TEST_UUID};
pub use sim_poller::SimPoller;
pub use sim_stream::{SimStream, SimStreamHandle};

/// Gateway with the [`CHAOS_NODES`] node drivers and a `ws` protocol driver,
/// as used by the randomized tests.
pub fn chaos_gateway(max_sessions: usize) -> Result<SimGateway, GatewayError> {
    let config = ManagerConfig { max_sessions, ..ManagerConfig::default() };
    SimSetup::with(&CHAOS_NODES, "ws").start(config)
}
