//! Operations for randomized gateway testing.
//!
//! An [`Operation`] is one externally visible event: a device connecting, a
//! frame arriving, a channel faulting, a driver misbehaving. Sequences come
//! from proptest seeds, from `arbitrary` in the fuzz target, or from
//! [`random_operations`] with a seeded ChaCha RNG, and are applied to a
//! [`SimGateway`] with [`apply`].

use std::io;

use arbitrary::Arbitrary;
use fieldgate_core::{Condition, SessionId, Side};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{processor::Step, sim_gateway::SimGateway};

/// Node driver names used by [`chaos_gateway`](crate::chaos_gateway).
pub const CHAOS_NODES: [&str; 2] = ["Unix", "TCP"];

/// Which fault condition to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum FaultKind {
    /// Peer hung up
    Hangup,
    /// Error on the handle
    Error,
    /// Handle no longer valid
    Invalid,
    /// Readable and hung up at once (EOF with data)
    ReadableHangup,
}

impl FaultKind {
    /// Condition delivered for this fault.
    pub fn condition(self) -> Condition {
        match self {
            Self::Hangup => Condition::HANGUP,
            Self::Error => Condition::ERROR,
            Self::Invalid => Condition::INVALID,
            Self::ReadableHangup => Condition::READABLE | Condition::HANGUP,
        }
    }
}

/// Side selector that `arbitrary` can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SidePick {
    /// Device side
    Device,
    /// Backend side
    Backend,
}

impl From<SidePick> for Side {
    fn from(pick: SidePick) -> Self {
        match pick {
            SidePick::Device => Side::Device,
            SidePick::Backend => Side::Backend,
        }
    }
}

/// One event applied to a simulated gateway.
///
/// Session and node operands are indices, reduced modulo the number of live
/// sessions or nodes when applied, so every generated value targets
/// something real.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// A device connects to a node driver.
    Connect {
        /// Node index
        node: u8,
    },
    /// A device connects while the backend refuses.
    ConnectRefused {
        /// Node index
        node: u8,
    },
    /// A device sends a frame.
    Frame {
        /// Session index
        session: u8,
        /// Frame length
        len: u8,
    },
    /// The next device read fails.
    RecvError {
        /// Session index
        session: u8,
    },
    /// The processor fails on the next frame.
    ProcessFail {
        /// Session index
        session: u8,
    },
    /// One side of a session faults.
    Fault {
        /// Session index
        session: u8,
        /// Faulting side
        side: SidePick,
        /// Fault condition
        kind: FaultKind,
    },
    /// Both sides fault in the same dispatch pass.
    FaultBoth {
        /// Session index
        session: u8,
        /// Side reported first
        first: SidePick,
        /// Fault condition
        kind: FaultKind,
    },
}

fn pick_session(gateway: &SimGateway, index: u8) -> Option<SessionId> {
    let ids = gateway.manager().session_ids();
    if ids.is_empty() { None } else { ids.get(usize::from(index) % ids.len()).copied() }
}

fn pick_node(index: u8) -> &'static str {
    CHAOS_NODES[usize::from(index) % CHAOS_NODES.len()]
}

/// Apply one operation. Operations that target nothing are no-ops.
pub fn apply(gateway: &mut SimGateway, op: &Operation) {
    match *op {
        Operation::Connect { node } => {
            gateway.connect_device(pick_node(node));
        },
        Operation::ConnectRefused { node } => {
            if let Some(protocol) = gateway.protocol() {
                protocol.fail_next_connect(io::ErrorKind::ConnectionRefused);
            }
            gateway.connect_device(pick_node(node));
        },
        Operation::Frame { session, len } => {
            if let Some(id) = pick_session(gateway, session) {
                if let Some(device) = gateway.device(id) {
                    device.push_inbound(&vec![0x5a; usize::from(len)]);
                }
                gateway.device_readable(id);
            }
        },
        Operation::RecvError { session } => {
            if let Some(id) = pick_session(gateway, session) {
                if let Some(device) = gateway.device(id) {
                    device.fail_next_read(io::ErrorKind::ConnectionReset);
                }
                gateway.device_readable(id);
            }
        },
        Operation::ProcessFail { session } => {
            if let Some(id) = pick_session(gateway, session) {
                if let Some(device) = gateway.device(id) {
                    device.push_inbound(b"bad");
                }
                gateway.processor().then(Step::Fail("scripted".to_string()));
                gateway.device_readable(id);
            }
        },
        Operation::Fault { session, side, kind } => {
            if let Some(id) = pick_session(gateway, session) {
                gateway.fault(id, side.into(), kind.condition());
            }
        },
        Operation::FaultBoth { session, first, kind } => {
            if let Some(id) = pick_session(gateway, session) {
                gateway.fault_both(id, first.into(), kind.condition());
            }
        },
    }
}

/// Generate `count` operations from `seed`. Connects are weighted up so
/// sequences build enough sessions to tear down.
pub fn random_operations(seed: u64, count: usize) -> Vec<Operation> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let fault = |rng: &mut ChaCha8Rng| match rng.gen_range(0..4) {
        0 => FaultKind::Hangup,
        1 => FaultKind::Error,
        2 => FaultKind::Invalid,
        _ => FaultKind::ReadableHangup,
    };
    let side = |rng: &mut ChaCha8Rng| if rng.gen_bool(0.5) { SidePick::Device } else { SidePick::Backend };

    (0..count)
        .map(|_| {
            let session: u8 = rng.r#gen();
            match rng.gen_range(0..10) {
                0..=2 => Operation::Connect { node: rng.r#gen() },
                3 => Operation::ConnectRefused { node: rng.r#gen() },
                4 | 5 => Operation::Frame { session, len: rng.r#gen() },
                6 => Operation::RecvError { session },
                7 => Operation::ProcessFail { session },
                8 => Operation::Fault { session, side: side(&mut rng), kind: fault(&mut rng) },
                _ => Operation::FaultBoth { session, first: side(&mut rng), kind: fault(&mut rng) },
            }
        })
        .collect()
}
