//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the gateway at a point in time,
//! between dispatch passes. Invariants operate on snapshots rather than live
//! state so that each check sees one consistent view.

use fieldgate_core::{ManagerStats, SessionId, SessionState, WatchId};

use crate::journal::{StreamEvent, StreamTag};

/// Snapshot of the whole gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewaySnapshot {
    /// Tracked sessions that are still live.
    pub sessions: Vec<SessionSnapshot>,
    /// Tracked sessions that have been reclaimed.
    pub closed: Vec<ClosedSession>,
    /// Live sessions according to the manager.
    pub live_sessions: usize,
    /// Registered listener watches.
    pub listener_count: usize,
    /// Registered watches of any kind.
    pub watch_count: usize,
    /// Manager counters.
    pub stats: ManagerStats,
    /// Stream journal.
    pub events: Vec<StreamEvent>,
}

impl GatewaySnapshot {
    /// Number of `Released` events for `tag`.
    pub fn releases(&self, tag: StreamTag) -> usize {
        self.events.iter().filter(|e| **e == StreamEvent::Released(tag)).count()
    }
}

/// One live session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// Lifecycle state.
    pub state: SessionState,
    /// Device watch, if registered.
    pub device_watch: Option<WatchId>,
    /// Backend watch, if registered.
    pub backend_watch: Option<WatchId>,
    /// Whether the device channel is still held.
    pub holds_device: bool,
    /// Whether the backend channel is still held.
    pub holds_backend: bool,
    /// Device stream.
    pub device: StreamTag,
    /// Backend stream.
    pub backend: StreamTag,
}

/// One reclaimed session.
#[derive(Debug, Clone, Copy)]
pub struct ClosedSession {
    /// Session id.
    pub id: SessionId,
    /// Device stream it owned.
    pub device: StreamTag,
    /// Backend stream it owned.
    pub backend: StreamTag,
}
