//! Session records and the live-session registry.
//!
//! A [`Session`] pairs one accepted device channel with one backend channel
//! and the ids of the two watches the manager registered for them. The
//! [`SessionRegistry`] exclusively owns every live session; removing a session
//! from the registry is the reclamation step and happens exactly once.

use std::{collections::HashMap, fmt};

use crate::{channel::Channel, reactor::WatchId};

/// Session identifier, unique for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Build an id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Local device connection
    Device,
    /// Cloud backend connection
    Backend,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Device => Self::Backend,
            Self::Backend => Self::Device,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Backend => f.write_str("backend"),
        }
    }
}

/// Lifecycle of a session.
///
/// ```text
/// ┌────────┐  either side faults  ┌──────────────┐  both released  ┌────────┐
/// │ Active │─────────────────────>│ HalfClosing  │────────────────>│ Closed │
/// └────────┘                      └──────────────┘                 └────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Both watches live
    Active,
    /// A watch was removed and the teardown cascade is in progress
    HalfClosing,
    /// Both channels released and the session reclaimed
    Closed,
}

/// A live device/backend pairing.
#[derive(Debug)]
pub struct Session {
    pub(crate) device_watch: Option<WatchId>,
    pub(crate) backend_watch: Option<WatchId>,
    pub(crate) device: Option<Channel>,
    pub(crate) backend: Option<Channel>,
    pub(crate) node: usize,
    pub(crate) closing: bool,
}

impl Session {
    /// Pair a device channel accepted by the node driver at index `node` with
    /// a backend channel. Watches are attached afterwards.
    pub fn new(node: usize, device: Channel, backend: Channel) -> Self {
        Self {
            device_watch: None,
            backend_watch: None,
            device: Some(device),
            backend: Some(backend),
            node,
            closing: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.closing || self.device_watch.is_none() || self.backend_watch.is_none() {
            SessionState::HalfClosing
        } else {
            SessionState::Active
        }
    }

    /// Watch id of one side, if still registered.
    pub fn watch(&self, side: Side) -> Option<WatchId> {
        match side {
            Side::Device => self.device_watch,
            Side::Backend => self.backend_watch,
        }
    }

    /// Whether the channel of one side is still held.
    pub fn holds_channel(&self, side: Side) -> bool {
        match side {
            Side::Device => self.device.is_some(),
            Side::Backend => self.backend.is_some(),
        }
    }

    /// Index of the node driver that accepted the device.
    pub fn node(&self) -> usize {
        self.node
    }
}

/// Registry of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_id: u64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its freshly allocated id.
    pub fn insert(&mut self, session: Session) -> SessionId {
        self.insert_with(|_| session)
    }

    /// Allocate an id, build the session with it, and register it.
    pub fn insert_with(&mut self, build: impl FnOnce(SessionId) -> Session) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(id, build(id));
        id
    }

    /// Remove a session. Returns `None` if it was already reclaimed.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Session by id.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Mutable session by id.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Check if a session is live.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Ids of all live sessions, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Lifecycle state of a session id issued by this registry.
    pub fn state(&self, id: SessionId) -> SessionState {
        self.sessions.get(&id).map_or(SessionState::Closed, Session::state)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::reactor::{Condition, Reactor, WatchTarget};

    fn session() -> Session {
        let (device, _) = UnixStream::pair().unwrap();
        let (backend, _) = UnixStream::pair().unwrap();
        Session::new(0, Channel::new("unix", device), Channel::new("tcp", backend))
    }

    #[test]
    fn insert_allocates_distinct_ids() {
        let mut registry = SessionRegistry::new();

        let a = registry.insert(session());
        let b = registry.insert(session());

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![a, b]);
    }

    #[test]
    fn remove_reclaims_once() {
        let mut registry = SessionRegistry::new();
        let id = registry.insert(session());

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.contains(id));
        assert_eq!(registry.state(id), SessionState::Closed);
    }

    #[test]
    fn state_follows_watches() {
        let mut reactor = Reactor::new();
        let mut registry = SessionRegistry::new();
        let id = registry.insert(session());

        assert_eq!(registry.state(id), SessionState::HalfClosing);

        let s = registry.get_mut(id).unwrap();
        s.device_watch = Some(reactor.add(WatchTarget::Device(id), Condition::READABLE));
        s.backend_watch = Some(reactor.add(WatchTarget::Backend(id), Condition::FAULT));
        assert_eq!(registry.state(id), SessionState::Active);

        registry.get_mut(id).unwrap().backend_watch = None;
        assert_eq!(registry.state(id), SessionState::HalfClosing);
    }

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Device.opposite(), Side::Backend);
        assert_eq!(Side::Backend.opposite(), Side::Device);
        assert_eq!(Side::Device.to_string(), "device");
    }
}
