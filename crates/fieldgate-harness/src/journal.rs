//! Shared event journal for simulated streams.
//!
//! Every [`SimStream`](crate::SimStream) appends what happens to it (reads,
//! writes, shutdown, release on drop) to one journal, so tests can check the
//! order in which the session manager touched each channel.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

/// Which side of a session a stream was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    /// Accepted by a node driver
    Device,
    /// Opened by a protocol driver
    Backend,
}

/// Identity of a simulated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamTag {
    /// Side
    pub kind: StreamKind,
    /// Creation sequence number within its kind, starting at 1
    pub seq: u32,
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamKind::Device => write!(f, "device#{}", self.seq),
            StreamKind::Backend => write!(f, "backend#{}", self.seq),
        }
    }
}

/// Something that happened to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Bytes handed to a reader
    Read(StreamTag, usize),
    /// Bytes accepted from a writer
    Written(StreamTag, Vec<u8>),
    /// Both directions shut down
    ShutDown(StreamTag),
    /// Stream dropped
    Released(StreamTag),
}

impl StreamEvent {
    /// Stream the event belongs to.
    pub fn tag(&self) -> StreamTag {
        match self {
            Self::Read(tag, _) | Self::Written(tag, _) | Self::ShutDown(tag) | Self::Released(tag) => {
                *tag
            },
        }
    }
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<StreamEvent>,
    devices: u32,
    backends: u32,
}

/// Cloneable handle to the shared journal.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        // A panicking test thread may poison the lock; the data is still usable.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Allocate the next tag of `kind`.
    pub fn next_tag(&self, kind: StreamKind) -> StreamTag {
        let mut state = self.lock();
        let counter = match kind {
            StreamKind::Device => &mut state.devices,
            StreamKind::Backend => &mut state.backends,
        };
        *counter += 1;
        StreamTag { kind, seq: *counter }
    }

    /// Append an event.
    pub fn record(&self, event: StreamEvent) {
        self.lock().events.push(event);
    }

    /// Copy of all events so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.lock().events.clone()
    }

    /// Events of one stream, in order.
    pub fn events_for(&self, tag: StreamTag) -> Vec<StreamEvent> {
        self.lock().events.iter().filter(|e| e.tag() == tag).cloned().collect()
    }

    /// Whether `tag` was released.
    pub fn is_released(&self, tag: StreamTag) -> bool {
        self.lock().events.contains(&StreamEvent::Released(tag))
    }

    /// Whether `tag` was shut down.
    pub fn is_shut_down(&self, tag: StreamTag) -> bool {
        self.lock().events.contains(&StreamEvent::ShutDown(tag))
    }

    /// Number of times `tag` was released.
    pub fn release_count(&self, tag: StreamTag) -> usize {
        self.lock().events.iter().filter(|e| **e == StreamEvent::Released(tag)).count()
    }

    /// Position of an event in the journal.
    pub fn position(&self, event: &StreamEvent) -> Option<usize> {
        self.lock().events.iter().position(|e| e == event)
    }
}
