//! Watch registry and poller seam for the single-threaded event loop.
//!
//! The [`Reactor`] owns every watch registration. A watch pairs a
//! [`WatchTarget`] (what the session manager should do when it fires) with an
//! interest set of [`Condition`]s. Watch ids are never reused, and removing an
//! id succeeds at most once, which is what makes destroy notifiers run at most
//! once per watch.
//!
//! Readiness comes from a [`Poller`]. The production poller wraps `poll(2)`;
//! the simulation harness supplies scripted readiness.

use std::{
    collections::BTreeMap,
    fmt, io,
    num::NonZeroU64,
    ops::{BitOr, BitOrAssign},
    os::fd::BorrowedFd,
    time::Duration,
};

use crate::session::SessionId;

/// Readiness and fault conditions reported for a watched handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Condition(u8);

impl Condition {
    /// No condition.
    pub const EMPTY: Self = Self(0);
    /// Data can be read (or a connection accepted) without blocking.
    pub const READABLE: Self = Self(1);
    /// Peer hung up.
    pub const HANGUP: Self = Self(1 << 1);
    /// Error on the handle.
    pub const ERROR: Self = Self(1 << 2);
    /// Handle is not valid (closed descriptor).
    pub const INVALID: Self = Self(1 << 3);
    /// Every fault condition. Faults are always reported.
    pub const FAULT: Self = Self(Self::HANGUP.0 | Self::ERROR.0 | Self::INVALID.0);

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True if no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if a hangup, error or invalid condition is set.
    pub const fn is_fault(self) -> bool {
        self.intersects(Self::FAULT)
    }

    /// Bits present in both sets.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits present in either set. Usable in constants, unlike `|`.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Condition {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Condition {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Condition, &str); 4] = [
            (Condition::READABLE, "READABLE"),
            (Condition::HANGUP, "HANGUP"),
            (Condition::ERROR, "ERROR"),
            (Condition::INVALID, "INVALID"),
        ];

        if self.is_empty() {
            return f.write_str("EMPTY");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Identifier of a registered watch. Never reused within a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(NonZeroU64);

impl WatchId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a watch is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    /// Listening handle of the active node driver at this index
    Listener(usize),
    /// Device side of a session
    Device(SessionId),
    /// Backend side of a session
    Backend(SessionId),
}

/// A registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    /// Attachment
    pub target: WatchTarget,
    /// Conditions the watch is interested in
    pub interest: Condition,
}

/// Registry of live watches.
#[derive(Debug)]
pub struct Reactor {
    watches: BTreeMap<WatchId, Watch>,
    next_id: NonZeroU64,
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    /// Create an empty reactor.
    pub fn new() -> Self {
        Self { watches: BTreeMap::new(), next_id: NonZeroU64::MIN }
    }

    /// Register a watch and return its id.
    pub fn add(&mut self, target: WatchTarget, interest: Condition) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        self.watches.insert(id, Watch { target, interest });
        id
    }

    /// Remove a watch. Returns the removed watch, or `None` if it was already
    /// removed (or never existed).
    pub fn remove(&mut self, id: WatchId) -> Option<Watch> {
        self.watches.remove(&id)
    }

    /// Look up a live watch.
    pub fn get(&self, id: WatchId) -> Option<&Watch> {
        self.watches.get(&id)
    }

    /// Check whether a watch is still registered.
    pub fn contains(&self, id: WatchId) -> bool {
        self.watches.contains_key(&id)
    }

    /// Live watches in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (WatchId, &Watch)> + '_ {
        self.watches.iter().map(|(id, watch)| (*id, watch))
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// True if no watches are registered.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

/// One watch handed to a [`Poller`].
#[derive(Debug, Clone, Copy)]
pub struct PollRequest<'a> {
    /// Watch being polled
    pub watch: WatchId,
    /// Descriptor, if the handle has one
    pub fd: Option<BorrowedFd<'a>>,
    /// Conditions of interest
    pub interest: Condition,
}

/// Readiness reported by a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Watch that fired
    pub watch: WatchId,
    /// Conditions observed
    pub condition: Condition,
}

impl Readiness {
    /// Build a readiness report.
    pub fn new(watch: WatchId, condition: Condition) -> Self {
        Self { watch, condition }
    }
}

/// Source of readiness events.
pub trait Poller {
    /// Wait up to `timeout` (forever if `None`) for any request to become
    /// ready. An interrupted wait returns an empty list.
    fn poll(
        &mut self,
        requests: &[PollRequest<'_>],
        timeout: Option<Duration>,
    ) -> io::Result<Vec<Readiness>>;
}
