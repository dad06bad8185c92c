//! Production poller over `poll(2)`.

use std::{io, os::fd::BorrowedFd, time::Duration};

use fieldgate_core::{Condition, PollRequest, Poller, Readiness, WatchId};
use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, poll},
};

/// Readiness source backed by `poll(2)`.
///
/// Requests without a descriptor are reported as [`Condition::INVALID`]
/// straight away so the owning watch is torn down.
#[derive(Debug, Default)]
pub struct PollPoller {
    _private: (),
}

impl PollPoller {
    /// Create a poller.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Poller for PollPoller {
    fn poll(
        &mut self,
        requests: &[PollRequest<'_>],
        timeout: Option<Duration>,
    ) -> io::Result<Vec<Readiness>> {
        let mut ready = Vec::new();
        let mut polled: Vec<(WatchId, BorrowedFd<'_>, Condition)> = Vec::with_capacity(requests.len());

        for request in requests {
            match request.fd {
                Some(fd) => polled.push((request.watch, fd, request.interest)),
                None => ready.push(Readiness::new(request.watch, Condition::INVALID)),
            }
        }

        // Faults already pending; do not block behind them.
        let timeout = if ready.is_empty() { timeout_millis(timeout) } else { 0 };

        let mut fds: Vec<PollFd<'_>> =
            polled.iter().map(|(_, fd, interest)| PollFd::new(fd, to_flags(*interest))).collect();

        match poll(&mut fds, timeout) {
            Ok(_) => {},
            Err(Errno::EINTR) => return Ok(ready),
            Err(errno) => return Err(io::Error::from(errno)),
        }

        for ((watch, _, _), fd) in polled.iter().zip(&fds) {
            let condition = fd.revents().map(from_flags).unwrap_or_default();
            if !condition.is_empty() {
                ready.push(Readiness::new(*watch, condition));
            }
        }

        Ok(ready)
    }
}

/// `poll(2)` timeout: -1 blocks forever, otherwise milliseconds clamped to
/// `i32::MAX`.
fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
    }
}

fn to_flags(interest: Condition) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.contains(Condition::READABLE) {
        flags |= PollFlags::POLLIN;
    }
    // POLLHUP, POLLERR and POLLNVAL are always reported. A peer that only
    // half-closes shows up as POLLIN and a zero-byte read.
    flags
}

fn from_flags(flags: PollFlags) -> Condition {
    let mut condition = Condition::EMPTY;
    if flags.contains(PollFlags::POLLIN) {
        condition |= Condition::READABLE;
    }
    if flags.contains(PollFlags::POLLHUP) {
        condition |= Condition::HANGUP;
    }
    if flags.contains(PollFlags::POLLERR) {
        condition |= Condition::ERROR;
    }
    if flags.contains(PollFlags::POLLNVAL) {
        condition |= Condition::INVALID;
    }
    condition
}
