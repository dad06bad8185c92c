//! In-memory stream double.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    os::fd::BorrowedFd,
    sync::{Arc, Mutex, MutexGuard},
};

use fieldgate_core::Stream;

use crate::journal::{Journal, StreamEvent, StreamTag};

#[derive(Debug, Default)]
struct StreamState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    read_errors: VecDeque<io::ErrorKind>,
    fail_writes: bool,
    peer_closed: bool,
}

/// Simulated byte stream. Has no descriptor, so only a simulated poller can
/// drive it. Reading with nothing queued reports `WouldBlock`, or end of
/// stream once the peer has closed.
#[derive(Debug)]
pub struct SimStream {
    tag: StreamTag,
    journal: Journal,
    state: Arc<Mutex<StreamState>>,
}

/// Test-side handle to a [`SimStream`].
#[derive(Debug, Clone)]
pub struct SimStreamHandle {
    tag: StreamTag,
    journal: Journal,
    state: Arc<Mutex<StreamState>>,
}

fn lock(state: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl SimStream {
    /// Create a stream journaled under `tag`, plus its handle.
    pub fn new(tag: StreamTag, journal: Journal) -> (Self, SimStreamHandle) {
        let state = Arc::new(Mutex::new(StreamState::default()));
        let handle = SimStreamHandle { tag, journal: journal.clone(), state: Arc::clone(&state) };
        (Self { tag, journal, state }, handle)
    }

    /// Journal tag.
    pub fn tag(&self) -> StreamTag {
        self.tag
    }
}

impl SimStreamHandle {
    /// Journal tag.
    pub fn tag(&self) -> StreamTag {
        self.tag
    }

    /// Queue bytes for the stream's reader.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes);
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        lock(&self.state).read_errors.push_back(kind);
    }

    /// Close the peer's end: once queued bytes are drained, reads return 0.
    pub fn close_peer(&self) {
        lock(&self.state).peer_closed = true;
    }

    /// Make every write fail.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Everything written to the stream so far.
    pub fn outbound(&self) -> Vec<u8> {
        lock(&self.state).outbound.clone()
    }

    /// Whether the stream was dropped.
    pub fn is_released(&self) -> bool {
        self.journal.is_released(self.tag)
    }

    /// Whether the stream was shut down.
    pub fn is_shut_down(&self) -> bool {
        self.journal.is_shut_down(self.tag)
    }
}

impl Read for SimStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if let Some(kind) = state.read_errors.pop_front() {
            return Err(io::Error::from(kind));
        }
        if state.inbound.is_empty() {
            if state.peer_closed {
                return Ok(0);
            }
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }

        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        drop(state);

        self.journal.record(StreamEvent::Read(self.tag, n));
        Ok(n)
    }
}

impl Write for SimStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        state.outbound.extend_from_slice(buf);
        drop(state);

        self.journal.record(StreamEvent::Written(self.tag, buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for SimStream {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.journal.record(StreamEvent::ShutDown(self.tag));
        Ok(())
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.journal.record(StreamEvent::Released(self.tag));
    }
}
