//! Simulated node and protocol drivers.
//!
//! Both drivers keep their state behind a shared handle so tests can script
//! failures and inspect calls after the session manager has taken ownership
//! of the driver itself.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    io,
    os::fd::BorrowedFd,
    sync::{Arc, Mutex, MutexGuard},
};

use fieldgate_core::{Acceptor, Channel, DriverError, Listener, NodeDriver, ProtocolDriver};

use crate::{
    journal::{Journal, StreamKind},
    sim_stream::{SimStream, SimStreamHandle},
};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct NodeState {
    configured: bool,
    probe_error: Option<String>,
    listen_error: Option<io::ErrorKind>,
    pending: VecDeque<SimStream>,
    accept_errors: VecDeque<io::ErrorKind>,
    devices: Vec<SimStreamHandle>,
    probes: u32,
    listens: u32,
    accepted: u32,
    removes: u32,
}

/// Simulated node driver.
#[derive(Debug)]
pub struct SimNodeDriver {
    name: &'static str,
    state: Arc<Mutex<NodeState>>,
}

/// Test-side handle to a [`SimNodeDriver`].
#[derive(Debug, Clone)]
pub struct SimNodeHandle {
    name: &'static str,
    journal: Journal,
    state: Arc<Mutex<NodeState>>,
}

impl SimNodeDriver {
    /// Create a configured, healthy driver named `name`.
    pub fn new(name: &'static str, journal: Journal) -> (Self, SimNodeHandle) {
        let state = Arc::new(Mutex::new(NodeState { configured: true, ..Default::default() }));
        let handle = SimNodeHandle { name, journal, state: Arc::clone(&state) };
        (Self { name, state }, handle)
    }
}

impl SimNodeHandle {
    /// Driver name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mark the driver as (un)configured.
    pub fn set_configured(&self, configured: bool) {
        lock(&self.state).configured = configured;
    }

    /// Make `probe` fail.
    pub fn fail_probe(&self, reason: &str) {
        lock(&self.state).probe_error = Some(reason.to_string());
    }

    /// Make `listen` fail.
    pub fn fail_listen(&self, kind: io::ErrorKind) {
        lock(&self.state).listen_error = Some(kind);
    }

    /// Queue an accept failure.
    pub fn fail_next_accept(&self, kind: io::ErrorKind) {
        lock(&self.state).accept_errors.push_back(kind);
    }

    /// Queue a device connection for the next accept and return its handle.
    pub fn push_device(&self) -> SimStreamHandle {
        let tag = self.journal.next_tag(StreamKind::Device);
        let (stream, handle) = SimStream::new(tag, self.journal.clone());
        let mut state = lock(&self.state);
        state.pending.push_back(stream);
        state.devices.push(handle.clone());
        handle
    }

    /// Handles of every device pushed so far, in push order.
    pub fn devices(&self) -> Vec<SimStreamHandle> {
        lock(&self.state).devices.clone()
    }

    /// Number of `probe` calls.
    pub fn probes(&self) -> u32 {
        lock(&self.state).probes
    }

    /// Number of `listen` calls.
    pub fn listens(&self) -> u32 {
        lock(&self.state).listens
    }

    /// Number of successful accepts.
    pub fn accepted(&self) -> u32 {
        lock(&self.state).accepted
    }

    /// Number of `remove` calls.
    pub fn removes(&self) -> u32 {
        lock(&self.state).removes
    }
}

impl NodeDriver for SimNodeDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_configured(&self) -> bool {
        lock(&self.state).configured
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        state.probes += 1;
        match &state.probe_error {
            Some(reason) => Err(DriverError::Unavailable { driver: self.name, reason: reason.clone() }),
            None => Ok(()),
        }
    }

    fn listen(&mut self) -> Result<Listener, DriverError> {
        let mut state = lock(&self.state);
        state.listens += 1;
        if let Some(kind) = state.listen_error {
            tracing::debug!(driver = self.name, ?kind, "scripted listen failure");
            return Err(io::Error::from(kind).into());
        }
        tracing::debug!(driver = self.name, "sim node listening");
        Ok(Listener::new(SimAcceptor { name: self.name, state: Arc::clone(&self.state) }))
    }

    fn remove(&mut self) {
        lock(&self.state).removes += 1;
    }
}

struct SimAcceptor {
    name: &'static str,
    state: Arc<Mutex<NodeState>>,
}

impl Acceptor for SimAcceptor {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn accept(&mut self) -> io::Result<Channel> {
        let mut state = lock(&self.state);
        if let Some(kind) = state.accept_errors.pop_front() {
            tracing::debug!(driver = self.name, ?kind, "scripted accept failure");
            return Err(io::Error::from(kind));
        }
        let stream = state.pending.pop_front().ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        state.accepted += 1;
        tracing::trace!(driver = self.name, tag = ?stream.tag(), "sim device accepted");
        Ok(Channel::new(self.name, stream))
    }
}

#[derive(Debug, Default)]
struct ProtocolState {
    probe_error: Option<String>,
    connect_errors: VecDeque<io::ErrorKind>,
    backends: Vec<SimStreamHandle>,
    probes: u32,
    connects: u32,
    closes: u32,
    removes: u32,
}

/// Simulated protocol driver. Every successful `connect` creates a new
/// journaled backend stream.
#[derive(Debug)]
pub struct SimProtocolDriver {
    name: &'static str,
    journal: Journal,
    state: Arc<Mutex<ProtocolState>>,
}

/// Test-side handle to a [`SimProtocolDriver`].
#[derive(Debug, Clone)]
pub struct SimProtocolHandle {
    state: Arc<Mutex<ProtocolState>>,
}

impl SimProtocolDriver {
    /// Create a healthy driver named `name`.
    pub fn new(name: &'static str, journal: Journal) -> (Self, SimProtocolHandle) {
        let state = Arc::new(Mutex::new(ProtocolState::default()));
        let handle = SimProtocolHandle { state: Arc::clone(&state) };
        (Self { name, journal, state }, handle)
    }
}

impl SimProtocolHandle {
    /// Make `probe` fail.
    pub fn fail_probe(&self, reason: &str) {
        lock(&self.state).probe_error = Some(reason.to_string());
    }

    /// Queue a connect failure.
    pub fn fail_next_connect(&self, kind: io::ErrorKind) {
        lock(&self.state).connect_errors.push_back(kind);
    }

    /// Handles of every backend stream opened so far, in connect order.
    pub fn backends(&self) -> Vec<SimStreamHandle> {
        lock(&self.state).backends.clone()
    }

    /// Number of `probe` calls.
    pub fn probes(&self) -> u32 {
        lock(&self.state).probes
    }

    /// Number of successful connects.
    pub fn connects(&self) -> u32 {
        lock(&self.state).connects
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    /// Number of `remove` calls.
    pub fn removes(&self) -> u32 {
        lock(&self.state).removes
    }
}

impl ProtocolDriver for SimProtocolDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        state.probes += 1;
        match &state.probe_error {
            Some(reason) => Err(DriverError::Unavailable { driver: self.name, reason: reason.clone() }),
            None => Ok(()),
        }
    }

    fn connect(&mut self) -> Result<Channel, DriverError> {
        let mut state = lock(&self.state);
        if let Some(kind) = state.connect_errors.pop_front() {
            tracing::debug!(driver = self.name, ?kind, "scripted connect failure");
            return Err(io::Error::from(kind).into());
        }

        let tag = self.journal.next_tag(StreamKind::Backend);
        let (stream, handle) = SimStream::new(tag, self.journal.clone());
        state.backends.push(handle);
        state.connects += 1;
        Ok(Channel::new(self.name, stream))
    }

    fn close(&mut self, _channel: &mut Channel) {
        lock(&self.state).closes += 1;
    }

    fn remove(&mut self) {
        lock(&self.state).removes += 1;
    }
}
