//! Session manager.
//!
//! Ties together driver selection, listener setup, the accept handler, the
//! per-session I/O callbacks and the teardown cascade. Everything runs on one
//! thread: [`SessionManager::poll_once`] asks the [`Poller`] for readiness and
//! dispatches each report to its callback, which runs to completion.
//!
//! # Teardown
//!
//! Every watch removal goes through one place, and each removal runs exactly
//! one destroy notifier for the removed watch. The notifiers of the two sides
//! of a session share one routine:
//!
//! 1. take the opposite channel and the opposite watch id out of the session;
//! 2. if the opposite watch was still registered, shut the opposite channel
//!    down;
//! 3. release the opposite channel;
//! 4. remove the opposite watch, running its notifier synchronously;
//! 5. on the backend side only, reclaim the session.
//!
//! Because each channel is released by the notifier of the other side before
//! the cascade continues, the backend notifier always reclaims a session whose
//! channels are both gone, whichever side faulted first and even when both
//! sides fault in the same pass.

use std::{
    fmt,
    ops::ControlFlow,
    os::fd::BorrowedFd,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::{
    channel::Channel,
    credential::Credential,
    driver::{DriverRegistry, Listener, NodeDriver, ProtocolDriver},
    error::GatewayError,
    processor::MessageProcessor,
    reactor::{Condition, PollRequest, Poller, Reactor, Readiness, WatchId, WatchTarget},
    session::{Session, SessionId, SessionRegistry, SessionState, Side},
};

/// Conditions watched on listening handles.
pub const LISTENER_INTEREST: Condition = Condition::READABLE.union(Condition::FAULT);

/// Conditions watched on device channels.
pub const DEVICE_INTEREST: Condition = LISTENER_INTEREST;

/// Conditions watched on backend channels. Backend replies are synchronous
/// responses to device requests, so readability is not watched.
pub const BACKEND_INTEREST: Condition = Condition::FAULT;

/// Default receive/reply buffer size in bytes.
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Default protocol when none is requested.
pub const DEFAULT_PROTOCOL: &str = "ws";

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Name of the protocol driver to select
    pub protocol: String,
    /// Node driver allow-list (case-insensitive). `None` enables all.
    pub transports: Option<Vec<String>>,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Receive and reply buffer size
    pub frame_size: usize,
    /// Upper bound on one poll wait in [`SessionManager::run`]
    pub poll_interval: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            transports: None,
            max_sessions: 1024,
            frame_size: DEFAULT_FRAME_SIZE,
            poll_interval: Some(Duration::from_millis(500)),
        }
    }
}

/// Counters maintained by the session manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Sessions created
    pub sessions_opened: u64,
    /// Sessions reclaimed
    pub sessions_closed: u64,
    /// Device connections dropped at accept (limit reached, backend down)
    pub sessions_rejected: u64,
    /// Replies sent back to devices
    pub frames_relayed: u64,
    /// Device receive failures
    pub recv_errors: u64,
    /// Message processing failures
    pub process_errors: u64,
    /// Device send failures
    pub send_errors: u64,
    /// Device-side destroy notifier runs
    pub device_teardowns: u64,
    /// Backend-side destroy notifier runs
    pub backend_teardowns: u64,
}

/// An activated node driver and its listener.
struct NodeSlot {
    driver: Box<dyn NodeDriver>,
    listener: Option<Listener>,
    watch: Option<WatchId>,
}

/// Single-threaded gateway core.
pub struct SessionManager<P, M>
where
    P: Poller,
    M: MessageProcessor,
{
    /// Owner credential, read-only after startup
    credential: Credential,
    /// The one active protocol driver
    protocol: Box<dyn ProtocolDriver>,
    /// Node drivers that are listening, in registry order
    nodes: Vec<NodeSlot>,
    /// Listener watches in activation order
    listener_watches: Vec<WatchId>,
    /// Live sessions
    sessions: SessionRegistry,
    /// Watch registrations
    reactor: Reactor,
    /// Readiness source
    poller: P,
    /// Message processing collaborator
    processor: M,
    config: ManagerConfig,
    stats: ManagerStats,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    stopped: bool,
}

impl<P, M> SessionManager<P, M>
where
    P: Poller,
    M: MessageProcessor,
{
    /// Select drivers and start listening.
    ///
    /// Fails if no protocol driver matches `config.protocol` or if it is
    /// unavailable; no listener is registered in that case. Node drivers that
    /// fail to probe or listen are skipped.
    pub fn start(
        config: ManagerConfig,
        credential: Credential,
        drivers: DriverRegistry,
        processor: M,
        poller: P,
    ) -> Result<Self, GatewayError> {
        let (protocols, candidates) = drivers.into_parts();
        let protocol = select_protocol(protocols, &config.protocol)?;

        let frame_size = config.frame_size;
        let mut manager = Self {
            credential,
            protocol,
            nodes: Vec::new(),
            listener_watches: Vec::new(),
            sessions: SessionRegistry::new(),
            reactor: Reactor::new(),
            poller,
            processor,
            config,
            stats: ManagerStats::default(),
            inbound: vec![0; frame_size],
            outbound: vec![0; frame_size],
            stopped: false,
        };

        for driver in candidates {
            manager.activate_node(driver);
        }

        if manager.nodes.is_empty() {
            tracing::warn!("no node driver is listening");
        }

        Ok(manager)
    }

    /// Probe a node driver and register its listener.
    fn activate_node(&mut self, mut driver: Box<dyn NodeDriver>) {
        let name = driver.name();

        if !driver.is_configured() {
            tracing::debug!(driver = name, "not configured, skipping");
            return;
        }

        if let Some(allowed) = &self.config.transports {
            if !allowed.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                tracing::debug!(driver = name, "disabled by configuration");
                return;
            }
        }

        if let Err(e) = driver.probe() {
            tracing::warn!(driver = name, error = %e, "probe failed");
            return;
        }

        let listener = match driver.listen() {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(driver = name, error = %e, "listen failed");
                driver.remove();
                return;
            },
        };

        let index = self.nodes.len();
        let watch = self.reactor.add(WatchTarget::Listener(index), LISTENER_INTEREST);
        self.nodes.push(NodeSlot { driver, listener: Some(listener), watch: Some(watch) });
        self.listener_watches.push(watch);

        tracing::info!(driver = name, %watch, "node driver listening");
    }

    /// Run until `stop` is set, then shut down.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), GatewayError> {
        tracing::info!(protocol = self.protocol.name(), nodes = self.nodes.len(), "event loop running");

        while !stop.load(Ordering::Relaxed) {
            self.poll_once(self.config.poll_interval)?;
        }

        tracing::info!("stop requested");
        self.shutdown();
        Ok(())
    }

    /// Wait for readiness once and dispatch it. Returns the number of
    /// readiness reports received.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize, GatewayError> {
        let ready = {
            let requests = poll_requests(&self.reactor, &self.nodes, &self.sessions);
            self.poller.poll(&requests, timeout)?
        };

        let count = ready.len();
        self.dispatch(ready);
        Ok(count)
    }

    /// Run callbacks for a batch of readiness reports.
    ///
    /// Reports for watches removed earlier in the same batch are skipped.
    pub fn dispatch(&mut self, ready: impl IntoIterator<Item = Readiness>) {
        for Readiness { watch, condition } in ready {
            let Some(entry) = self.reactor.get(watch).copied() else {
                tracing::trace!(%watch, "readiness for removed watch");
                continue;
            };

            let condition = condition.intersection(entry.interest | Condition::FAULT);
            if condition.is_empty() {
                continue;
            }

            let flow = match entry.target {
                WatchTarget::Listener(index) => self.on_listener_ready(index, condition),
                WatchTarget::Device(id) => self.on_device_ready(id, condition),
                WatchTarget::Backend(id) => self.on_backend_ready(id, condition),
            };

            if flow.is_break() {
                self.remove_watch(watch);
            }
        }
    }

    /// Accept handler.
    fn on_listener_ready(&mut self, index: usize, condition: Condition) -> ControlFlow<()> {
        let Some(slot) = self.nodes.get_mut(index) else {
            return ControlFlow::Break(());
        };
        let name = slot.driver.name();

        if condition.is_fault() {
            tracing::error!(driver = name, ?condition, "listener fault");
            return ControlFlow::Break(());
        }

        let Some(listener) = slot.listener.as_mut() else {
            return ControlFlow::Break(());
        };

        let mut device = match slot.driver.accept(listener) {
            Ok(channel) => channel,
            Err(e) if e.is_transient() => {
                tracing::debug!(driver = name, error = %e, "accept would block");
                return ControlFlow::Continue(());
            },
            Err(e) => {
                tracing::error!(driver = name, error = %e, "accept failed");
                return ControlFlow::Continue(());
            },
        };

        if self.sessions.len() >= self.config.max_sessions {
            tracing::warn!(
                driver = name,
                max_sessions = self.config.max_sessions,
                "session limit reached, dropping device"
            );
            device.shutdown();
            self.stats.sessions_rejected += 1;
            return ControlFlow::Continue(());
        }

        let backend = match self.protocol.connect() {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(
                    driver = name,
                    protocol = self.protocol.name(),
                    error = %e,
                    "backend connect failed, dropping device"
                );
                device.shutdown();
                self.stats.sessions_rejected += 1;
                return ControlFlow::Continue(());
            },
        };

        let reactor = &mut self.reactor;
        let id = self.sessions.insert_with(|id| {
            let mut session = Session::new(index, device, backend);
            session.device_watch = Some(reactor.add(WatchTarget::Device(id), DEVICE_INTEREST));
            session.backend_watch = Some(reactor.add(WatchTarget::Backend(id), BACKEND_INTEREST));
            session
        });
        self.stats.sessions_opened += 1;

        tracing::info!(session = %id, driver = name, "session opened");

        ControlFlow::Continue(())
    }

    /// Device-side callback: relay one frame or start teardown.
    ///
    /// A readable channel that yields zero bytes has reached end of stream
    /// and is torn down like a hangup.
    fn on_device_ready(&mut self, id: SessionId, condition: Condition) -> ControlFlow<()> {
        let Some(session) = self.sessions.get_mut(id) else {
            return ControlFlow::Break(());
        };

        if condition.is_fault() {
            tracing::debug!(session = %id, ?condition, "device channel fault");
            return ControlFlow::Break(());
        }

        let (Some(device), Some(backend), Some(slot)) =
            (session.device.as_mut(), session.backend.as_mut(), self.nodes.get_mut(session.node))
        else {
            return ControlFlow::Break(());
        };

        let received = match slot.driver.recv(device, &mut self.inbound) {
            Ok(0) => {
                tracing::debug!(session = %id, "device closed its end of the stream");
                return ControlFlow::Break(());
            },
            Ok(n) => n,
            Err(e) => {
                self.stats.recv_errors += 1;
                tracing::warn!(session = %id, error = %e, "device recv failed");
                return ControlFlow::Continue(());
            },
        };

        let reply_len = match self.processor.process(
            &self.credential,
            backend,
            self.protocol.as_mut(),
            &self.inbound[..received],
            &mut self.outbound,
        ) {
            Ok(len) if len <= self.outbound.len() => len,
            Ok(len) => {
                self.stats.process_errors += 1;
                tracing::warn!(session = %id, len, "processor reported oversized reply");
                return ControlFlow::Continue(());
            },
            Err(e) => {
                self.stats.process_errors += 1;
                tracing::warn!(session = %id, error = %e, "message processing failed");
                return ControlFlow::Continue(());
            },
        };

        match slot.driver.send(device, &self.outbound[..reply_len]) {
            Ok(sent) => {
                self.stats.frames_relayed += 1;
                tracing::trace!(session = %id, received, sent, "frame relayed");
            },
            Err(e) => {
                self.stats.send_errors += 1;
                tracing::warn!(session = %id, error = %e, "device send failed");
            },
        }

        ControlFlow::Continue(())
    }

    /// Backend-side callback: only faults are watched.
    fn on_backend_ready(&mut self, id: SessionId, condition: Condition) -> ControlFlow<()> {
        if !self.sessions.contains(id) {
            return ControlFlow::Break(());
        }

        if condition.is_fault() {
            tracing::debug!(session = %id, ?condition, "backend channel fault");
            return ControlFlow::Break(());
        }

        ControlFlow::Continue(())
    }

    /// Remove a watch and run its destroy notifier. Returns false if the
    /// watch was already gone.
    fn remove_watch(&mut self, watch: WatchId) -> bool {
        let Some(entry) = self.reactor.remove(watch) else {
            return false;
        };

        match entry.target {
            WatchTarget::Listener(index) => self.listener_destroyed(index, watch),
            WatchTarget::Device(id) => self.teardown(id, Side::Device),
            WatchTarget::Backend(id) => self.teardown(id, Side::Backend),
        }
        true
    }

    /// Destroy notifier for listener watches.
    fn listener_destroyed(&mut self, index: usize, watch: WatchId) {
        self.listener_watches.retain(|w| *w != watch);

        if let Some(slot) = self.nodes.get_mut(index) {
            slot.watch = None;
            slot.listener = None;
            tracing::info!(driver = slot.driver.name(), %watch, "listener removed");
        }
    }

    /// Destroy notifier shared by both sides of a session. `side` is the side
    /// whose watch was just removed.
    fn teardown(&mut self, id: SessionId, side: Side) {
        let Some(session) = self.sessions.get_mut(id) else {
            tracing::debug!(session = %id, %side, "teardown for reclaimed session");
            return;
        };

        session.closing = true;
        let peer = side.opposite();
        let (peer_channel, peer_watch) = match side {
            Side::Device => {
                session.device_watch = None;
                self.stats.device_teardowns += 1;
                (session.backend.take(), session.backend_watch.take())
            },
            Side::Backend => {
                session.backend_watch = None;
                self.stats.backend_teardowns += 1;
                (session.device.take(), session.device_watch.take())
            },
        };

        if let Some(mut channel) = peer_channel {
            if peer_watch.is_some() {
                channel.shutdown();
            }
            self.release(id, peer, channel);
        }

        if let Some(watch) = peer_watch {
            self.remove_watch(watch);
        }

        if side == Side::Backend {
            self.reclaim(id);
        }
    }

    /// Drop a channel, giving the protocol driver its close hook first.
    fn release(&mut self, id: SessionId, side: Side, mut channel: Channel) {
        if side == Side::Backend {
            self.protocol.close(&mut channel);
        }
        tracing::debug!(session = %id, %side, channel = channel.label(), "channel released");
        drop(channel);
    }

    /// Remove a session from the registry. Only the backend notifier calls
    /// this, after both channels are released.
    fn reclaim(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };

        debug_assert!(
            session.device.is_none() && session.backend.is_none(),
            "session reclaimed while holding a channel"
        );
        debug_assert!(session.device_watch.is_none() && session.backend_watch.is_none());

        self.stats.sessions_closed += 1;
        tracing::info!(session = %id, "session closed");
    }

    /// Close one live session by removing its device watch; the cascade
    /// releases both channels and reclaims it. Returns false if the session
    /// is not live.
    pub fn close_session(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.get(id) else {
            return false;
        };

        match session.device_watch.or(session.backend_watch) {
            Some(watch) => self.remove_watch(watch),
            None => false,
        }
    }

    /// Stop everything: close live sessions, remove listener watches, release
    /// node drivers, then the protocol driver. Idempotent.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for id in self.sessions.ids() {
            self.close_session(id);
        }

        for watch in std::mem::take(&mut self.listener_watches) {
            self.remove_watch(watch);
            tracing::info!(%watch, "removed listener watch");
        }

        for slot in &mut self.nodes {
            slot.listener = None;
            slot.driver.remove();
            tracing::debug!(driver = slot.driver.name(), "node driver removed");
        }

        self.protocol.remove();
        tracing::info!(protocol = self.protocol.name(), "gateway stopped");
    }

    /// Whether [`SessionManager::shutdown`] has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Lifecycle state of a session.
    pub fn session_state(&self, id: SessionId) -> SessionState {
        self.sessions.state(id)
    }

    /// Live session by id.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Ids of all live sessions, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.ids()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Listener watch ids in activation order.
    pub fn listener_watches(&self) -> &[WatchId] {
        &self.listener_watches
    }

    /// Names of node drivers that are listening.
    pub fn active_nodes(&self) -> Vec<&'static str> {
        self.nodes.iter().filter(|n| n.watch.is_some()).map(|n| n.driver.name()).collect()
    }

    /// Name of the active protocol driver.
    pub fn protocol_name(&self) -> &'static str {
        self.protocol.name()
    }

    /// Number of live watch registrations.
    pub fn watch_count(&self) -> usize {
        self.reactor.len()
    }

    /// Whether a watch is still registered.
    pub fn is_watching(&self, watch: WatchId) -> bool {
        self.reactor.contains(watch)
    }

    /// Counters.
    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    /// Owner credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The poller, for harnesses that script readiness.
    pub fn poller_mut(&mut self) -> &mut P {
        &mut self.poller
    }
}

impl<P, M> Drop for SessionManager<P, M>
where
    P: Poller,
    M: MessageProcessor,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<P, M> fmt::Debug for SessionManager<P, M>
where
    P: Poller,
    M: MessageProcessor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("protocol", &self.protocol.name())
            .field("active_nodes", &self.active_nodes())
            .field("session_count", &self.sessions.len())
            .field("watch_count", &self.reactor.len())
            .finish()
    }
}

/// Pick the protocol driver named `name` and probe it.
fn select_protocol(
    protocols: Vec<Box<dyn ProtocolDriver>>,
    name: &str,
) -> Result<Box<dyn ProtocolDriver>, GatewayError> {
    let mut driver = protocols
        .into_iter()
        .find(|d| d.name() == name)
        .ok_or_else(|| GatewayError::NoSuchProtocol(name.to_string()))?;

    if let Err(source) = driver.probe() {
        return Err(GatewayError::ProtocolUnavailable { name: driver.name(), source });
    }

    tracing::info!(protocol = driver.name(), "protocol driver selected");
    Ok(driver)
}

/// Build one poll request per live watch.
fn poll_requests<'a>(
    reactor: &Reactor,
    nodes: &'a [NodeSlot],
    sessions: &'a SessionRegistry,
) -> Vec<PollRequest<'a>> {
    reactor
        .iter()
        .map(|(watch, entry)| {
            let fd: Option<BorrowedFd<'a>> = match entry.target {
                WatchTarget::Listener(index) => {
                    nodes.get(index).and_then(|n| n.listener.as_ref()).and_then(Listener::poll_fd)
                },
                WatchTarget::Device(id) => {
                    sessions.get(id).and_then(|s| s.device.as_ref()).and_then(Channel::poll_fd)
                },
                WatchTarget::Backend(id) => {
                    sessions.get(id).and_then(|s| s.backend.as_ref()).and_then(Channel::poll_fd)
                },
            };
            PollRequest { watch, fd, interest: entry.interest }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{io, os::unix::net::UnixStream};

    use super::*;
    use crate::{driver::DriverError, processor::ProcessError};

    struct IdlePoller;

    impl Poller for IdlePoller {
        fn poll(
            &mut self,
            _requests: &[PollRequest<'_>],
            _timeout: Option<Duration>,
        ) -> io::Result<Vec<Readiness>> {
            Ok(Vec::new())
        }
    }

    struct PairProtocol {
        name: &'static str,
        available: bool,
    }

    impl ProtocolDriver for PairProtocol {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&mut self) -> Result<(), DriverError> {
            if self.available {
                Ok(())
            } else {
                Err(DriverError::Unavailable { driver: self.name, reason: "offline".to_string() })
            }
        }

        fn connect(&mut self) -> Result<Channel, DriverError> {
            let (local, _) = UnixStream::pair()?;
            Ok(Channel::new("pair", local))
        }
    }

    fn echo(
        _credential: &Credential,
        _backend: &mut Channel,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ProcessError> {
        output[..input.len()].copy_from_slice(input);
        Ok(input.len())
    }

    fn credential() -> Credential {
        Credential::new("0123456789abcdef0123456789abcdef", "0123456789abcdef").unwrap()
    }

    #[test]
    fn interest_sets() {
        assert!(DEVICE_INTEREST.contains(Condition::READABLE | Condition::FAULT));
        assert!(!BACKEND_INTEREST.contains(Condition::READABLE));
        assert!(BACKEND_INTEREST.contains(Condition::HANGUP | Condition::ERROR | Condition::INVALID));
    }

    #[test]
    fn unknown_protocol_fails_startup() {
        let registry =
            DriverRegistry::new().with_protocol(PairProtocol { name: "http", available: true });
        let config = ManagerConfig { protocol: "coap".to_string(), ..Default::default() };

        let result = SessionManager::start(config, credential(), registry, echo, IdlePoller);
        assert!(matches!(result, Err(GatewayError::NoSuchProtocol(name)) if name == "coap"));
    }

    #[test]
    fn unavailable_protocol_fails_startup() {
        let registry =
            DriverRegistry::new().with_protocol(PairProtocol { name: "ws", available: false });

        let result =
            SessionManager::start(ManagerConfig::default(), credential(), registry, echo, IdlePoller);
        assert!(matches!(result, Err(GatewayError::ProtocolUnavailable { name: "ws", .. })));
    }

    #[test]
    fn starts_without_node_drivers() {
        let registry =
            DriverRegistry::new().with_protocol(PairProtocol { name: "ws", available: true });

        let mut manager =
            SessionManager::start(ManagerConfig::default(), credential(), registry, echo, IdlePoller)
                .unwrap();

        assert_eq!(manager.protocol_name(), "ws");
        assert!(manager.active_nodes().is_empty());
        assert_eq!(manager.poll_once(Some(Duration::ZERO)).unwrap(), 0);

        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_stopped());
    }

    #[test]
    fn run_returns_when_stop_is_set() {
        let registry =
            DriverRegistry::new().with_protocol(PairProtocol { name: "ws", available: true });
        let mut manager =
            SessionManager::start(ManagerConfig::default(), credential(), registry, echo, IdlePoller)
                .unwrap();

        let stop = AtomicBool::new(true);
        manager.run(&stop).unwrap();
        assert!(manager.is_stopped());
    }
}
