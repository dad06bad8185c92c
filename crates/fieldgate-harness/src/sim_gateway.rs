//! Simulated gateway.
//!
//! `SimGateway` runs the real [`SessionManager`] over [`SimPoller`] and the
//! simulated drivers. Tests drive it explicitly: queue a device, deliver
//! listener readiness, deliver faults on either side of a session, and then
//! inspect the manager, the driver handles and the stream journal.
//!
//! The gateway also remembers which device and backend stream each session
//! was built from, so invariants can follow a session's channels after the
//! session itself has been reclaimed.

use std::collections::{BTreeMap, BTreeSet};

use fieldgate_core::{
    Condition, ConfigError, Credential, DriverRegistry, GatewayError, ManagerConfig, Readiness,
    SessionId, SessionManager, Side, WatchId,
};

use crate::{
    invariants::{ClosedSession, GatewaySnapshot, SessionSnapshot},
    journal::{Journal, StreamTag},
    processor::ScriptedProcessor,
    sim_driver::{SimNodeDriver, SimNodeHandle, SimProtocolDriver, SimProtocolHandle},
    sim_poller::SimPoller,
    sim_stream::SimStreamHandle,
};

/// 32-character UUID used by simulated gateways.
pub const TEST_UUID: &str = "0123456789abcdef0123456789abcdef";

/// 16-character token used by simulated gateways.
pub const TEST_TOKEN: &str = "fedcba9876543210";

/// Session manager as run by the harness.
pub type SimManager = SessionManager<SimPoller, ScriptedProcessor>;

/// Drivers and collaborators assembled before startup.
#[derive(Debug)]
pub struct SimSetup {
    journal: Journal,
    registry: DriverRegistry,
    nodes: Vec<SimNodeHandle>,
    protocols: Vec<(&'static str, SimProtocolHandle)>,
    processor: ScriptedProcessor,
}

impl Default for SimSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSetup {
    /// Empty setup with a processor that replies `ok`.
    pub fn new() -> Self {
        Self {
            journal: Journal::new(),
            registry: DriverRegistry::new(),
            nodes: Vec::new(),
            protocols: Vec::new(),
            processor: ScriptedProcessor::replying(b"ok"),
        }
    }

    /// Setup with one node driver per name and one protocol driver named
    /// `protocol`.
    pub fn with(nodes: &[&'static str], protocol: &'static str) -> Self {
        let mut setup = Self::new();
        for &name in nodes {
            setup.add_node(name);
        }
        setup.add_protocol(protocol);
        setup
    }

    /// Append a node driver.
    pub fn add_node(&mut self, name: &'static str) -> SimNodeHandle {
        let (driver, handle) = SimNodeDriver::new(name, self.journal.clone());
        self.registry = std::mem::take(&mut self.registry).with_node(driver);
        self.nodes.push(handle.clone());
        handle
    }

    /// Append a protocol driver.
    pub fn add_protocol(&mut self, name: &'static str) -> SimProtocolHandle {
        let (driver, handle) = SimProtocolDriver::new(name, self.journal.clone());
        self.registry = std::mem::take(&mut self.registry).with_protocol(driver);
        self.protocols.push((name, handle.clone()));
        handle
    }

    /// Node driver handle by name.
    ///
    /// # Panics
    ///
    /// Panics if no node driver has that name.
    #[allow(clippy::panic, reason = "Harness lookup by test-chosen name")]
    pub fn node(&self, name: &str) -> &SimNodeHandle {
        self.nodes
            .iter()
            .find(|n| n.name() == name)
            .unwrap_or_else(|| panic!("no simulated node driver named {name}"))
    }

    /// Protocol driver handle by name, if registered.
    pub fn protocol(&self, name: &str) -> Option<&SimProtocolHandle> {
        self.protocols.iter().find(|(n, _)| *n == name).map(|(_, h)| h)
    }

    /// Processor shared with the gateway.
    pub fn processor(&self) -> &ScriptedProcessor {
        &self.processor
    }

    /// Replace the processor.
    pub fn set_processor(&mut self, processor: ScriptedProcessor) {
        self.processor = processor;
    }

    /// Start the session manager with the test credential.
    pub fn start(self, config: ManagerConfig) -> Result<SimGateway, GatewayError> {
        let credential = Credential::new(TEST_UUID, TEST_TOKEN).map_err(ConfigError::from)?;
        self.start_with(config, credential)
    }

    /// Start the session manager with `credential`.
    pub fn start_with(
        self,
        config: ManagerConfig,
        credential: Credential,
    ) -> Result<SimGateway, GatewayError> {
        let protocol = self
            .protocols
            .iter()
            .find(|(name, _)| *name == config.protocol)
            .map(|(_, handle)| handle.clone());

        let manager = SessionManager::start(
            config,
            credential,
            self.registry,
            self.processor.clone(),
            SimPoller::new(),
        )?;

        Ok(SimGateway {
            manager,
            journal: self.journal,
            nodes: self.nodes,
            protocol,
            processor: self.processor,
            pairs: BTreeMap::new(),
        })
    }
}

/// Running simulated gateway.
#[derive(Debug)]
pub struct SimGateway {
    manager: SimManager,
    journal: Journal,
    nodes: Vec<SimNodeHandle>,
    protocol: Option<SimProtocolHandle>,
    processor: ScriptedProcessor,
    pairs: BTreeMap<SessionId, (StreamTag, StreamTag)>,
}

impl SimGateway {
    /// The session manager.
    pub fn manager(&self) -> &SimManager {
        &self.manager
    }

    /// The session manager, mutably.
    pub fn manager_mut(&mut self) -> &mut SimManager {
        &mut self.manager
    }

    /// Stream journal.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Node driver handle by name, if registered.
    pub fn node(&self, name: &str) -> Option<&SimNodeHandle> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Handle of the active protocol driver.
    pub fn protocol(&self) -> Option<&SimProtocolHandle> {
        self.protocol.as_ref()
    }

    /// Processor shared with the manager.
    pub fn processor(&self) -> &ScriptedProcessor {
        &self.processor
    }

    /// Deliver one batch of readiness and dispatch it.
    pub fn step(&mut self, batch: Vec<Readiness>) -> Result<usize, GatewayError> {
        self.manager.poller_mut().push_batch(batch);
        self.manager.poll_once(None)
    }

    /// Dispatch one readiness report directly, bypassing the poller.
    pub fn deliver(&mut self, watch: WatchId, condition: Condition) {
        self.manager.dispatch([Readiness::new(watch, condition)]);
    }

    /// Listener watch of the active node driver `name`.
    pub fn listener_watch(&self, name: &str) -> Option<WatchId> {
        let index = self.manager.active_nodes().iter().position(|n| *n == name)?;
        self.manager.listener_watches().get(index).copied()
    }

    /// Queue a device on node driver `name` and deliver listener readiness.
    /// Returns the new session, or `None` if the device was not accepted or
    /// was rejected.
    pub fn connect_device(&mut self, name: &str) -> Option<SessionId> {
        let node = self.node(name)?.clone();
        node.push_device();
        let watch = self.listener_watch(name)?;

        let before: BTreeSet<_> = self.manager.session_ids().into_iter().collect();
        self.deliver(watch, Condition::READABLE);

        let id = self.manager.session_ids().into_iter().find(|id| !before.contains(id))?;
        let accepted = node.accepted() as usize;
        let device = node.devices().get(accepted.checked_sub(1)?)?.tag();
        let backend = self.protocol.as_ref()?.backends().last()?.tag();
        self.pairs.insert(id, (device, backend));
        Some(id)
    }

    /// Watch id of one side of a live session.
    pub fn watch(&self, id: SessionId, side: Side) -> Option<WatchId> {
        self.manager.session(id)?.watch(side)
    }

    /// Deliver `READABLE` on the device side of `id`.
    pub fn device_readable(&mut self, id: SessionId) -> bool {
        match self.watch(id, Side::Device) {
            Some(watch) => {
                self.deliver(watch, Condition::READABLE);
                true
            },
            None => false,
        }
    }

    /// Deliver `condition` on one side of `id`.
    pub fn fault(&mut self, id: SessionId, side: Side, condition: Condition) -> bool {
        match self.watch(id, side) {
            Some(watch) => {
                self.deliver(watch, condition);
                true
            },
            None => false,
        }
    }

    /// Deliver faults on both sides of `id` in one dispatch pass, `first`
    /// side first.
    pub fn fault_both(&mut self, id: SessionId, first: Side, condition: Condition) -> bool {
        let (Some(a), Some(b)) = (self.watch(id, first), self.watch(id, first.opposite())) else {
            return false;
        };
        self.manager.dispatch([Readiness::new(a, condition), Readiness::new(b, condition)]);
        true
    }

    /// Device stream of a tracked session.
    pub fn device(&self, id: SessionId) -> Option<SimStreamHandle> {
        let (tag, _) = self.pairs.get(&id)?;
        self.nodes.iter().flat_map(SimNodeHandle::devices).find(|d| d.tag() == *tag)
    }

    /// Backend stream of a tracked session.
    pub fn backend(&self, id: SessionId) -> Option<SimStreamHandle> {
        let (_, tag) = self.pairs.get(&id)?;
        self.protocol.as_ref()?.backends().into_iter().find(|b| b.tag() == *tag)
    }

    /// Stream tags of every session created so far.
    pub fn pairs(&self) -> &BTreeMap<SessionId, (StreamTag, StreamTag)> {
        &self.pairs
    }

    /// Shut the manager down.
    pub fn shutdown(&mut self) {
        self.manager.shutdown();
    }

    /// Capture observable state for invariant checks.
    pub fn snapshot(&self) -> GatewaySnapshot {
        let mut sessions = Vec::new();
        let mut closed = Vec::new();

        for (&id, &(device, backend)) in &self.pairs {
            match self.manager.session(id) {
                Some(session) => sessions.push(SessionSnapshot {
                    id,
                    state: session.state(),
                    device_watch: session.watch(Side::Device),
                    backend_watch: session.watch(Side::Backend),
                    holds_device: session.holds_channel(Side::Device),
                    holds_backend: session.holds_channel(Side::Backend),
                    device,
                    backend,
                }),
                None => closed.push(ClosedSession { id, device, backend }),
            }
        }

        GatewaySnapshot {
            sessions,
            closed,
            live_sessions: self.manager.session_count(),
            listener_count: self.manager.listener_watches().len(),
            watch_count: self.manager.watch_count(),
            stats: self.manager.stats(),
            events: self.journal.events(),
        }
    }
}
