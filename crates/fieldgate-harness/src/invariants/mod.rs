//! Invariant checking for simulated gateways.
//!
//! Invariants are properties that must hold after every dispatch pass,
//! whatever the sequence of accepts, reads and faults. The harness extracts a
//! [`GatewaySnapshot`] from a [`SimGateway`](crate::SimGateway) and runs the
//! registered [`Invariant`] checks against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&gateway.snapshot(), "after hangup");
//! ```

mod checks;
mod snapshot;

pub use checks::{BalancedSessions, ChannelRelease, SingleTeardown, WatchAccounting};
pub use snapshot::{ClosedSession, GatewaySnapshot, SessionSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against gateway state.
pub trait Invariant {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &GatewaySnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard gateway invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(WatchAccounting);
        registry.add(BalancedSessions);
        registry.add(SingleTeardown);
        registry.add(ChannelRelease);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    pub fn check_all(&self, state: &GatewaySnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    #[allow(clippy::panic, reason = "Test assertion helper")]
    pub fn assert_all(&self, state: &GatewaySnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use fieldgate_core::ManagerStats;

    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn empty_snapshot_passes() {
        assert!(InvariantRegistry::standard().check_all(&GatewaySnapshot::default()).is_ok());
    }

    #[test]
    fn leaked_watch_is_reported() {
        let snapshot = GatewaySnapshot { watch_count: 1, ..Default::default() };
        let violations = InvariantRegistry::standard().check_all(&snapshot).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "WatchAccounting");
    }

    #[test]
    fn double_notifier_is_reported() {
        let stats = ManagerStats {
            sessions_opened: 1,
            sessions_closed: 1,
            device_teardowns: 2,
            backend_teardowns: 1,
            ..Default::default()
        };
        let snapshot = GatewaySnapshot { stats, ..Default::default() };
        let err = SingleTeardown.check(&snapshot).unwrap_err();
        assert!(err.message.contains("2 device"));
    }
}
