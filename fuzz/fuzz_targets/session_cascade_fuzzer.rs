//! Fuzz target for the session teardown cascade
//!
//! # Strategy
//!
//! - Operation sequences: connects, refused connects, frames, recv and
//!   processing failures, single-side and same-pass double faults
//! - Small session limit so rejection paths are exercised
//!
//! # Invariants
//!
//! - After every operation: watch accounting, balanced sessions, single
//!   teardown per side, channel release
//! - After shutdown: no sessions, no watches, every channel released once

#![no_main]

use fieldgate_harness::{InvariantRegistry, Operation, apply, chaos_gateway};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<Operation>| {
    let Ok(mut gateway) = chaos_gateway(4) else {
        return;
    };
    let invariants = InvariantRegistry::standard();

    for op in &ops {
        apply(&mut gateway, op);
        invariants.assert_all(&gateway.snapshot(), "during fuzz run");
    }

    gateway.shutdown();
    assert_eq!(gateway.manager().session_count(), 0);
    assert_eq!(gateway.manager().watch_count(), 0);
    for (device, backend) in gateway.pairs().values() {
        assert_eq!(gateway.journal().release_count(*device), 1);
        assert_eq!(gateway.journal().release_count(*backend), 1);
    }
});
