//! Session teardown tests
//!
//! Both sides of a session can fault in any order, alone or together. In
//! every case each destroy notifier runs once, both channels are released,
//! and the backend-side notifier reclaims the session.

use fieldgate_core::{Condition, ManagerConfig, SessionState, Side};
use fieldgate_harness::{InvariantRegistry, SimGateway, SimSetup, StreamEvent};

fn gateway() -> SimGateway {
    SimSetup::with(&["Unix"], "ws").start(ManagerConfig::default()).unwrap()
}

#[test]
fn backend_hangup_closes_device() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    let backend = gw.backend(id).unwrap();
    let device_watch = gw.watch(id, Side::Device).unwrap();

    assert!(gw.fault(id, Side::Backend, Condition::HANGUP));

    // Device watch removed, device shut down and released, session reclaimed
    assert!(!gw.manager().is_watching(device_watch));
    assert!(device.is_shut_down());
    assert!(device.is_released());
    assert!(backend.is_released());
    assert_eq!(gw.manager().session_state(id), SessionState::Closed);

    // The faulted side is released without a shutdown
    assert!(!backend.is_shut_down());

    // The device is never read again, even if readiness for it was queued
    device.push_inbound(b"late");
    gw.deliver(device_watch, Condition::READABLE);
    assert!(!gw.journal().events_for(device.tag()).iter().any(|e| matches!(e, StreamEvent::Read(..))));

    InvariantRegistry::standard().assert_all(&gw.snapshot(), "after backend hangup");
}

#[test]
fn device_error_is_reclaimed_by_backend_notifier() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    let backend = gw.backend(id).unwrap();
    let backend_watch = gw.watch(id, Side::Backend).unwrap();

    assert!(gw.fault(id, Side::Device, Condition::ERROR));

    assert!(!gw.manager().is_watching(backend_watch));
    assert!(backend.is_shut_down());
    assert!(backend.is_released());
    assert!(device.is_released());
    assert_eq!(gw.manager().session_count(), 0);

    let stats = gw.manager().stats();
    assert_eq!(stats.device_teardowns, 1);
    assert_eq!(stats.backend_teardowns, 1);
    assert_eq!(stats.sessions_closed, 1);

    // Backend released through the protocol driver's close hook
    assert_eq!(gw.protocol().unwrap().closes(), 1);
}

#[test]
fn channels_released_before_reclaim() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    let backend = gw.backend(id).unwrap();

    gw.fault(id, Side::Device, Condition::HANGUP);

    // Backend (the peer of the faulting side) goes first: shut down, then released
    let journal = gw.journal();
    let backend_shutdown = journal.position(&StreamEvent::ShutDown(backend.tag())).unwrap();
    let backend_released = journal.position(&StreamEvent::Released(backend.tag())).unwrap();
    let device_released = journal.position(&StreamEvent::Released(device.tag())).unwrap();
    assert!(backend_shutdown < backend_released);
    assert!(backend_released < device_released);

    assert_eq!(journal.release_count(device.tag()), 1);
    assert_eq!(journal.release_count(backend.tag()), 1);
}

#[test]
fn both_sides_fault_in_one_pass() {
    for first in [Side::Device, Side::Backend] {
        let mut gw = gateway();
        let id = gw.connect_device("Unix").unwrap();
        let device = gw.device(id).unwrap();
        let backend = gw.backend(id).unwrap();

        assert!(gw.fault_both(id, first, Condition::HANGUP));

        let stats = gw.manager().stats();
        assert_eq!(stats.device_teardowns, 1, "first = {first}");
        assert_eq!(stats.backend_teardowns, 1, "first = {first}");
        assert_eq!(stats.sessions_closed, 1, "first = {first}");
        assert_eq!(gw.journal().release_count(device.tag()), 1);
        assert_eq!(gw.journal().release_count(backend.tag()), 1);

        InvariantRegistry::standard().assert_all(&gw.snapshot(), "after double fault");
    }
}

#[test]
fn both_sides_fault_through_the_poller() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device_watch = gw.watch(id, Side::Device).unwrap();
    let backend_watch = gw.watch(id, Side::Backend).unwrap();

    let batch = vec![
        fieldgate_core::Readiness::new(backend_watch, Condition::ERROR),
        fieldgate_core::Readiness::new(device_watch, Condition::READABLE | Condition::HANGUP),
    ];
    assert_eq!(gw.step(batch).unwrap(), 2);

    assert_eq!(gw.manager().stats().sessions_closed, 1);
    assert_eq!(gw.manager().watch_count(), 1);
}

#[test]
fn readable_hangup_is_a_fault() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    device.push_inbound(b"unread");

    gw.fault(id, Side::Device, Condition::READABLE | Condition::HANGUP);

    assert_eq!(gw.manager().session_state(id), SessionState::Closed);
    assert!(gw.processor().inputs().is_empty());
}

#[test]
fn device_end_of_stream_tears_down_session() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    let backend = gw.backend(id).unwrap();

    // Half-close: readable, no hangup, and the read returns zero bytes
    device.close_peer();
    assert!(gw.fault(id, Side::Device, Condition::READABLE));

    assert_eq!(gw.manager().session_state(id), SessionState::Closed);
    assert!(device.is_released());
    assert!(backend.is_released());
    assert!(backend.is_shut_down());
    assert!(gw.processor().inputs().is_empty());

    let stats = gw.manager().stats();
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.recv_errors, 0);

    InvariantRegistry::standard().assert_all(&gw.snapshot(), "after device end of stream");
}

#[test]
fn other_sessions_survive_teardown() {
    let mut gw = gateway();
    let a = gw.connect_device("Unix").unwrap();
    let b = gw.connect_device("Unix").unwrap();

    gw.fault(a, Side::Backend, Condition::HANGUP);

    assert_eq!(gw.manager().session_state(a), SessionState::Closed);
    assert_eq!(gw.manager().session_state(b), SessionState::Active);
    assert!(!gw.device(b).unwrap().is_released());

    InvariantRegistry::standard().assert_all(&gw.snapshot(), "after partial teardown");
}

#[test]
fn shutdown_force_closes_sessions() {
    let mut gw = gateway();
    let a = gw.connect_device("Unix").unwrap();
    let b = gw.connect_device("Unix").unwrap();

    gw.shutdown();

    assert_eq!(gw.manager().session_count(), 0);
    assert_eq!(gw.manager().watch_count(), 0);
    for id in [a, b] {
        assert!(gw.device(id).unwrap().is_released());
        assert!(gw.backend(id).unwrap().is_released());
    }

    let stats = gw.manager().stats();
    assert_eq!(stats.sessions_closed, 2);
    assert_eq!(gw.node("Unix").unwrap().removes(), 1);
    assert_eq!(gw.protocol().unwrap().removes(), 1);

    // Idempotent
    gw.shutdown();
    assert_eq!(gw.node("Unix").unwrap().removes(), 1);
    assert_eq!(gw.protocol().unwrap().removes(), 1);
}

#[test]
fn close_session_runs_cascade() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();

    assert!(gw.manager_mut().close_session(id));
    assert!(!gw.manager_mut().close_session(id));

    assert_eq!(gw.manager().session_state(id), SessionState::Closed);
    InvariantRegistry::standard().assert_all(&gw.snapshot(), "after close_session");
}

#[test]
fn dropping_the_manager_releases_everything() {
    let mut gw = gateway();
    let id = gw.connect_device("Unix").unwrap();
    let device = gw.device(id).unwrap();
    let backend = gw.backend(id).unwrap();
    let node = gw.node("Unix").unwrap().clone();

    drop(gw);

    assert!(device.is_released());
    assert!(backend.is_released());
    assert_eq!(node.removes(), 1);
}
