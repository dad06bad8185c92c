//! Standard invariant checks.
//!
//! These hold between any two dispatch passes, whatever sequence of accepts,
//! reads and faults preceded them.

use fieldgate_core::SessionState;

use super::{GatewaySnapshot, Invariant, InvariantResult, Violation};

/// Every registered watch belongs to a listener or a live session.
///
/// `watch_count == listeners + device watches + backend watches`. A leaked
/// watch would keep firing callbacks for a reclaimed session.
pub struct WatchAccounting;

impl Invariant for WatchAccounting {
    fn name(&self) -> &'static str {
        "WatchAccounting"
    }

    fn check(&self, state: &GatewaySnapshot) -> InvariantResult {
        let session_watches: usize = state
            .sessions
            .iter()
            .map(|s| usize::from(s.device_watch.is_some()) + usize::from(s.backend_watch.is_some()))
            .sum();
        let expected = state.listener_count + session_watches;

        if state.watch_count == expected {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} watches registered, {} listeners + {} session watches",
                    state.watch_count, state.listener_count, session_watches
                ),
            })
        }
    }
}

/// Every opened session is either live or was reclaimed exactly once.
pub struct BalancedSessions;

impl Invariant for BalancedSessions {
    fn name(&self) -> &'static str {
        "BalancedSessions"
    }

    fn check(&self, state: &GatewaySnapshot) -> InvariantResult {
        let opened = state.stats.sessions_opened;
        let accounted = state.stats.sessions_closed + state.live_sessions as u64;

        if opened == accounted {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "opened {opened}, closed {} + live {}",
                    state.stats.sessions_closed, state.live_sessions
                ),
            })
        }
    }
}

/// Each side's destroy notifier ran exactly once per reclaimed session.
///
/// Teardown completes within one dispatch pass, so between passes the
/// notifier counts equal the closed count and no live session is half
/// closed.
pub struct SingleTeardown;

impl Invariant for SingleTeardown {
    fn name(&self) -> &'static str {
        "SingleTeardown"
    }

    fn check(&self, state: &GatewaySnapshot) -> InvariantResult {
        let stats = &state.stats;
        if stats.device_teardowns != stats.sessions_closed
            || stats.backend_teardowns != stats.sessions_closed
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "closed {} sessions with {} device and {} backend notifier runs",
                    stats.sessions_closed, stats.device_teardowns, stats.backend_teardowns
                ),
            });
        }

        if let Some(session) = state.sessions.iter().find(|s| s.state != SessionState::Active) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("session {} left in {:?} between passes", session.id, session.state),
            });
        }
        Ok(())
    }
}

/// Channels are released exactly once, and only by teardown.
///
/// A reclaimed session's device and backend streams have each been released
/// once; a live session's streams have not been released at all.
pub struct ChannelRelease;

impl Invariant for ChannelRelease {
    fn name(&self) -> &'static str {
        "ChannelRelease"
    }

    fn check(&self, state: &GatewaySnapshot) -> InvariantResult {
        for closed in &state.closed {
            for tag in [closed.device, closed.backend] {
                let releases = state.releases(tag);
                if releases != 1 {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("closed session {}: {tag} released {releases} times", closed.id),
                    });
                }
            }
        }

        for live in &state.sessions {
            if !live.holds_device || !live.holds_backend {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("live session {} lost a channel", live.id),
                });
            }
            for tag in [live.device, live.backend] {
                if state.releases(tag) != 0 {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("live session {}: {tag} already released", live.id),
                    });
                }
            }
        }
        Ok(())
    }
}
