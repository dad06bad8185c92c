//! Scripted poller.

use std::{collections::VecDeque, io, time::Duration};

use fieldgate_core::{Condition, PollRequest, Poller, Readiness, WatchId};

/// Poller that hands out readiness batches queued by the test.
///
/// Each `poll` call returns the next queued batch (or nothing) and records
/// the watches it was asked about.
#[derive(Debug, Default)]
pub struct SimPoller {
    batches: VecDeque<Vec<Readiness>>,
    failures: VecDeque<io::ErrorKind>,
    last_requests: Vec<(WatchId, Condition)>,
    polls: u64,
}

impl SimPoller {
    /// Create an idle poller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch.
    pub fn push_batch(&mut self, batch: Vec<Readiness>) {
        self.batches.push_back(batch);
    }

    /// Queue a single readiness report as its own batch.
    pub fn push(&mut self, watch: WatchId, condition: Condition) {
        self.push_batch(vec![Readiness::new(watch, condition)]);
    }

    /// Make the next poll fail.
    pub fn fail_next(&mut self, kind: io::ErrorKind) {
        self.failures.push_back(kind);
    }

    /// Watches and interest sets passed to the most recent poll.
    pub fn last_requests(&self) -> &[(WatchId, Condition)] {
        &self.last_requests
    }

    /// Number of poll calls.
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl Poller for SimPoller {
    fn poll(
        &mut self,
        requests: &[PollRequest<'_>],
        _timeout: Option<Duration>,
    ) -> io::Result<Vec<Readiness>> {
        self.polls += 1;
        self.last_requests = requests.iter().map(|r| (r.watch, r.interest)).collect();

        if let Some(kind) = self.failures.pop_front() {
            tracing::debug!(?kind, polls = self.polls, "scripted poll failure");
            return Err(io::Error::from(kind));
        }
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}
