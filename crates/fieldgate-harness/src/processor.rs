//! Scripted message processor.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use fieldgate_core::{Channel, Credential, MessageProcessor, ProcessError, ProtocolDriver};

/// Scripted outcome of one `process` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Reply with these bytes
    Reply(Vec<u8>),
    /// Fail with [`ProcessError::Rejected`]
    Fail(String),
}

#[derive(Debug, Default)]
struct ProcessorState {
    script: VecDeque<Step>,
    fallback: Vec<u8>,
    inputs: Vec<Vec<u8>>,
    uuids: Vec<String>,
}

/// Processor that answers from a script, falling back to a fixed reply.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcessor {
    state: Arc<Mutex<ProcessorState>>,
}

fn lock(state: &Mutex<ProcessorState>) -> MutexGuard<'_, ProcessorState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ScriptedProcessor {
    /// Processor whose unscripted calls reply with `reply`.
    pub fn replying(reply: &[u8]) -> Self {
        let processor = Self::default();
        lock(&processor.state).fallback = reply.to_vec();
        processor
    }

    /// Queue the outcome of the next call.
    pub fn then(&self, step: Step) -> &Self {
        lock(&self.state).script.push_back(step);
        self
    }

    /// Every input frame seen, in order.
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        lock(&self.state).inputs.clone()
    }

    /// Credential UUID seen on each call.
    pub fn uuids(&self) -> Vec<String> {
        lock(&self.state).uuids.clone()
    }
}

impl MessageProcessor for ScriptedProcessor {
    fn process(
        &mut self,
        credential: &Credential,
        _backend: &mut Channel,
        _protocol: &mut dyn ProtocolDriver,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ProcessError> {
        let mut state = lock(&self.state);
        state.inputs.push(input.to_vec());
        state.uuids.push(credential.uuid().to_string());

        let reply = match state.script.pop_front() {
            Some(Step::Reply(bytes)) => bytes,
            Some(Step::Fail(reason)) => return Err(ProcessError::Rejected(reason)),
            None => state.fallback.clone(),
        };

        let available = output.len();
        let slot = output
            .get_mut(..reply.len())
            .ok_or(ProcessError::OutputTooSmall { needed: reply.len(), available })?;
        slot.copy_from_slice(&reply);
        Ok(reply.len())
    }
}
