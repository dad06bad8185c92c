//! Message processing boundary.
//!
//! The session manager treats message processing as an opaque, synchronous
//! call: one inbound device frame in, one reply frame out. Translation between
//! the device protocol and the backend protocol lives behind this trait.

use std::io;

use thiserror::Error;

use crate::{
    channel::Channel,
    credential::Credential,
    driver::{DriverError, ProtocolDriver},
};

/// Errors produced by a [`MessageProcessor`].
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Backend I/O failed.
    #[error("backend i/o error: {0}")]
    Io(#[from] io::Error),

    /// A protocol driver hook failed.
    #[error("protocol driver error: {0}")]
    Driver(#[from] DriverError),

    /// The inbound frame could not be interpreted.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The backend rejected the request.
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// The reply does not fit the output buffer.
    #[error("reply of {needed} bytes exceeds buffer of {available} bytes")]
    OutputTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },
}

/// Turns inbound device frames into reply frames, talking to the backend.
pub trait MessageProcessor {
    /// Process `input` and write the reply into `output`, returning the reply
    /// length. A zero-length reply is valid and still sent.
    fn process(
        &mut self,
        credential: &Credential,
        backend: &mut Channel,
        protocol: &mut dyn ProtocolDriver,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ProcessError>;
}

impl<F> MessageProcessor for F
where
    F: FnMut(&Credential, &mut Channel, &[u8], &mut [u8]) -> Result<usize, ProcessError>,
{
    fn process(
        &mut self,
        credential: &Credential,
        backend: &mut Channel,
        _protocol: &mut dyn ProtocolDriver,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ProcessError> {
        self(credential, backend, input, output)
    }
}
