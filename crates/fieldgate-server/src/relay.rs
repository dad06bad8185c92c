//! Pass-through message processor.
//!
//! Forwards each device frame to the backend unchanged and returns whatever
//! the backend answers with in one read. Protocol translation is expected to
//! live in a richer [`MessageProcessor`]; this one keeps the daemon usable
//! against a backend that already speaks the device protocol.

use std::io::{ErrorKind, Read, Write};

use fieldgate_core::{Channel, Credential, MessageProcessor, ProcessError, ProtocolDriver};

/// Forwards frames verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayProcessor {
    /// Forward empty frames to the backend instead of answering them with an
    /// empty reply locally.
    pub forward_empty: bool,
}

impl RelayProcessor {
    /// Create a relay processor.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageProcessor for RelayProcessor {
    fn process(
        &mut self,
        _credential: &Credential,
        backend: &mut Channel,
        _protocol: &mut dyn ProtocolDriver,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ProcessError> {
        if input.is_empty() && !self.forward_empty {
            return Ok(0);
        }

        backend.write_all(input)?;
        backend.flush()?;

        loop {
            match backend.read(output) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(ProcessError::Rejected("backend did not reply in time".to_string()));
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Read, os::unix::net::UnixStream, thread};

    use fieldgate_core::CloudConfig;

    use super::*;
    use crate::protocol::WsProtocol;

    fn credential() -> Credential {
        Credential::new("0123456789abcdef0123456789abcdef", "0123456789abcdef").unwrap()
    }

    #[test]
    fn forwards_and_returns_reply() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let backend_thread = thread::spawn(move || {
            let mut buf = [0u8; 10];
            remote.read_exact(&mut buf).unwrap();
            remote.write_all(b"ack!").unwrap();
            buf
        });

        let mut backend = Channel::new("pair", local);
        let mut protocol = WsProtocol::new(&CloudConfig::default());
        let mut output = [0u8; 512];

        let len = RelayProcessor::new()
            .process(&credential(), &mut backend, &mut protocol, b"0123456789", &mut output)
            .unwrap();

        assert_eq!(&output[..len], b"ack!");
        assert_eq!(&backend_thread.join().unwrap(), b"0123456789");
    }

    #[test]
    fn empty_frame_short_circuits() {
        let (local, _remote) = UnixStream::pair().unwrap();
        let mut backend = Channel::new("pair", local);
        let mut protocol = WsProtocol::new(&CloudConfig::default());
        let mut output = [0u8; 16];

        let len = RelayProcessor::new()
            .process(&credential(), &mut backend, &mut protocol, b"", &mut output)
            .unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn closed_backend_is_an_error() {
        let (local, remote) = UnixStream::pair().unwrap();
        drop(remote);
        let mut backend = Channel::new("pair", local);
        let mut protocol = WsProtocol::new(&CloudConfig::default());
        let mut output = [0u8; 16];

        let result =
            RelayProcessor::new().process(&credential(), &mut backend, &mut protocol, b"x", &mut output);
        assert!(matches!(result, Err(ProcessError::Io(_))));
    }
}
