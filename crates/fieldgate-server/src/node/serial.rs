//! Serial-line node driver.
//!
//! A serial line carries exactly one device, so the "listener" is a one-shot:
//! `listen` opens the line and arms a wake socket that reads as ready once,
//! and the first `accept` hands out the line as the device channel. When that
//! session ends the line is closed and not reopened for the rest of the run.
//!
//! Line settings (baud rate, raw mode) are left as configured on the host.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::{
        fd::{AsFd, BorrowedFd},
        unix::net::UnixStream,
    },
    path::{Path, PathBuf},
};

use fieldgate_core::{Acceptor, Channel, DriverError, Listener, NodeDriver};

/// Node driver for a device attached to a tty.
#[derive(Debug, Clone, Default)]
pub struct SerialNode {
    path: Option<PathBuf>,
}

impl SerialNode {
    /// Driver name.
    pub const NAME: &'static str = "Serial";

    /// Use the tty at `path`, or stay unconfigured with `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Configured tty path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configured_path(&self) -> Result<&Path, DriverError> {
        self.path.as_deref().ok_or_else(|| DriverError::Unavailable {
            driver: Self::NAME,
            reason: "no tty configured".to_string(),
        })
    }
}

impl NodeDriver for SerialNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        self.path.is_some()
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        let path = self.configured_path()?;
        if path.exists() {
            Ok(())
        } else {
            Err(DriverError::Unavailable {
                driver: Self::NAME,
                reason: format!("{} does not exist", path.display()),
            })
        }
    }

    fn listen(&mut self) -> Result<Listener, DriverError> {
        let path = self.configured_path()?;
        let line = OpenOptions::new().read(true).write(true).open(path)?;

        let (mut arm, wake) = UnixStream::pair()?;
        wake.set_nonblocking(true)?;
        arm.write_all(&[1])?;

        tracing::info!(tty = %path.display(), "serial line opened");
        Ok(Listener::new(SerialAcceptor { line: Some(line), wake, _arm: arm }))
    }
}

struct SerialAcceptor {
    line: Option<File>,
    wake: UnixStream,
    _arm: UnixStream,
}

impl Acceptor for SerialAcceptor {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.wake.as_fd())
    }

    fn accept(&mut self) -> io::Result<Channel> {
        let mut byte = [0u8; 1];
        match self.wake.read(&mut byte) {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {},
            Err(e) => return Err(e),
        }

        self.line
            .take()
            .map(|line| Channel::new(SerialNode::NAME, line))
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_without_path() {
        let mut node = SerialNode::new(None);
        assert!(!node.is_configured());
        assert!(node.probe().is_err());
    }

    #[test]
    fn probe_fails_for_missing_tty() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = SerialNode::new(Some(dir.path().join("ttyUSB9")));
        assert!(node.is_configured());
        assert!(matches!(node.probe(), Err(DriverError::Unavailable { driver: "Serial", .. })));
    }

    #[test]
    fn hands_out_line_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut node = SerialNode::new(Some(file.path().to_path_buf()));
        node.probe().unwrap();

        let mut listener = node.listen().unwrap();
        assert!(listener.poll_fd().is_some());

        let channel = node.accept(&mut listener).unwrap();
        assert_eq!(channel.label(), "Serial");

        let err = node.accept(&mut listener).unwrap_err();
        assert!(err.is_transient());
    }
}
