//! Owned byte channels for device and backend connections.
//!
//! A [`Channel`] wraps any [`Stream`]: Unix and TCP sockets, serial device
//! files, or in-memory doubles in the simulation harness. Dropping a channel
//! releases its underlying handle.

use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    os::{
        fd::{AsFd, BorrowedFd},
        unix::net::UnixStream,
    },
};

/// Byte stream backing a [`Channel`].
pub trait Stream: Read + Write {
    /// Descriptor the poller should watch. `None` for streams without an OS
    /// handle; such streams are only driven by simulated pollers.
    fn poll_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Shut down both directions, discarding unread data.
    fn shutdown_both(&self) -> io::Result<()>;
}

impl Stream for UnixStream {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn shutdown_both(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
}

impl Stream for TcpStream {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn shutdown_both(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Character devices (serial lines) have no shutdown; closing happens on drop.
impl Stream for File {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn shutdown_both(&self) -> io::Result<()> {
        Ok(())
    }
}

/// An owned, pollable byte channel.
pub struct Channel {
    stream: Box<dyn Stream>,
    label: &'static str,
    shut_down: bool,
}

impl Channel {
    /// Wrap a stream. `label` names the transport in log output.
    pub fn new(label: &'static str, stream: impl Stream + 'static) -> Self {
        Self { stream: Box::new(stream), label, shut_down: false }
    }

    /// Transport label given at construction.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Descriptor to poll, if any.
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        self.stream.poll_fd()
    }

    /// Whether [`Channel::shutdown`] already ran.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Shut the channel down. Subsequent calls are no-ops.
    ///
    /// Failures are logged; the channel is considered shut down either way.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.stream.shutdown_both() {
            // ENOTCONN when the peer is already gone
            tracing::debug!(channel = self.label, error = %e, "shutdown failed");
        }
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("label", &self.label)
            .field("fd", &self.poll_fd())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_channel_round_trip() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = Channel::new("unix", a);
        let mut right = Channel::new("unix", b);

        left.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        assert!(left.poll_fd().is_some());
    }

    #[test]
    fn shutdown_is_idempotent_and_signals_peer() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = Channel::new("unix", a);
        let mut right = Channel::new("unix", b);

        left.shutdown();
        left.shutdown();
        assert!(left.is_shut_down());

        let mut buf = [0u8; 8];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }
}
