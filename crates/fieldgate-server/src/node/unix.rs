//! Unix-socket node driver.
//!
//! Devices on the same host connect to a stream socket at a filesystem path.
//! A stale socket file left by a previous run is replaced on `listen`, and the
//! file is removed again when the driver is released.

use std::{
    fs, io,
    os::{
        fd::{AsFd, BorrowedFd},
        unix::net::UnixListener,
    },
    path::{Path, PathBuf},
};

use fieldgate_core::{Acceptor, Channel, DriverError, Listener, NodeDriver};

/// Default socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/fieldgate.sock";

/// Node driver listening on a Unix stream socket.
#[derive(Debug, Clone)]
pub struct UnixNode {
    path: PathBuf,
    bound: bool,
}

impl UnixNode {
    /// Driver name.
    pub const NAME: &'static str = "Unix";

    /// Listen at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), bound: false }
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for UnixNode {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }
}

impl NodeDriver for UnixNode {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        if parent.is_dir() {
            Ok(())
        } else {
            Err(DriverError::Unavailable {
                driver: Self::NAME,
                reason: format!("directory {} does not exist", parent.display()),
            })
        }
    }

    fn listen(&mut self) -> Result<Listener, DriverError> {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&self.path)?;
        listener.set_nonblocking(true)?;
        self.bound = true;

        tracing::info!(path = %self.path.display(), "unix socket bound");
        Ok(Listener::new(UnixAcceptor { listener }))
    }

    fn remove(&mut self) {
        if !self.bound {
            return;
        }
        self.bound = false;

        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "socket cleanup failed");
        }
    }
}

struct UnixAcceptor {
    listener: UnixListener,
}

impl Acceptor for UnixAcceptor {
    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.listener.as_fd())
    }

    fn accept(&mut self) -> io::Result<Channel> {
        let (stream, _) = self.listener.accept()?;
        // Device I/O is driven by readiness, one blocking read per callback.
        stream.set_nonblocking(false)?;
        Ok(Channel::new(UnixNode::NAME, stream))
    }
}
