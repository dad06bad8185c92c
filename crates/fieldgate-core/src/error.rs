//! Error types for gateway startup and the event loop.
//!
//! Only startup and poller failures are errors at this level. Per-session
//! failures (recv, send, processing, disconnects) are logged and handled
//! inside the session manager and never surface here.

use std::io;

use thiserror::Error;

use crate::{config::ConfigError, driver::DriverError};

/// Errors that abort gateway startup or stop the event loop.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration file missing, unparsable, or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No compiled-in protocol driver has the requested name.
    #[error("no such protocol: {0}")]
    NoSuchProtocol(String),

    /// The selected protocol driver failed its probe.
    #[error("protocol {name} unavailable: {source}")]
    ProtocolUnavailable {
        /// Protocol name
        name: &'static str,
        /// Probe failure
        source: DriverError,
    },

    /// The poller failed.
    #[error("event loop i/o error: {0}")]
    Io(#[from] io::Error),
}

impl GatewayError {
    /// Returns true for errors raised before the event loop starts.
    pub fn is_startup(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::NoSuchProtocol("coap".to_string());
        assert_eq!(err.to_string(), "no such protocol: coap");
        assert!(err.is_startup());

        let err = GatewayError::ProtocolUnavailable {
            name: "http",
            source: DriverError::Unavailable {
                driver: "http",
                reason: "cannot resolve host".to_string(),
            },
        };
        assert_eq!(err.to_string(), "protocol http unavailable: http unavailable: cannot resolve host");

        let err = GatewayError::from(io::Error::other("poll failed"));
        assert!(!err.is_startup());
    }
}
