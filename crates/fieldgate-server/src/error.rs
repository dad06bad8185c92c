//! Server error types.

use std::fmt;

use fieldgate_core::{ConfigError, GatewayError};

/// Errors that can occur in the gateway daemon.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (unreadable credential file, bad settings).
    ///
    /// Fatal: fix the configuration and restart.
    Config(ConfigError),

    /// Startup or event loop error from the session manager.
    ///
    /// Unknown or unavailable protocols are fatal at startup; poller
    /// failures stop the loop.
    Gateway(GatewayError),

    /// Process-level I/O error (signal registration and the like).
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Gateway(err) => write!(f, "gateway error: {err}"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Gateway(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<GatewayError> for ServerError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidConfig(err) => Self::Config(err),
            other => Self::Gateway(other),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_flattened() {
        let err = ServerError::from(GatewayError::InvalidConfig(ConfigError::MissingKey {
            group: "Credential",
            key: "UUID",
        }));
        assert!(matches!(err, ServerError::Config(_)));
        assert!(err.to_string().starts_with("configuration error:"));
    }

    #[test]
    fn gateway_errors_keep_source() {
        let err = ServerError::from(GatewayError::NoSuchProtocol("coap".to_string()));
        assert_eq!(err.to_string(), "gateway error: no such protocol: coap");
        assert!(std::error::Error::source(&err).is_some());
    }
}
