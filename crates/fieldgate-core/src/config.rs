//! Gateway configuration file.
//!
//! The file uses INI-style groups:
//!
//! ```ini
//! [Credential]
//! UUID=0123456789abcdef0123456789abcdef
//! TOKEN=0123456789abcdef
//!
//! [Cloud]
//! Host=cloud.example.com
//! Port=80
//!
//! [Gateway]
//! Transports=Unix,Serial,TCP
//! ```
//!
//! Only the `Credential` group is required. List values are comma separated.

use std::path::Path;

use thiserror::Error;

use crate::credential::{Credential, CredentialError};

/// Errors produced while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A required key is absent.
    #[error("missing required key {group}.{key}")]
    MissingKey {
        /// Group the key belongs to
        group: &'static str,
        /// Key name
        key: &'static str,
    },

    /// A key is present but its value is unusable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Key name
        key: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Credential fields failed validation.
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Cloud backend location used by the protocol drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// Backend host name or address
    pub host: String,
    /// Backend port. `None` means "use the protocol driver's default".
    pub port: Option<u16>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self { host: DEFAULT_CLOUD_HOST.to_string(), port: None }
    }
}

/// Default backend host.
pub const DEFAULT_CLOUD_HOST: &str = "localhost";

/// Parsed gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Owner credential
    pub credential: Credential,
    /// Cloud backend location
    pub cloud: CloudConfig,
    /// Node driver allow-list. `None` enables every compiled-in driver.
    pub transports: Option<Vec<String>>,
}

impl GatewayConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let name = path.to_string_lossy();
        let source = config::Config::builder()
            .add_source(config::File::new(&name, config::FileFormat::Ini).required(true))
            .build()?;

        Self::from_source(&source)
    }

    /// Parse configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Ini))
            .build()?;

        Self::from_source(&source)
    }

    fn from_source(source: &config::Config) -> Result<Self, ConfigError> {
        let uuid = required(source, "Credential", "UUID")?;
        let token = required(source, "Credential", "TOKEN")?;
        let credential = Credential::new(uuid, token)?;

        tracing::info!(uuid = credential.uuid(), "credential loaded");

        let mut cloud = CloudConfig::default();
        if let Some(host) = optional(source, "Cloud", "Host")? {
            cloud.host = host;
        }
        if let Some(port) = optional(source, "Cloud", "Port")? {
            let port = port.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "Cloud.Port",
                reason: e.to_string(),
            })?;
            cloud.port = Some(port);
        }

        let transports = optional(source, "Gateway", "Transports")?.map(|list| split_list(&list));

        Ok(Self { credential, cloud, transports })
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Keys are looked up exactly as the file spells its group and key names.
fn lookup_key(group: &str, key: &str) -> String {
    format!("{group}.{key}")
}

fn required(
    source: &config::Config,
    group: &'static str,
    key: &'static str,
) -> Result<String, ConfigError> {
    optional(source, group, key)?.ok_or(ConfigError::MissingKey { group, key })
}

fn optional(
    source: &config::Config,
    group: &'static str,
    key: &'static str,
) -> Result<Option<String>, ConfigError> {
    match source.get_string(&lookup_key(group, key)) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(ConfigError::Load(e)),
    }
}
