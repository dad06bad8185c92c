//! Fuzz target for configuration parsing
//!
//! # Strategy
//!
//! - Raw text: arbitrary bytes interpreted as UTF-8 INI text
//! - Structured: well-formed files with fuzzed credential values and
//!   transport lists
//!
//! # Invariants
//!
//! - Parsing never panics
//! - A successful parse always yields a 32-byte UUID and a 16-byte token
//! - Credentials of any other length are always rejected

#![no_main]

use arbitrary::Arbitrary;
use fieldgate_core::{
    GatewayConfig,
    credential::{TOKEN_LEN, UUID_LEN},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Structured { uuid: String, token: String, port: Option<String>, transports: Option<String> },
}

fn render(uuid: &str, token: &str, port: Option<&str>, transports: Option<&str>) -> String {
    let clean = |s: &str| s.replace(['\n', '\r', '[', ']', '=', ';', '#'], "");
    let mut text = format!("[Credential]\nUUID={}\nTOKEN={}\n", clean(uuid), clean(token));
    if let Some(port) = port {
        text.push_str(&format!("[Cloud]\nPort={}\n", clean(port)));
    }
    if let Some(transports) = transports {
        text.push_str(&format!("[Gateway]\nTransports={}\n", clean(transports)));
    }
    text
}

fuzz_target!(|input: Input| {
    let text = match &input {
        Input::Raw(text) => text.clone(),
        Input::Structured { uuid, token, port, transports } => {
            render(uuid, token, port.as_deref(), transports.as_deref())
        },
    };

    if let Ok(config) = GatewayConfig::parse(&text) {
        assert_eq!(config.credential.uuid().len(), UUID_LEN);
        assert_eq!(config.credential.token().len(), TOKEN_LEN);
        if let Some(transports) = &config.transports {
            assert!(transports.iter().all(|t| !t.is_empty() && t.trim() == t));
        }
    }
});
