//! Gateway owner credential.
//!
//! A single credential is loaded at startup and handed to the session manager
//! by value. It is never mutated afterwards; the token is zeroed when the
//! credential is dropped.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroize;

/// Required length of the UUID field, in bytes.
pub const UUID_LEN: usize = 32;

/// Required length of the token field, in bytes.
pub const TOKEN_LEN: usize = 16;

/// Errors produced while validating a credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// A field does not have its exact required length.
    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Field that failed validation
        field: &'static str,
        /// Required length
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },
}

/// Device/account identity used to authenticate bridged traffic.
///
/// Construction validates both fields; there is no way to obtain a partially
/// populated credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    uuid: String,
    token: String,
}

impl Credential {
    /// Validate and build a credential.
    pub fn new(uuid: impl Into<String>, token: impl Into<String>) -> Result<Self, CredentialError> {
        let uuid = uuid.into();
        let mut token = token.into();

        if uuid.len() != UUID_LEN {
            token.zeroize();
            return Err(CredentialError::InvalidLength {
                field: "UUID",
                expected: UUID_LEN,
                actual: uuid.len(),
            });
        }

        if token.len() != TOKEN_LEN {
            let actual = token.len();
            token.zeroize();
            return Err(CredentialError::InvalidLength {
                field: "TOKEN",
                expected: TOKEN_LEN,
                actual,
            });
        }

        Ok(Self { uuid, token })
    }

    /// Device UUID.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Device token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("uuid", &self.uuid)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const UUID: &str = "0123456789abcdef0123456789abcdef";
    const TOKEN: &str = "fedcba9876543210";

    #[test]
    fn accepts_exact_lengths() {
        let credential = Credential::new(UUID, TOKEN).unwrap();
        assert_eq!(credential.uuid(), UUID);
        assert_eq!(credential.token(), TOKEN);
    }

    #[test]
    fn rejects_short_uuid() {
        let err = Credential::new("abc", TOKEN).unwrap_err();
        assert_eq!(err, CredentialError::InvalidLength {
            field: "UUID",
            expected: UUID_LEN,
            actual: 3
        });
    }

    #[test]
    fn rejects_long_token() {
        let err = Credential::new(UUID, format!("{TOKEN}x")).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidLength { field: "TOKEN", actual: 17, .. }));
    }

    #[test]
    fn debug_output_redacts_token() {
        let credential = Credential::new(UUID, TOKEN).unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains(UUID));
        assert!(!rendered.contains(TOKEN));
    }

    proptest! {
        #[test]
        fn prop_wrong_lengths_never_build(uuid in "[a-f0-9]{0,48}", token in "[a-f0-9]{0,32}") {
            let result = Credential::new(uuid.clone(), token.clone());
            let valid = uuid.len() == UUID_LEN && token.len() == TOKEN_LEN;
            prop_assert_eq!(result.is_ok(), valid);
        }
    }
}
