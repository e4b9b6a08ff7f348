//! Credential types

use std::fmt;
use thiserror::Error;

/// Exchange API key pair
///
/// Only lives for the duration of one signed request.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Credential lookup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Credential {0} is not set")]
    Missing(String),
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}
