//! Environment-variable credential source

use super::{CredentialVault, Credentials, VaultError};
use async_trait::async_trait;

pub const DEFAULT_KEY_VAR: &str = "TRAILGUARD_API_KEY";
pub const DEFAULT_SECRET_VAR: &str = "TRAILGUARD_API_SECRET";

/// Reads the key pair from the process environment on every call
#[derive(Debug, Clone)]
pub struct EnvVault {
    key_var: String,
    secret_var: String,
}

impl Default for EnvVault {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_VAR, DEFAULT_SECRET_VAR)
    }
}

impl EnvVault {
    pub fn new(key_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            key_var: key_var.into(),
            secret_var: secret_var.into(),
        }
    }

    fn read(var: &str) -> Result<String, VaultError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(VaultError::Missing(var.to_string())),
        }
    }
}

#[async_trait]
impl CredentialVault for EnvVault {
    async fn credentials(&self) -> Result<Credentials, VaultError> {
        Ok(Credentials {
            api_key: Self::read(&self.key_var)?,
            secret: Self::read(&self.secret_var)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_variable() {
        let vault = EnvVault::new(
            "TRAILGUARD_TEST_MISSING_KEY",
            "TRAILGUARD_TEST_MISSING_SECRET",
        );
        let err = vault.credentials().await.unwrap_err();
        assert_eq!(
            err,
            VaultError::Missing("TRAILGUARD_TEST_MISSING_KEY".to_string())
        );
    }

    #[tokio::test]
    async fn test_reads_pair() {
        std::env::set_var("TRAILGUARD_TEST_KEY", "key-123");
        std::env::set_var("TRAILGUARD_TEST_SECRET", "secret-456");
        let vault = EnvVault::new("TRAILGUARD_TEST_KEY", "TRAILGUARD_TEST_SECRET");

        let creds = vault.credentials().await.unwrap();
        assert_eq!(creds.api_key, "key-123");
        assert_eq!(creds.secret, "secret-456");
        assert!(!format!("{creds:?}").contains("secret-456"));
    }
}
