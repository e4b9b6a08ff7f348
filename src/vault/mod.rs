//! Exchange credential access

mod env;
mod types;

pub use env::EnvVault;
pub use types::{Credentials, VaultError};

use async_trait::async_trait;

/// Supplies decrypted exchange credentials on demand
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, VaultError>;
}
