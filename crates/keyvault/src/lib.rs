//! Azure Key Vault configuration source for kvconf
//!
//! Loads every enabled secret of a vault into a
//! [`ConfigurationBuilder`](kvconf_config::ConfigurationBuilder) as its
//! highest-priority layer. Secret names use `--` where configuration keys use
//! `:` (`Database--ConnectionString` becomes `Database:ConnectionString`).
//!
//! Authentication is chosen from the `KeyVault` settings:
//!
//! - `CertificateThumbprint` set: a certificate from the local store signs the
//!   client assertion.
//! - Otherwise: the client secret (when configured) followed by the ambient
//!   chain of environment variables, managed identity and Azure CLI.
//!
//! ```ignore
//! use kvconf_config::ConfigurationBuilder;
//! use kvconf_keyvault::Bootstrapper;
//!
//! let builder = ConfigurationBuilder::new().add_json_file("appsettings.json");
//! let config = Bootstrapper::new().add_key_vault(builder).await?.build()?;
//! ```

mod bootstrap;
pub mod certificate;
mod client;
pub mod credential;
mod error;
mod provider;
mod registry;
mod retry;
mod settings;

pub use bootstrap::{
    BootstrapFlags, Bootstrapper, KEY_VAULT_SOURCE, KeyVaultProviderFactory, ProviderFactory,
    bootstrap_configuration,
};
pub use certificate::{Certificate, CertificateLoader, CertificateStore, StoreLocation, StoreName};
pub use client::{API_VERSION, DEFAULT_REQUEST_TIMEOUT, SecretClient};
pub use credential::{AccessToken, CredentialResolver, TokenCredential};
pub use error::{KeyVaultError, Result};
pub use provider::{
    DEFAULT_CONCURRENCY, KeyVaultProvider, SecretProvider, collect_secrets, normalize_secret_name,
};
pub use registry::{ProviderRegistry, add_key_vault_provider};
pub use retry::{RetryConfig, retry_with_backoff};
pub use settings::{DEFAULT_AUTHORITY_HOST, KEY_VAULT_SECTION, VaultSettings, section_path};
