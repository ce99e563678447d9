//! Configuration bootstrapping with vault secrets.
//!
//! The bootstrapper builds the configuration once to read the `KeyVault`
//! section. When the vault is enabled, every secret is fetched and added as a
//! final layer so secrets override file, command-line and environment values
//! of the same key. When it is disabled nothing else happens and the builder
//! is returned untouched.

use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::credential::CredentialResolver;
use crate::error::{KeyVaultError, Result};
use crate::provider::{DEFAULT_CONCURRENCY, KeyVaultProvider, SecretProvider};
use crate::retry::RetryConfig;
use crate::settings::{VaultSettings, section_path};
use kvconf_config::{Configuration, ConfigurationBuilder, EnvironmentAliases};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Source name of the vault layer.
pub const KEY_VAULT_SOURCE: &str = "key-vault";

/// Creates the secret provider for enabled settings.
pub trait ProviderFactory: Send + Sync + Debug {
    /// Build a provider for `settings`.
    fn create(&self, settings: &VaultSettings) -> Result<Arc<dyn SecretProvider>>;
}

/// Factory producing [`KeyVaultProvider`]s.
#[derive(Debug, Clone)]
pub struct KeyVaultProviderFactory {
    resolver: CredentialResolver,
    retry: RetryConfig,
    request_timeout: Duration,
    concurrency: usize,
}

impl Default for KeyVaultProviderFactory {
    fn default() -> Self {
        Self {
            resolver: CredentialResolver::default(),
            retry: RetryConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl KeyVaultProviderFactory {
    /// Create a factory with the default retry policy and timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve credentials with `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: CredentialResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Retry vault requests with `retry`.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Limit each vault request to `timeout`.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fetch at most `concurrency` secrets at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl ProviderFactory for KeyVaultProviderFactory {
    fn create(&self, settings: &VaultSettings) -> Result<Arc<dyn SecretProvider>> {
        let provider = KeyVaultProvider::from_settings(
            settings,
            &self.resolver,
            self.retry.clone(),
            self.request_timeout,
        )?
        .with_concurrency(self.concurrency);
        Ok(Arc::new(provider))
    }
}

/// Adds vault secrets to a configuration pipeline.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    section_prefix: Option<String>,
    factory: Arc<dyn ProviderFactory>,
    timeout: Option<Duration>,
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self {
            section_prefix: None,
            factory: Arc::new(KeyVaultProviderFactory::default()),
            timeout: None,
        }
    }
}

impl Bootstrapper {
    /// Create a bootstrapper reading the `KeyVault` section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{prefix}:KeyVault` instead.
    #[must_use]
    pub fn with_section_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.section_prefix = Some(prefix.into()).filter(|p| !p.trim().is_empty());
        self
    }

    /// Create providers with `factory`.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Fail when fetching secrets takes longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Section path the settings are read from.
    #[must_use]
    pub fn section(&self) -> String {
        section_path(self.section_prefix.as_deref())
    }

    /// Bind the vault settings from a built configuration.
    pub fn settings(&self, config: &Configuration) -> Result<VaultSettings> {
        VaultSettings::from_configuration(config, self.section_prefix.as_deref())
    }

    /// Append the vault layer to `builder` when the vault is enabled.
    pub async fn add_key_vault(&self, builder: ConfigurationBuilder) -> Result<ConfigurationBuilder> {
        let config = builder.build()?;
        let settings = self.settings(&config)?;
        if !settings.enabled {
            tracing::debug!(section = %self.section(), "Key Vault integration disabled");
            return Ok(builder);
        }

        settings.validate()?;
        let endpoint = settings.endpoint()?;
        tracing::info!(vault = %endpoint, "Loading configuration from Key Vault");
        let provider = self.factory.create(&settings)?;

        let fetch = provider.get_secrets(None, true);
        let secrets = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetch)
                .await
                .map_err(|_| KeyVaultError::timeout("key vault bootstrap", timeout))??,
            None => fetch.await?,
        };

        tracing::debug!(
            vault = %endpoint,
            secret_count = secrets.len(),
            "Added Key Vault configuration layer"
        );
        Ok(builder.add_in_memory(KEY_VAULT_SOURCE, secrets))
    }
}

/// Optional steps after the vault layer has been added.
#[derive(Debug, Clone, Default)]
pub struct BootstrapFlags {
    /// Promote keys of the current `TestEnvironment` using these aliases.
    pub environment_overrides: Option<EnvironmentAliases>,
    /// Copy the final configuration into process environment variables.
    pub project_environment: bool,
}

/// Run the whole pipeline: vault layer, environment overrides, projection.
pub async fn bootstrap_configuration(
    builder: ConfigurationBuilder,
    bootstrapper: &Bootstrapper,
    flags: &BootstrapFlags,
) -> Result<Configuration> {
    let mut builder = bootstrapper.add_key_vault(builder).await?;
    if let Some(aliases) = &flags.environment_overrides {
        builder = builder.with_environment_overrides(aliases)?;
    }
    let config = builder.build()?;
    if flags.project_environment {
        let report = kvconf_config::project_configuration(&config);
        tracing::debug!(
            applied = report.applied,
            skipped = report.skipped,
            "Projected configuration into the environment"
        );
    }
    Ok(config)
}
