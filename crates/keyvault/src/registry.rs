//! Registry of shared secret providers.
//!
//! Providers are constructed once at startup and handed out by shared
//! reference to every consumer.

use crate::bootstrap::{KEY_VAULT_SOURCE, ProviderFactory};
use crate::error::Result;
use crate::provider::SecretProvider;
use crate::settings::VaultSettings;
use kvconf_config::Configuration;
use std::collections::HashMap;
use std::sync::Arc;

/// Named secret providers with O(1) lookup.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn SecretProvider>>,
    by_name: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn SecretProvider>) {
        let name = name.into();
        if let Some(&index) = self.by_name.get(&name) {
            self.providers[index] = provider;
        } else {
            self.by_name.insert(name, self.providers.len());
            self.providers.push(provider);
        }
    }

    /// Get a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SecretProvider>> {
        self.by_name.get(name).map(|&idx| &self.providers[idx])
    }

    /// Iterate over every provider in registration order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn SecretProvider>> {
        self.providers.iter()
    }

    /// Names of the registered providers.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

/// Register the Key Vault provider described by the `KeyVault` section
/// (or `{prefix}:KeyVault`) of `config`.
///
/// The credential is resolved immediately, so invalid settings fail here
/// rather than on first use.
pub fn add_key_vault_provider(
    registry: &mut ProviderRegistry,
    config: &Configuration,
    prefix: Option<&str>,
    factory: &dyn ProviderFactory,
) -> Result<Arc<dyn SecretProvider>> {
    tracing::info!("Adding KeyVault Provider...");
    let settings = VaultSettings::from_configuration(config, prefix)?;
    let provider = factory.create(&settings)?;
    registry.register(KEY_VAULT_SOURCE, Arc::clone(&provider));
    Ok(provider)
}
