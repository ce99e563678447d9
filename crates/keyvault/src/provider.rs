//! Secret fetching as a configuration provider.

use crate::client::SecretClient;
use crate::credential::CredentialResolver;
use crate::error::{KeyVaultError, Result};
use crate::retry::RetryConfig;
use crate::settings::VaultSettings;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

/// Maximum number of secret values fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Separator used in secret names in place of the configuration delimiter.
pub const SECRET_NAME_DELIMITER: &str = "--";

/// Map a secret name to a configuration key (`A--B` becomes `A:B`).
#[must_use]
pub fn normalize_secret_name(name: &str) -> String {
    name.replace(SECRET_NAME_DELIMITER, ":")
}

/// A source of named secrets.
#[async_trait]
pub trait SecretProvider: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch secrets.
    ///
    /// With `names` absent or empty every enabled secret is fetched;
    /// otherwise exactly the named ones. When `normalize` is set the result
    /// keys are normalised with [`normalize_secret_name`]. Any failure fails
    /// the whole call.
    async fn get_secrets(
        &self,
        names: Option<&[String]>,
        normalize: bool,
    ) -> Result<IndexMap<String, String>>;
}

/// [`SecretProvider`] backed by a Key Vault.
#[derive(Debug, Clone)]
pub struct KeyVaultProvider {
    client: SecretClient,
    concurrency: usize,
}

impl KeyVaultProvider {
    /// Create a provider over `client`.
    #[must_use]
    pub fn new(client: SecretClient) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Build a provider from settings, resolving the credential once.
    pub fn from_settings(
        settings: &VaultSettings,
        resolver: &CredentialResolver,
        retry: RetryConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        settings.validate()?;
        let endpoint = settings.endpoint()?;
        let credential = resolver.resolve(settings)?;
        let client = SecretClient::new(endpoint, credential)?
            .with_retry(retry)
            .with_request_timeout(request_timeout)?;
        Ok(Self::new(client))
    }

    /// Fetch at most `concurrency` values at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Underlying client.
    #[must_use]
    pub fn client(&self) -> &SecretClient {
        &self.client
    }
}

#[async_trait]
impl SecretProvider for KeyVaultProvider {
    fn name(&self) -> &str {
        "key-vault"
    }

    async fn get_secrets(
        &self,
        names: Option<&[String]>,
        normalize: bool,
    ) -> Result<IndexMap<String, String>> {
        let names = match names {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => self.client.list_enabled_secret_names().await?,
        };

        let client = &self.client;
        let values: Vec<(String, String)> = futures::stream::iter(names)
            .map(|name| async move {
                let value = client.get_secret_value(&name).await?;
                Ok::<_, KeyVaultError>((name, value))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let secrets = collect_secrets(values, normalize)?;
        tracing::info!(
            vault = %self.client.endpoint(),
            secret_count = secrets.len(),
            "Fetched secrets from vault"
        );
        Ok(secrets)
    }
}

/// Key the fetched values, failing when two secrets map to the same
/// configuration key (ignoring case).
pub fn collect_secrets(
    values: Vec<(String, String)>,
    normalize: bool,
) -> Result<IndexMap<String, String>> {
    let mut secrets = IndexMap::with_capacity(values.len());
    let mut origins: HashMap<String, String> = HashMap::with_capacity(values.len());
    for (name, value) in values {
        let key = if normalize {
            normalize_secret_name(&name)
        } else {
            name.clone()
        };
        if let Some(first) = origins.insert(key.to_lowercase(), name.clone()) {
            return Err(KeyVaultError::SecretNameCollision {
                key,
                first,
                second: name,
            });
        }
        secrets.insert(key, value);
    }
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_secret_name() {
        assert_eq!(
            normalize_secret_name("Database--ConnectionString"),
            "Database:ConnectionString"
        );
        assert_eq!(normalize_secret_name("A--B--C"), "A:B:C");
        assert_eq!(normalize_secret_name("Plain-Name"), "Plain-Name");
        assert_eq!(normalize_secret_name("A---B"), "A:-B");
    }

    #[test]
    fn test_collect_keeps_order() {
        let secrets =
            collect_secrets(pairs(&[("B--x", "1"), ("A", "2"), ("C--y", "3")]), true).unwrap();
        let keys: Vec<&str> = secrets.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["B:x", "A", "C:y"]);
    }

    #[test]
    fn test_collect_without_normalization() {
        let secrets = collect_secrets(pairs(&[("Db--Host", "h")]), false).unwrap();
        assert_eq!(secrets.get("Db--Host").map(String::as_str), Some("h"));
    }

    #[test]
    fn test_collision_after_normalization() {
        let err = collect_secrets(pairs(&[("A--B", "1"), ("a--b", "2")]), true).unwrap_err();
        match err {
            KeyVaultError::SecretNameCollision { key, first, second } => {
                assert_eq!(key, "a:b");
                assert_eq!(first, "A--B");
                assert_eq!(second, "a--b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_collision_when_not_normalizing() {
        let secrets = collect_secrets(pairs(&[("A--B", "1"), ("A:B", "2")]), false).unwrap();
        assert_eq!(secrets.len(), 2);
    }
}
