//! Ambient credential discovery.

use super::{
    AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID, AccessToken, AzureCliCredential,
    ClientSecretCredential, ManagedIdentityCredential, TokenCredential,
};
use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use reqwest::Url;
use secrecy::SecretString;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Client-secret credential read from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
/// and `AZURE_CLIENT_SECRET` on first use.
#[derive(Debug)]
pub struct EnvironmentCredential {
    authority: Url,
    inner: OnceCell<ClientSecretCredential>,
}

impl EnvironmentCredential {
    /// Create a credential authenticating against `authority`.
    #[must_use]
    pub fn new(authority: Url) -> Self {
        Self {
            authority,
            inner: OnceCell::new(),
        }
    }

    fn read_environment(&self) -> Result<ClientSecretCredential> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| KeyVaultError::authentication(format!("{name} is not set")))
        };
        let tenant = read(AZURE_TENANT_ID)?;
        let client = read(AZURE_CLIENT_ID)?;
        let secret = read(AZURE_CLIENT_SECRET)?;
        ClientSecretCredential::new(&tenant, &client, SecretString::from(secret), &self.authority)
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &str {
        "environment"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let credential = self
            .inner
            .get_or_try_init(|| async { self.read_environment() })
            .await?;
        credential.get_token(scope).await
    }
}

/// Ordered chain of credentials.
///
/// Sources are tried in order until one yields a token; that source is then
/// used for every later request.
#[derive(Debug)]
pub struct DefaultCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
    selected: OnceLock<usize>,
}

impl DefaultCredential {
    /// The standard chain: environment, managed identity, Azure CLI.
    pub fn new(authority: &Url, tenant_id: Option<&str>) -> Result<Self> {
        let sources: Vec<Arc<dyn TokenCredential>> = vec![
            Arc::new(EnvironmentCredential::new(authority.clone())),
            Arc::new(ManagedIdentityCredential::new(None)?),
            Arc::new(AzureCliCredential::new(tenant_id.map(str::to_string))),
        ];
        Ok(Self::from_sources(sources))
    }

    /// A chain of explicit sources.
    #[must_use]
    pub fn from_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            selected: OnceLock::new(),
        }
    }

    /// Names of the sources in the order they are tried.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    fn name(&self) -> &str {
        "default"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(source) = self.selected.get().and_then(|&i| self.sources.get(i)) {
            return source.get_token(scope).await;
        }

        let mut failures = Vec::new();
        for (index, source) in self.sources.iter().enumerate() {
            match source.get_token(scope).await {
                Ok(token) => {
                    tracing::debug!(credential = source.name(), "Selected credential");
                    let _ = self.selected.set(index);
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!(credential = source.name(), error = %e, "Credential unavailable");
                    failures.push(format!("{}: {e}", source.name()));
                }
            }
        }
        Err(KeyVaultError::authentication(format!(
            "no credential produced a token ({})",
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        token: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, token: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                token,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenCredential for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token
                .map(|t| AccessToken::new(t, Duration::from_secs(3600)))
                .ok_or_else(|| KeyVaultError::authentication(format!("{} failed", self.name)))
        }
    }

    #[tokio::test]
    async fn test_first_working_source_is_remembered() {
        let failing = Fixed::new("first", None);
        let working = Fixed::new("second", Some("tok"));
        let sources: Vec<Arc<dyn TokenCredential>> = vec![failing.clone(), working.clone()];
        let chain = DefaultCredential::from_sources(sources);

        let token = chain.get_token("scope").await.unwrap();
        assert_eq!(token.token.expose_secret(), "tok");
        chain.get_token("scope").await.unwrap();

        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_sources_failing() {
        let sources: Vec<Arc<dyn TokenCredential>> =
            vec![Fixed::new("one", None), Fixed::new("two", None)];
        let chain = DefaultCredential::from_sources(sources);
        let err = chain.get_token("scope").await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, KeyVaultError::Authentication { .. }));
        assert!(msg.contains("one failed"));
        assert!(msg.contains("two failed"));
    }

    #[tokio::test]
    async fn test_environment_credential_without_variables() {
        let authority = Url::parse("https://login.example.com/").unwrap();
        let credential = EnvironmentCredential::new(authority);
        temp_env::async_with_vars(
            [
                (AZURE_TENANT_ID, None::<&str>),
                (AZURE_CLIENT_ID, None),
                (AZURE_CLIENT_SECRET, None),
            ],
            async {
                let err = credential.get_token("scope").await.unwrap_err();
                assert!(err.to_string().contains(AZURE_TENANT_ID));
            },
        )
        .await;
    }
}
