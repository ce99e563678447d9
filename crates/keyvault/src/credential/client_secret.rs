//! OAuth2 client-credentials flow with a shared secret.

use super::{
    AccessToken, TokenCache, TokenCredential, read_token_response, token_endpoint,
    token_http_client,
};
use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

/// Credential authenticating an application with its client secret.
#[derive(Debug)]
pub struct ClientSecretCredential {
    client_id: String,
    secret: SecretString,
    token_url: Url,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ClientSecretCredential {
    /// Create a credential for `tenant_id`/`client_id` against `authority`.
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        secret: SecretString,
        authority: &Url,
    ) -> Result<Self> {
        if tenant_id.trim().is_empty() || client_id.trim().is_empty() {
            return Err(KeyVaultError::auth_config(
                "client secret credential requires TenantId and ClientId",
            ));
        }
        if secret.expose_secret().trim().is_empty() {
            return Err(KeyVaultError::auth_config(
                "client secret credential requires ClientSecret",
            ));
        }
        Ok(Self {
            client_id: client_id.trim().to_string(),
            secret,
            token_url: token_endpoint(authority, tenant_id.trim())?,
            http: token_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            cache: TokenCache::default(),
        })
    }

    /// Use a specific HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.secret.expose_secret()),
            ("scope", scope),
            ("grant_type", "client_credentials"),
        ];
        tracing::debug!(client_id = %self.client_id, "Requesting token with client secret");
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await;
        read_token_response(self.name(), response).await
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &str {
        "client-secret"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scope, || self.request_token(scope))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> Url {
        Url::parse("https://login.example.com/").unwrap()
    }

    #[test]
    fn test_requires_identity() {
        let err = ClientSecretCredential::new(
            "",
            "client",
            SecretString::from("s".to_string()),
            &authority(),
        )
        .unwrap_err();
        assert!(matches!(err, KeyVaultError::AuthenticationConfig { .. }));
    }

    #[test]
    fn test_requires_secret() {
        let err = ClientSecretCredential::new(
            "tenant",
            "client",
            SecretString::from("  ".to_string()),
            &authority(),
        )
        .unwrap_err();
        assert!(matches!(err, KeyVaultError::AuthenticationConfig { .. }));
    }

    #[test]
    fn test_debug_hides_secret() {
        let credential = ClientSecretCredential::new(
            "tenant",
            "client",
            SecretString::from("very-secret".to_string()),
            &authority(),
        )
        .unwrap();
        assert!(!format!("{credential:?}").contains("very-secret"));
    }
}
