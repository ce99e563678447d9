//! Managed identity through the instance metadata service.

use super::{AccessToken, TokenCache, TokenCredential, read_token_response, token_http_client};
use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const IMDS_TIMEOUT: Duration = Duration::from_secs(3);

/// Credential of the managed identity assigned to the host.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    endpoint: Url,
    client_id: Option<String>,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    /// Create a credential for the system-assigned identity, or for the
    /// user-assigned identity `client_id`.
    pub fn new(client_id: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(IMDS_ENDPOINT)
            .map_err(|e| KeyVaultError::invalid_argument("endpoint", e.to_string()))?;
        let http = token_http_client(IMDS_TIMEOUT)?;
        Ok(Self {
            endpoint,
            client_id: client_id.filter(|c| !c.trim().is_empty()),
            http,
            cache: TokenCache::default(),
        })
    }

    /// Query a different metadata endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", IMDS_API_VERSION);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        tracing::debug!(endpoint = %self.endpoint, "Requesting managed identity token");
        let response = self.http.get(url).header("Metadata", "true").send().await;
        read_token_response(self.name(), response).await
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        "managed-identity"
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
    use crate::credential::VAULT_SCOPE;
    use secrecy::ExposeSecret;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_imds_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("resource", "https://vault.azure.net"))
            .and(query_param("api-version", IMDS_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mi-token",
                "expires_in": "3599",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint =
            Url::parse(&format!("{}/metadata/identity/oauth2/token", server.uri())).unwrap();
        let credential = ManagedIdentityCredential::new(None)
            .unwrap()
            .with_endpoint(endpoint);

        let token = credential.get_token(VAULT_SCOPE).await.unwrap();
        assert_eq!(token.token.expose_secret(), "mi-token");
        // Second call is served from the cache.
        credential.get_token(VAULT_SCOPE).await.unwrap();
    }

    #[tokio::test]
    async fn test_imds_rejection_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "Identity not found"
            })))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/token", server.uri())).unwrap();
        let credential = ManagedIdentityCredential::new(Some("app".to_string()))
            .unwrap()
            .with_endpoint(endpoint);

        let err = credential.get_token(VAULT_SCOPE).await.unwrap_err();
        assert!(matches!(err, KeyVaultError::Authentication { .. }));
        assert!(err.to_string().contains("Identity not found"));
    }
}
