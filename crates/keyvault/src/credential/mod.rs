//! Token credentials for the vault.
//!
//! Every credential implements [`TokenCredential`] and caches its token until
//! shortly before expiry. [`CredentialResolver`] picks the credential for a
//! set of [`VaultSettings`](crate::VaultSettings).

mod azure_cli;
mod client_certificate;
mod client_secret;
mod default;
mod managed_identity;
mod resolver;

pub use azure_cli::AzureCliCredential;
pub use client_certificate::ClientCertificateCredential;
pub use client_secret::ClientSecretCredential;
pub use default::{DefaultCredential, EnvironmentCredential};
pub use managed_identity::ManagedIdentityCredential;
pub use resolver::CredentialResolver;

use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use reqwest::Url;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// OAuth scope granting access to Key Vault data.
pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Environment variable holding the tenant id.
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable holding the client id.
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable holding the client secret.
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    /// Bearer token.
    pub token: SecretString,
    /// Point in time after which the token is rejected.
    pub expires_at: SystemTime,
}

impl AccessToken {
    /// Create a token valid for `lifetime` from now.
    #[must_use]
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at: SystemTime::now() + lifetime,
        }
    }

    /// Whether the token is still usable, keeping a refresh margin.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN < self.expires_at
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync + Debug {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Get a token for `scope`.
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Per-scope token cache shared by the credential implementations.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    /// Return the cached token for `scope` or fetch and store a new one.
    pub(crate) async fn get_or_fetch<F, Fut>(&self, scope: &str, fetch: F) -> Result<AccessToken>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<AccessToken>> + Send,
    {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(scope)
            && token.is_fresh()
        {
            return Ok(token.clone());
        }
        let token = fetch().await?;
        tokens.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

/// Response of the identity provider token endpoints.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Accept seconds as a number or a numeric string (IMDS sends strings).
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// HTTP client for token requests, bounded by `timeout` per request.
pub(crate) fn token_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| KeyVaultError::auth_config(format!("failed to build HTTP client: {e}")))
}

/// Token endpoint of a tenant: `{authority}{tenant}/oauth2/v2.0/token`.
pub(crate) fn token_endpoint(authority: &Url, tenant_id: &str) -> Result<Url> {
    authority
        .join(&format!("{tenant_id}/oauth2/v2.0/token"))
        .map_err(|e| KeyVaultError::invalid_argument("TenantId", e.to_string()))
}

/// Turn a token endpoint response into an [`AccessToken`].
///
/// 4xx answers are credential rejections; 5xx, 429 and transport failures are
/// transient.
pub(crate) async fn read_token_response(
    credential: &str,
    response: std::result::Result<reqwest::Response, reqwest::Error>,
) -> Result<AccessToken> {
    let response = response.map_err(|e| {
        KeyVaultError::transient(format!("{credential} token request"), e.to_string())
    })?;
    let status = response.status();
    if status.is_success() {
        let body: TokenResponse = response.json().await.map_err(|e| {
            KeyVaultError::authentication(format!("{credential}: invalid token response: {e}"))
        })?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        return Ok(AccessToken::new(body.access_token, lifetime));
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<TokenErrorResponse>(&text)
        .ok()
        .and_then(|e| e.error_description.or(e.error))
        .unwrap_or(text);
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(KeyVaultError::transient(
            format!("{credential} token request"),
            format!("{status}: {detail}"),
        ));
    }
    Err(KeyVaultError::authentication(format!(
        "{credential} rejected ({status}): {detail}"
    )))
}
