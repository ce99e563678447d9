//! Key Vault secrets REST client.

use crate::credential::{TokenCredential, VAULT_SCOPE};
use crate::error::{KeyVaultError, Result};
use crate::retry::{RetryConfig, retry_with_backoff};
use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// REST API version spoken by the client.
pub const API_VERSION: &str = "7.4";

/// Default timeout of a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SecretListPage {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(default, rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

#[derive(Debug, Deserialize)]
struct SecretAttributes {
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl Default for SecretAttributes {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Client for the secrets endpoints of one vault.
///
/// Every request is authenticated with a bearer token from the credential
/// and retried according to the [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct SecretClient {
    endpoint: Url,
    credential: Arc<dyn TokenCredential>,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl SecretClient {
    /// Create a client for the vault at `endpoint`.
    pub fn new(endpoint: Url, credential: Arc<dyn TokenCredential>) -> Result<Self> {
        if endpoint.cannot_be_a_base() {
            return Err(KeyVaultError::invalid_argument(
                "endpoint",
                format!("'{endpoint}' is not a base URL"),
            ));
        }
        Ok(Self {
            endpoint,
            credential,
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            retry: RetryConfig::default(),
        })
    }

    /// Use a different retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Limit each HTTP request to `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http_client(timeout)?;
        Ok(self)
    }

    /// Vault endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Names of all enabled secrets, in the order the vault lists them.
    pub async fn list_enabled_secret_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next = Some(self.secrets_url(None)?);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            pages += 1;
            let page: SecretListPage = retry_with_backoff(&self.retry, "list secrets", || {
                self.get_json(url.clone(), "list secrets", None)
            })
            .await?;

            for item in page.value {
                let Some(name) = item.id.trim_end_matches('/').rsplit('/').next() else {
                    continue;
                };
                if item.attributes.enabled {
                    names.push(name.to_string());
                } else {
                    tracing::trace!(secret = name, "Skipping disabled secret");
                }
            }

            next = match page.next_link.filter(|l| !l.is_empty()) {
                Some(link) => Some(self.next_page_url(&link)?),
                None => None,
            };
        }

        tracing::debug!(
            vault = %self.endpoint,
            secret_count = names.len(),
            pages,
            "Listed enabled secrets"
        );
        Ok(names)
    }

    /// Current value of the secret `name`.
    pub async fn get_secret_value(&self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(KeyVaultError::invalid_argument(
                "name",
                "secret name must not be blank",
            ));
        }
        let url = self.secrets_url(Some(name))?;
        let bundle: SecretBundle = retry_with_backoff(&self.retry, "get secret", || {
            self.get_json(url.clone(), "get secret", Some(name))
        })
        .await?;
        tracing::trace!(secret = name, "Fetched secret");
        Ok(bundle.value)
    }

    /// Parse a `nextLink`. The bearer token is only ever sent to the vault's
    /// own origin.
    fn next_page_url(&self, link: &str) -> Result<Url> {
        let invalid = |message: String| KeyVaultError::VaultRequest {
            operation: "list secrets".to_string(),
            status: StatusCode::OK.as_u16(),
            message,
        };
        let url = Url::parse(link).map_err(|e| invalid(format!("invalid nextLink '{link}': {e}")))?;
        if url.origin() != self.endpoint.origin() {
            return Err(invalid(format!(
                "nextLink '{link}' leaves the vault origin '{}'",
                self.endpoint.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    /// `{endpoint}secrets[/{name}]?api-version=…`
    fn secrets_url(&self, name: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                KeyVaultError::invalid_argument("endpoint", "endpoint is not a base URL")
            })?;
            segments.pop_if_empty().push("secrets");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        operation: &str,
        secret: Option<&str>,
    ) -> Result<T> {
        let token = self.credential.get_token(VAULT_SCOPE).await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.token.expose_secret())
            .send()
            .await
            .map_err(|e| KeyVaultError::transient(operation, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| KeyVaultError::VaultRequest {
                operation: operation.to_string(),
                status: status.as_u16(),
                message: format!("invalid response body: {e}"),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(operation, status, &body, secret))
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| KeyVaultError::invalid_argument("http client", e.to_string()))
}

/// Map a failed response to an error.
fn classify_failure(
    operation: &str,
    status: StatusCode,
    body: &str,
    secret: Option<&str>,
) -> KeyVaultError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (code, message) => message.or(code).unwrap_or_default(),
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    match (status, secret) {
        (StatusCode::NOT_FOUND, Some(name)) => KeyVaultError::SecretNotFound {
            name: name.to_string(),
        },
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            KeyVaultError::authentication(format!("{operation} ({status}): {message}"))
        }
        (StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS, _) => {
            KeyVaultError::transient(operation, format!("{status}: {message}"))
        }
        (s, _) if s.is_server_error() => {
            KeyVaultError::transient(operation, format!("{status}: {message}"))
        }
        _ => KeyVaultError::VaultRequest {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert!(matches!(
            classify_failure("get secret", StatusCode::NOT_FOUND, "", Some("db")),
            KeyVaultError::SecretNotFound { name } if name == "db"
        ));
        assert!(matches!(
            classify_failure("list secrets", StatusCode::NOT_FOUND, "", None),
            KeyVaultError::VaultRequest { status: 404, .. }
        ));
        assert!(matches!(
            classify_failure("get secret", StatusCode::FORBIDDEN, "", Some("db")),
            KeyVaultError::Authentication { .. }
        ));
        assert!(matches!(
            classify_failure("get secret", StatusCode::TOO_MANY_REQUESTS, "", Some("db")),
            KeyVaultError::Transient { .. }
        ));
        assert!(matches!(
            classify_failure("get secret", StatusCode::BAD_GATEWAY, "", Some("db")),
            KeyVaultError::Transient { .. }
        ));
        assert!(matches!(
            classify_failure("get secret", StatusCode::BAD_REQUEST, "", Some("db")),
            KeyVaultError::VaultRequest { status: 400, .. }
        ));
    }

    #[test]
    fn test_error_body_message() {
        let body = r#"{"error":{"code":"Forbidden","message":"Access denied"}}"#;
        let err = classify_failure("list secrets", StatusCode::FORBIDDEN, body, None);
        assert!(err.to_string().contains("Forbidden: Access denied"));
    }

    #[test]
    fn test_list_page_parsing() {
        let page: SecretListPage = serde_json::from_str(
            r#"{
                "value": [
                    {"id": "https://v.vault.azure.net/secrets/A--B", "attributes": {"enabled": true}},
                    {"id": "https://v.vault.azure.net/secrets/Off", "attributes": {"enabled": false}},
                    {"id": "https://v.vault.azure.net/secrets/NoAttrs"}
                ],
                "nextLink": null
            }"#,
        )
        .unwrap();
        assert_eq!(page.value.len(), 3);
        assert!(!page.value[1].attributes.enabled);
        assert!(page.value[2].attributes.enabled);
        assert!(page.next_link.is_none());
    }
}
