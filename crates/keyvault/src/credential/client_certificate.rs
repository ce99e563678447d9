//! OAuth2 client-credentials flow with a certificate-signed assertion.

use super::{
    AccessToken, TokenCache, TokenCredential, read_token_response, token_endpoint,
    token_http_client,
};
use crate::certificate::Certificate;
use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 600;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: u64,
    iat: u64,
    exp: u64,
}

/// Credential authenticating an application with a certificate.
///
/// Each token request carries a short-lived RS256 JWT signed with the
/// certificate's private key and identified by its `x5t` thumbprint.
pub struct ClientCertificateCredential {
    client_id: String,
    token_url: Url,
    thumbprint: String,
    x5t: String,
    key: EncodingKey,
    http: reqwest::Client,
    cache: TokenCache,
}

impl std::fmt::Debug for ClientCertificateCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificateCredential")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url.as_str())
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl ClientCertificateCredential {
    /// Create a credential for `tenant_id`/`client_id` using `certificate`.
    ///
    /// The certificate must carry an RSA private key.
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        certificate: &Certificate,
        authority: &Url,
    ) -> Result<Self> {
        if tenant_id.trim().is_empty() || client_id.trim().is_empty() {
            return Err(KeyVaultError::auth_config(
                "certificate credential requires TenantId and ClientId",
            ));
        }
        let private_key = certificate.private_key().ok_or_else(|| {
            KeyVaultError::auth_config(format!(
                "certificate {} has no private key",
                certificate.thumbprint()
            ))
        })?;
        let key = EncodingKey::from_rsa_pem(private_key.to_pem().as_bytes()).map_err(|e| {
            KeyVaultError::auth_config(format!(
                "certificate {} does not hold a usable RSA key: {e}",
                certificate.thumbprint()
            ))
        })?;

        let digest =
            ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, certificate.der());
        Ok(Self {
            client_id: client_id.trim().to_string(),
            token_url: token_endpoint(authority, tenant_id.trim())?,
            thumbprint: certificate.thumbprint().to_string(),
            x5t: URL_SAFE_NO_PAD.encode(digest.as_ref()),
            key,
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

    fn client_assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let claims = AssertionClaims {
            aud: self.token_url.as_str(),
            iss: &self.client_id,
            sub: &self.client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.x5t.clone());
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| KeyVaultError::auth_config(format!("failed to sign client assertion: {e}")))
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let assertion = self.client_assertion()?;
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("scope", scope),
            ("grant_type", "client_credentials"),
        ];
        tracing::debug!(
            client_id = %self.client_id,
            thumbprint = %self.thumbprint,
            "Requesting token with client certificate"
        );
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
impl TokenCredential for ClientCertificateCredential {
    fn name(&self) -> &str {
        "client-certificate"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scope, || self.request_token(scope))
            .await
    }
}
