//! Vault settings bound from configuration.

use crate::certificate::{StoreLocation, StoreName};
use crate::error::{KeyVaultError, Result};
use kvconf_config::{Configuration, combine_path, de};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Name of the configuration section holding vault settings.
pub const KEY_VAULT_SECTION: &str = "KeyVault";

/// Default identity provider host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Settings of the vault integration, read from the `KeyVault` section.
///
/// ```json
/// {
///   "KeyVault": {
///     "Enabled": true,
///     "Name": "my-vault",
///     "TenantId": "…",
///     "ClientId": "…",
///     "ClientSecret": "…",
///     "CertificateThumbprint": "…"
///   }
/// }
/// ```
#[derive(Clone, Deserialize)]
pub struct VaultSettings {
    /// Whether secrets are loaded from the vault at all.
    #[serde(default, deserialize_with = "de::bool_from_str")]
    pub enabled: bool,

    /// Vault name, used to derive the endpoint.
    #[serde(default)]
    pub name: String,

    /// Directory (tenant) id.
    #[serde(default, rename = "tenantid")]
    pub tenant_id: String,

    /// Application (client) id.
    #[serde(default, rename = "clientid")]
    pub client_id: String,

    /// Client secret for client-credential authentication.
    #[serde(
        default = "empty_secret",
        rename = "clientsecret",
        deserialize_with = "secret_from_str"
    )]
    pub client_secret: SecretString,

    /// Thumbprint of a certificate used instead of the client secret.
    #[serde(default, rename = "certificatethumbprint")]
    pub certificate_thumbprint: Option<String>,

    /// Explicit vault endpoint, overriding the one derived from `name`.
    #[serde(default)]
    pub uri: Option<String>,

    /// Identity provider host.
    #[serde(default = "default_authority_host", rename = "authorityhost")]
    pub authority_host: String,

    /// Store searched for the certificate.
    #[serde(
        default,
        rename = "certificatestorename",
        deserialize_with = "parse_from_str"
    )]
    pub certificate_store_name: StoreName,

    /// Location of the certificate store.
    #[serde(
        default,
        rename = "certificatestorelocation",
        deserialize_with = "parse_from_str"
    )]
    pub certificate_store_location: StoreLocation,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn secret_from_str<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn parse_from_str<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: String::new(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: empty_secret(),
            certificate_thumbprint: None,
            uri: None,
            authority_host: default_authority_host(),
            certificate_store_name: StoreName::default(),
            certificate_store_location: StoreLocation::default(),
        }
    }
}

impl fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSettings")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &if self.has_client_secret() {
                    "[REDACTED]"
                } else {
                    ""
                },
            )
            .field("certificate_thumbprint", &self.certificate_thumbprint)
            .field("uri", &self.uri)
            .field("authority_host", &self.authority_host)
            .field("certificate_store_name", &self.certificate_store_name)
            .field("certificate_store_location", &self.certificate_store_location)
            .finish()
    }
}

impl VaultSettings {
    /// Bind settings from `KeyVault`, or `{prefix}:KeyVault` when a prefix is
    /// given.
    pub fn from_configuration(config: &Configuration, prefix: Option<&str>) -> Result<Self> {
        let path = section_path(prefix);
        Ok(config.section(&path).bind()?)
    }

    /// Certificate thumbprint when one is configured and not blank.
    #[must_use]
    pub fn thumbprint(&self) -> Option<&str> {
        self.certificate_thumbprint
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Whether a non-blank client secret is configured.
    #[must_use]
    pub fn has_client_secret(&self) -> bool {
        !self.client_secret.expose_secret().trim().is_empty()
    }

    /// Vault endpoint: `uri` when set, otherwise
    /// `https://{name}.vault.azure.net/`.
    pub fn endpoint(&self) -> Result<Url> {
        let raw = match self.uri.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(uri) => uri.to_string(),
            None => {
                let name = self.name.trim();
                if name.is_empty() {
                    return Err(KeyVaultError::invalid_argument(
                        "Name",
                        "a vault name or Uri is required",
                    ));
                }
                format!("https://{name}.vault.azure.net/")
            }
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| KeyVaultError::invalid_argument("Uri", format!("'{raw}': {e}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Identity provider host as a URL ending with `/`.
    pub fn authority(&self) -> Result<Url> {
        let raw = self.authority_host.trim();
        let raw = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&raw).map_err(|e| {
            KeyVaultError::invalid_argument("AuthorityHost", format!("'{raw}': {e}"))
        })
    }

    /// Check that enabled settings name a reachable vault.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.endpoint()?;
        self.authority()?;
        Ok(())
    }
}

/// Configuration path of the vault section.
#[must_use]
pub fn section_path(prefix: Option<&str>) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => combine_path(prefix, KEY_VAULT_SECTION),
        None => KEY_VAULT_SECTION.to_string(),
    }
}
