//! Credential selection from vault settings.

use super::{
    AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID, ClientCertificateCredential,
    ClientSecretCredential, DefaultCredential, TokenCredential,
};
use crate::certificate::CertificateLoader;
use crate::error::{KeyVaultError, Result};
use crate::settings::VaultSettings;
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Chooses the credential described by [`VaultSettings`].
///
/// - A certificate thumbprint selects certificate authentication.
/// - Tenant, client and secret together select the client-secret credential.
///   A rejection from the identity provider is reported, never retried with
///   another identity.
/// - Nothing configured falls back to the ambient chain.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    loader: CertificateLoader,
    export_environment: bool,
    ambient: Option<Vec<Arc<dyn TokenCredential>>>,
}

impl CredentialResolver {
    /// Create a resolver using the default certificate stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look certificates up with `loader`.
    #[must_use]
    pub fn with_certificate_loader(mut self, loader: CertificateLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Also write `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET` into the process environment when resolving a
    /// client-secret identity.
    ///
    /// This mutates process-wide state and must only be enabled during
    /// single-threaded startup.
    #[must_use]
    pub fn with_environment_export(mut self, export: bool) -> Self {
        self.export_environment = export;
        self
    }

    /// Replace the ambient chain (environment, managed identity, Azure CLI).
    #[must_use]
    pub fn with_ambient_sources(mut self, sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        self.ambient = Some(sources);
        self
    }

    /// Build the credential for `settings`.
    pub fn resolve(&self, settings: &VaultSettings) -> Result<Arc<dyn TokenCredential>> {
        let authority = settings.authority()?;
        let tenant = settings.tenant_id.trim();
        let client = settings.client_id.trim();

        if let Some(thumbprint) = settings.thumbprint() {
            if tenant.is_empty() || client.is_empty() {
                return Err(KeyVaultError::auth_config(
                    "certificate authentication requires TenantId and ClientId",
                ));
            }
            let certificate = self.loader.load(
                thumbprint,
                settings.certificate_store_name,
                settings.certificate_store_location,
            )?;
            let credential =
                ClientCertificateCredential::new(tenant, client, &certificate, &authority)?;
            tracing::info!(
                client_id = %client,
                thumbprint = %certificate.thumbprint(),
                "Using certificate credential"
            );
            return Ok(Arc::new(credential));
        }

        let present = [!tenant.is_empty(), !client.is_empty(), settings.has_client_secret()];
        if present.iter().all(|p| *p) {
            if self.export_environment {
                export_identity(settings)?;
            }
            let explicit = ClientSecretCredential::new(
                tenant,
                client,
                settings.client_secret.clone(),
                &authority,
            )?;
            tracing::info!(client_id = %client, "Using client secret credential");
            return Ok(Arc::new(explicit));
        }

        if present.iter().any(|p| *p) {
            return Err(KeyVaultError::auth_config(
                "TenantId, ClientId and ClientSecret must be set together",
            ));
        }

        let ambient = match &self.ambient {
            Some(sources) => DefaultCredential::from_sources(sources.clone()),
            None => DefaultCredential::new(&authority, None)?,
        };
        tracing::info!(
            sources = ?ambient.source_names(),
            "Using ambient credential discovery"
        );
        Ok(Arc::new(ambient))
    }
}

fn export_identity(settings: &VaultSettings) -> Result<()> {
    let vars = [
        (AZURE_TENANT_ID, settings.tenant_id.trim()),
        (AZURE_CLIENT_ID, settings.client_id.trim()),
        (AZURE_CLIENT_SECRET, settings.client_secret.expose_secret()),
    ];
    for (name, value) in vars {
        kvconf_config::set_process_var(name, value)
            .map_err(|e| KeyVaultError::auth_config(e.to_string()))?;
    }
    tracing::debug!("Exported client identity to the process environment");
    Ok(())
}
