//! Tokens from the Azure CLI login.

use super::{AccessToken, TokenCache, TokenCredential};
use crate::error::{KeyVaultError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::Command;

/// Lifetime assumed when the CLI does not report an expiry.
const FALLBACK_LIFETIME: Duration = Duration::from_secs(600);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Unix timestamp; `expiresOn` holds a local date string instead.
    #[serde(default, rename = "expires_on")]
    expires_on: Option<u64>,
}

/// Credential using `az account get-access-token`.
#[derive(Debug)]
pub struct AzureCliCredential {
    program: String,
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AzureCliCredential {
    /// Create a credential, optionally pinned to a tenant.
    #[must_use]
    pub fn new(tenant_id: Option<String>) -> Self {
        Self {
            program: "az".to_string(),
            tenant_id: tenant_id.filter(|t| !t.trim().is_empty()),
            cache: TokenCache::default(),
        }
    }

    /// Run a different executable instead of `az`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);
        let mut command = Command::new(&self.program);
        command.args([
            "account",
            "get-access-token",
            "--resource",
            resource,
            "--output",
            "json",
        ]);
        if let Some(tenant) = &self.tenant_id {
            command.args(["--tenant", tenant]);
        }

        tracing::debug!(program = %self.program, "Requesting token from Azure CLI");
        let output = command.output().await.map_err(|e| {
            KeyVaultError::authentication(format!("failed to execute {}: {e}", self.program))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KeyVaultError::authentication(format!(
                "{} account get-access-token failed: {}",
                self.program,
                stderr.trim()
            )));
        }

        let token: CliToken = serde_json::from_slice(&output.stdout).map_err(|e| {
            KeyVaultError::authentication(format!("unexpected Azure CLI output: {e}"))
        })?;
        let lifetime = token
            .expires_on
            .and_then(|expires_on| {
                let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
                expires_on.checked_sub(now)
            })
            .map_or(FALLBACK_LIFETIME, Duration::from_secs);
        Ok(AccessToken::new(token.access_token, lifetime))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &str {
        "azure-cli"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scope, || self.request_token(scope))
            .await
    }
}
