//! Error types for vault integration.

use kvconf_config::ConfigError;
use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the vault error type.
pub type Result<T> = std::result::Result<T, KeyVaultError>;

/// Errors raised while resolving credentials or fetching secrets.
#[derive(Error, Debug, Diagnostic)]
pub enum KeyVaultError {
    /// Settings could not be bound from configuration.
    #[error(transparent)]
    #[diagnostic(code(kvconf_keyvault::config_binding))]
    ConfigBinding(#[from] ConfigError),

    /// A required argument or setting is missing or malformed.
    #[error("Invalid argument '{argument}': {message}")]
    #[diagnostic(code(kvconf_keyvault::invalid_argument))]
    InvalidArgument {
        /// Argument or setting name
        argument: String,
        /// What is wrong with it
        message: String,
    },

    /// A certificate store could not be opened or read.
    #[error("Failed to read certificate store {}: {message}", path.display())]
    #[diagnostic(code(kvconf_keyvault::certificate_store))]
    CertificateStore {
        /// Store directory
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// No certificate in the store has the requested thumbprint.
    #[error("Certificate with thumbprint '{thumbprint}' not found in store '{store}'")]
    #[diagnostic(
        code(kvconf_keyvault::certificate_not_found),
        help("Install the certificate as a PEM file in the store directory")
    )]
    CertificateNotFound {
        /// Normalised thumbprint
        thumbprint: String,
        /// Store description
        store: String,
    },

    /// More than one certificate in the store has the requested thumbprint.
    #[error("{count} certificates with thumbprint '{thumbprint}' found in store '{store}'")]
    #[diagnostic(
        code(kvconf_keyvault::ambiguous_certificate),
        help("Remove the duplicate certificates so exactly one remains")
    )]
    AmbiguousCertificate {
        /// Normalised thumbprint
        thumbprint: String,
        /// Store description
        store: String,
        /// Number of matches
        count: usize,
    },

    /// The settings do not describe a usable credential.
    #[error("Invalid authentication configuration: {message}")]
    #[diagnostic(
        code(kvconf_keyvault::authentication_config),
        help("Set TenantId and ClientId with either ClientSecret or CertificateThumbprint")
    )]
    AuthenticationConfig {
        /// What is missing or wrong
        message: String,
    },

    /// The identity provider or the vault rejected the credential.
    #[error("Authentication failed: {message}")]
    #[diagnostic(code(kvconf_keyvault::authentication))]
    Authentication {
        /// Failure reported by the service
        message: String,
    },

    /// A named secret does not exist or is disabled.
    #[error("Secret '{name}' not found in vault")]
    #[diagnostic(code(kvconf_keyvault::secret_not_found))]
    SecretNotFound {
        /// Secret name
        name: String,
    },

    /// Two secrets map to the same configuration key.
    #[error("Secrets '{first}' and '{second}' both map to configuration key '{key}'")]
    #[diagnostic(
        code(kvconf_keyvault::secret_name_collision),
        help("Rename one of the secrets or fetch without name normalization")
    )]
    SecretNameCollision {
        /// Resulting configuration key
        key: String,
        /// First secret name
        first: String,
        /// Second secret name
        second: String,
    },

    /// The vault stayed unreachable after every retry.
    #[error("Vault unavailable during '{operation}' after {attempts} attempts: {last_error}")]
    #[diagnostic(code(kvconf_keyvault::vault_unavailable))]
    VaultUnavailable {
        /// Operation that was retried
        operation: String,
        /// Number of attempts made
        attempts: usize,
        /// Last error seen
        last_error: String,
    },

    /// A retryable transport or service failure for one attempt.
    #[error("Transient vault failure during '{operation}': {message}")]
    #[diagnostic(code(kvconf_keyvault::transient))]
    Transient {
        /// Operation being performed
        operation: String,
        /// Failure detail
        message: String,
    },

    /// The vault answered with an unexpected status or body.
    #[error("Vault request '{operation}' failed with status {status}: {message}")]
    #[diagnostic(code(kvconf_keyvault::vault_request))]
    VaultRequest {
        /// Operation being performed
        operation: String,
        /// HTTP status code (0 when the body could not be decoded)
        status: u16,
        /// Response detail
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("'{operation}' timed out after {timeout:?}")]
    #[diagnostic(code(kvconf_keyvault::timeout))]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },
}

impl KeyVaultError {
    /// Create an invalid-argument error.
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Create an authentication configuration error.
    pub fn auth_config(message: impl Into<String>) -> Self {
        Self::AuthenticationConfig {
            message: message.into(),
        }
    }

    /// Create an authentication failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a transient failure.
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a retry-exhausted error.
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: usize,
        last_error: impl Into<String>,
    ) -> Self {
        Self::VaultUnavailable {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Whether the error comes from invalid configuration rather than the
    /// vault or the network.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigBinding(_)
                | Self::InvalidArgument { .. }
                | Self::CertificateStore { .. }
                | Self::CertificateNotFound { .. }
                | Self::AmbiguousCertificate { .. }
                | Self::AuthenticationConfig { .. }
                | Self::Authentication { .. }
        )
    }
}
