//! CLI errors and their exit codes.

use kvconf_config::ConfigError;
use kvconf_keyvault::KeyVaultError;
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use thiserror::Error;

/// Exit code for success
pub const EXIT_OK: i32 = 0;
/// Configuration or authentication error exit code
pub const EXIT_CONFIG: i32 = 2;
/// Vault or runtime error exit code
pub const EXIT_RUNTIME: i32 = 3;

/// CLI error types with exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    KeyVault(#[from] KeyVaultError),

    #[error("Key Vault integration is disabled")]
    #[diagnostic(
        code(kvconf::cli::vault_disabled),
        help("Set {section}:Enabled to true and configure {section}:Name")
    )]
    VaultDisabled { section: String },

    #[error("Failed to run '{program}'")]
    #[diagnostic(
        code(kvconf::cli::spawn_failed),
        help("Check that the command exists and is executable")
    )]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(kvconf::cli::output))]
    Output(#[from] serde_json::Error),
}

/// Map a CLI error to its exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config(_) | CliError::VaultDisabled { .. } => EXIT_CONFIG,
        CliError::KeyVault(e) if e.is_configuration() => EXIT_CONFIG,
        CliError::KeyVault(_) | CliError::Spawn { .. } | CliError::Output(_) => EXIT_RUNTIME,
    }
}

/// Print a human-friendly report to stderr
pub fn render_error(err: CliError) {
    let report = Report::new(err);
    eprintln!("{report:?}");
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(EXIT_OK, 0);
        assert_eq!(EXIT_CONFIG, 2);
        assert_eq!(EXIT_RUNTIME, 3);
    }

    #[test]
    fn test_configuration_errors_exit_with_config_code() {
        let binding = CliError::from(ConfigError::binding("KeyVault", "bad value"));
        assert_eq!(exit_code_for(&binding), EXIT_CONFIG);

        let auth = CliError::from(KeyVaultError::auth_config("partial identity"));
        assert_eq!(exit_code_for(&auth), EXIT_CONFIG);

        let disabled = CliError::VaultDisabled {
            section: "KeyVault".to_string(),
        };
        assert_eq!(exit_code_for(&disabled), EXIT_CONFIG);
    }

    #[test]
    fn test_runtime_errors_exit_with_runtime_code() {
        let missing = CliError::from(KeyVaultError::SecretNotFound {
            name: "ApiKey".to_string(),
        });
        assert_eq!(exit_code_for(&missing), EXIT_RUNTIME);

        let spawn = CliError::Spawn {
            program: "nope".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(exit_code_for(&spawn), EXIT_RUNTIME);
        assert_eq!(spawn.to_string(), "Failed to run 'nope'");
    }
}
