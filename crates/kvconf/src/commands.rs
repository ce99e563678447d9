//! Command implementations.

use crate::cli::{Commands, ConfigOptions};
use crate::errors::{CliError, EXIT_OK, EXIT_RUNTIME};
use indexmap::IndexMap;
use kvconf_config::{
    Configuration, ConfigurationBuilder, EnvironmentAliases, resolve_override_origins,
};
use kvconf_keyvault::{
    BootstrapFlags, Bootstrapper, KEY_VAULT_SOURCE, KeyVaultError, KeyVaultProviderFactory,
    ProviderFactory, SecretProvider, bootstrap_configuration,
};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Placeholder printed instead of secret values.
pub const REDACTED: &str = "***";

/// Layer the configured sources: JSON files, environment variables, then
/// `--set` values.
pub fn configuration_builder(options: &ConfigOptions) -> ConfigurationBuilder {
    let mut builder = ConfigurationBuilder::new();
    for path in &options.files {
        builder = builder.add_json_file(path);
    }
    for path in &options.optional_files {
        builder = builder.add_optional_json_file(path);
    }
    builder = builder.add_environment_variables(options.env_prefix.as_deref());
    if !options.overrides.is_empty() {
        builder = builder.add_command_line(options.overrides.iter().cloned());
    }
    builder
}

/// Bootstrapper honouring `--section-prefix` and `--timeout-secs`.
pub fn bootstrapper(options: &ConfigOptions) -> Bootstrapper {
    let mut bootstrapper = Bootstrapper::new();
    if let Some(prefix) = &options.section_prefix {
        bootstrapper = bootstrapper.with_section_prefix(prefix.as_str());
    }
    if let Some(seconds) = options.timeout_secs {
        bootstrapper = bootstrapper.with_timeout(Duration::from_secs(seconds));
    }
    bootstrapper
}

fn flags(options: &ConfigOptions, project_environment: bool) -> Result<BootstrapFlags, CliError> {
    Ok(BootstrapFlags {
        environment_overrides: Some(EnvironmentAliases::parse(&options.aliases)?),
        project_environment,
    })
}

/// Run a parsed command and return the process exit code.
pub async fn run(command: Commands, options: &ConfigOptions) -> Result<i32, CliError> {
    match command {
        Commands::Secrets {
            names,
            raw_names,
            show_values,
        } => secrets(options, &names, raw_names, show_values).await,
        Commands::Show {
            show_values,
            no_vault,
        } => show(options, show_values, no_vault).await,
        Commands::Exec { command } => exec(options, &command).await,
    }
}

async fn with_timeout<T>(
    seconds: Option<u64>,
    operation: impl Future<Output = kvconf_keyvault::Result<T>>,
) -> Result<T, CliError> {
    match seconds {
        Some(seconds) => {
            let timeout = Duration::from_secs(seconds);
            tokio::time::timeout(timeout, operation)
                .await
                .map_err(|_| KeyVaultError::timeout("fetch secrets", timeout))?
                .map_err(CliError::from)
        }
        None => operation.await.map_err(CliError::from),
    }
}

async fn secrets(
    options: &ConfigOptions,
    names: &[String],
    raw_names: bool,
    show_values: bool,
) -> Result<i32, CliError> {
    let config = configuration_builder(options).build()?;
    let bootstrapper = bootstrapper(options);
    let settings = bootstrapper.settings(&config)?;
    if !settings.enabled {
        return Err(CliError::VaultDisabled {
            section: bootstrapper.section(),
        });
    }

    let provider = KeyVaultProviderFactory::new().create(&settings)?;
    let requested = (!names.is_empty()).then_some(names);
    let secrets = with_timeout(
        options.timeout_secs,
        provider.get_secrets(requested, !raw_names),
    )
    .await?;

    println!("{}", render_secrets(&secrets, show_values)?);
    Ok(EXIT_OK)
}

fn render_secrets(secrets: &IndexMap<String, String>, show_values: bool) -> Result<String, CliError> {
    let output: IndexMap<&str, &str> = secrets
        .iter()
        .map(|(key, value)| {
            let value = if show_values { value.as_str() } else { REDACTED };
            (key.as_str(), value)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&output)?)
}

#[derive(Debug, Serialize)]
struct ShowLine<'a> {
    key: &'a str,
    value: &'a str,
    provider: &'a str,
}

async fn show(
    options: &ConfigOptions,
    show_values: bool,
    no_vault: bool,
) -> Result<i32, CliError> {
    let aliases = EnvironmentAliases::parse(&options.aliases)?;
    let mut builder = configuration_builder(options);
    if !no_vault {
        builder = bootstrapper(options).add_key_vault(builder).await?;
    }

    for line in render_with_overrides(builder, &aliases, show_values)? {
        println!("{line}");
    }
    Ok(EXIT_OK)
}

/// Apply environment overrides to `builder` and render the result,
/// redacting every value that originates from the vault layer.
fn render_with_overrides(
    builder: ConfigurationBuilder,
    aliases: &EnvironmentAliases,
    show_values: bool,
) -> Result<Vec<String>, CliError> {
    let layered = builder.build()?;
    let sensitive = vault_supplied_keys(&layered, aliases);
    let config = builder.with_environment_overrides(aliases)?.build()?;
    render_lines(&config, &sensitive, show_values)
}

/// Folded keys whose final value comes from the vault, either directly or
/// promoted by an environment override.
fn vault_supplied_keys(layered: &Configuration, aliases: &EnvironmentAliases) -> HashSet<String> {
    let from_vault = |key: &str| layered.provider(key) == Some(KEY_VAULT_SOURCE);
    let mut keys: HashSet<String> = layered
        .iter()
        .map(|(key, _)| key)
        .filter(|key| from_vault(key))
        .map(str::to_lowercase)
        .collect();
    for (promoted, source) in resolve_override_origins(layered, aliases) {
        if from_vault(&source) {
            keys.insert(promoted.to_lowercase());
        } else {
            keys.remove(&promoted.to_lowercase());
        }
    }
    keys
}

/// One JSON object per entry; keys in `sensitive` are redacted unless
/// `show_values` is set.
fn render_lines(
    config: &Configuration,
    sensitive: &HashSet<String>,
    show_values: bool,
) -> Result<Vec<String>, CliError> {
    config
        .iter()
        .map(|(key, value)| {
            let provider = config.provider(key).unwrap_or_default();
            let value = if !show_values && sensitive.contains(&key.to_lowercase()) {
                REDACTED
            } else {
                value
            };
            Ok(serde_json::to_string(&ShowLine {
                key,
                value,
                provider,
            })?)
        })
        .collect()
}

async fn exec(options: &ConfigOptions, command: &[String]) -> Result<i32, CliError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(EXIT_OK);
    };

    let flags = flags(options, true)?;
    let config =
        bootstrap_configuration(configuration_builder(options), &bootstrapper(options), &flags)
            .await?;
    tracing::debug!(
        program = %program,
        entries = config.len(),
        "Running command with projected configuration"
    );

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| CliError::Spawn {
            program: program.clone(),
            source,
        })?;

    Ok(status.code().unwrap_or_else(|| {
        tracing::warn!(program = %program, "Command terminated by a signal");
        EXIT_RUNTIME
    }))
}
