use crate::tracing::{LogLevel, TracingFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kvconf")]
#[command(about = "Layered configuration with Azure Key Vault secrets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub format: TracingFormat,

    #[command(flatten)]
    pub config: ConfigOptions,
}

/// Options describing the configuration layers, lowest priority first.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOptions {
    #[arg(
        long = "config",
        short = 'c',
        global = true,
        env = "KVCONF_CONFIG",
        value_delimiter = ',',
        help = "JSON configuration file (repeatable, later files win)"
    )]
    pub files: Vec<PathBuf>,

    #[arg(
        long = "optional-config",
        global = true,
        help = "JSON configuration file that may be missing"
    )]
    pub optional_files: Vec<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "KVCONF_ENV_PREFIX",
        help = "Only read environment variables with this prefix"
    )]
    pub env_prefix: Option<String>,

    #[arg(
        long = "set",
        global = true,
        value_name = "KEY=VALUE",
        help = "Set a configuration value on the command line"
    )]
    pub overrides: Vec<String>,

    #[arg(
        long,
        global = true,
        env = "KVCONF_SECTION_PREFIX",
        help = "Read vault settings from <PREFIX>:KeyVault"
    )]
    pub section_prefix: Option<String>,

    #[arg(
        long = "alias",
        global = true,
        value_name = "CANONICAL=ALIAS,...",
        help = "Environment name aliases for TestEnvironment overrides"
    )]
    pub aliases: Vec<String>,

    #[arg(
        long,
        global = true,
        help = "Fail when loading vault secrets takes longer than this"
    )]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Fetch secrets from the configured vault")]
    Secrets {
        #[arg(long = "name", short = 'n', help = "Fetch only this secret (repeatable)")]
        names: Vec<String>,
        #[arg(long, help = "Keep `--` in secret names instead of mapping to `:`")]
        raw_names: bool,
        #[arg(long, help = "Print secret values instead of ***")]
        show_values: bool,
    },
    #[command(about = "Print the bootstrapped configuration as JSON lines")]
    Show {
        #[arg(long, help = "Print vault-supplied values instead of ***")]
        show_values: bool,
        #[arg(long, help = "Skip the vault layer")]
        no_vault: bool,
    },
    #[command(about = "Run a command with the configuration in its environment")]
    Exec {
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["kvconf", "show"]).unwrap();
        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.format, TracingFormat::Compact);
        assert!(cli.config.files.is_empty());
        assert!(cli.config.timeout_secs.is_none());
        assert!(matches!(
            cli.command,
            Commands::Show {
                show_values: false,
                no_vault: false
            }
        ));
    }

    #[test]
    fn test_cli_log_options() {
        let cli = Cli::try_parse_from(["kvconf", "--level", "debug", "--format", "json", "show"])
            .unwrap();
        assert_eq!(cli.level, LogLevel::Debug);
        assert_eq!(cli.format, TracingFormat::Json);

        let cli = Cli::try_parse_from(["kvconf", "show", "-l", "error"]).unwrap();
        assert_eq!(cli.level, LogLevel::Error);
    }

    #[test]
    fn test_cli_config_options() {
        let cli = Cli::try_parse_from([
            "kvconf",
            "--config",
            "appsettings.json",
            "-c",
            "appsettings.Local.json",
            "--optional-config",
            "missing.json",
            "--env-prefix",
            "APP_",
            "--set",
            "KeyVault:Enabled=false",
            "--section-prefix",
            "Services",
            "--alias",
            "Staging=stage,stg",
            "--timeout-secs",
            "30",
            "show",
        ])
        .unwrap();

        assert_eq!(
            cli.config.files,
            vec![
                PathBuf::from("appsettings.json"),
                PathBuf::from("appsettings.Local.json")
            ]
        );
        assert_eq!(cli.config.optional_files, vec![PathBuf::from("missing.json")]);
        assert_eq!(cli.config.env_prefix.as_deref(), Some("APP_"));
        assert_eq!(cli.config.overrides, vec!["KeyVault:Enabled=false"]);
        assert_eq!(cli.config.section_prefix.as_deref(), Some("Services"));
        assert_eq!(cli.config.aliases, vec!["Staging=stage,stg"]);
        assert_eq!(cli.config.timeout_secs, Some(30));
    }

    #[test]
    fn test_secrets_command() {
        let cli = Cli::try_parse_from([
            "kvconf",
            "secrets",
            "--name",
            "Db--Host",
            "-n",
            "ApiKey",
            "--raw-names",
        ])
        .unwrap();
        match cli.command {
            Commands::Secrets {
                names,
                raw_names,
                show_values,
            } => {
                assert_eq!(names, vec!["Db--Host", "ApiKey"]);
                assert!(raw_names);
                assert!(!show_values);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exec_takes_trailing_command() {
        let cli = Cli::try_parse_from(["kvconf", "exec", "--", "env", "-0", "--null"]).unwrap();
        match cli.command {
            Commands::Exec { command } => assert_eq!(command, vec!["env", "-0", "--null"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(Cli::try_parse_from(["kvconf", "exec"]).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(Cli::try_parse_from(["kvconf", "--level", "loud", "show"]).is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["kvconf"]).is_err());
    }
}
