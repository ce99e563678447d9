//! Error types for configuration loading and binding.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the configuration error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading, querying or binding configuration.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Failed to read configuration file {}: {source}", path.display())]
    #[diagnostic(code(kvconf_config::io))]
    Io {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A JSON configuration file is malformed.
    #[error("Invalid JSON configuration in {}: {message}", path.display())]
    #[diagnostic(
        code(kvconf_config::json),
        help("The top-level JSON value must be an object")
    )]
    Json {
        /// Path of the file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A section could not be bound to the requested settings type.
    #[error("Failed to bind configuration section '{section}': {message}")]
    #[diagnostic(code(kvconf_config::binding))]
    Binding {
        /// Section path that was bound (empty for the root)
        section: String,
        /// Deserializer message
        message: String,
    },

    /// A command-line switch was given without a value.
    #[error("Command-line switch '{switch}' has no value")]
    #[diagnostic(
        code(kvconf_config::command_line),
        help("Use --key=value or --key value")
    )]
    InvalidCommandLine {
        /// The offending switch
        switch: String,
    },

    /// A key or value cannot be written to the process environment.
    #[error("Cannot set environment variable '{name}': {reason}")]
    #[diagnostic(code(kvconf_config::environment))]
    InvalidEnvironmentVariable {
        /// Variable name
        name: String,
        /// Why the write was refused
        reason: &'static str,
    },

    /// An environment alias entry could not be parsed.
    #[error("Invalid environment alias '{entry}'")]
    #[diagnostic(
        code(kvconf_config::alias),
        help("Aliases are written as Canonical=alias1,alias2")
    )]
    InvalidAlias {
        /// The raw entry
        entry: String,
    },
}

impl ConfigError {
    /// Create a binding error for a section.
    pub fn binding(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Binding {
            section: section.into(),
            message: message.into(),
        }
    }
}
