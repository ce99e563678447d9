//! Layered configuration builder.

use crate::configuration::Configuration;
use crate::error::Result;
use crate::overrides::{EnvironmentAliases, OVERRIDES_SOURCE, resolve_overrides};
use crate::source::{
    CommandLineSource, ConfigurationSource, EnvironmentVariablesSource, InMemorySource,
    JsonFileSource,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder collecting configuration sources in priority order.
///
/// Sources added later override earlier ones key by key. The builder is cheap
/// to clone and may be built any number of times; each build reloads every
/// source.
///
/// # Example
///
/// ```ignore
/// use kvconf_config::ConfigurationBuilder;
///
/// let config = ConfigurationBuilder::new()
///     .add_json_file("appsettings.json")
///     .add_environment_variables(Some("APP_"))
///     .add_command_line(std::env::args().skip(1))
///     .build()?;
/// let level = config.get("Logging:Level");
/// ```
#[derive(Clone, Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Arc<dyn ConfigurationSource>>,
}

impl ConfigurationBuilder {
    /// Create a builder with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary source.
    #[must_use]
    pub fn add_source<S>(mut self, source: S) -> Self
    where
        S: ConfigurationSource + 'static,
    {
        self.sources.push(Arc::new(source));
        self
    }

    /// Append a required JSON file.
    #[must_use]
    pub fn add_json_file(self, path: impl Into<PathBuf>) -> Self {
        self.add_source(JsonFileSource::new(path, false))
    }

    /// Append a JSON file that may be absent.
    #[must_use]
    pub fn add_optional_json_file(self, path: impl Into<PathBuf>) -> Self {
        self.add_source(JsonFileSource::new(path, true))
    }

    /// Append the process environment, optionally filtered by prefix.
    #[must_use]
    pub fn add_environment_variables(self, prefix: Option<&str>) -> Self {
        let source = match prefix {
            Some(prefix) => EnvironmentVariablesSource::with_prefix(prefix),
            None => EnvironmentVariablesSource::new(),
        };
        self.add_source(source)
    }

    /// Append command-line arguments.
    #[must_use]
    pub fn add_command_line<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_source(CommandLineSource::new(args))
    }

    /// Append a fixed set of entries.
    #[must_use]
    pub fn add_in_memory<I, K, V>(self, name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.add_source(InMemorySource::new(name, entries))
    }

    /// Names of the registered sources, lowest priority first.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check whether no source has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load every source and merge them into a [`Configuration`].
    pub fn build(&self) -> Result<Configuration> {
        let mut config = Configuration::new();
        for source in &self.sources {
            let provider: Arc<str> = Arc::from(source.name());
            let entries = source.load()?;
            tracing::trace!(source = %provider, entries = entries.len(), "Loaded configuration source");
            for (key, value) in entries {
                config.insert(&provider, key, value);
            }
        }
        Ok(config)
    }

    /// Build, resolve environment-specific overrides and append them as a
    /// higher-priority layer.
    ///
    /// Without a `TestEnvironment` value the builder is returned unchanged.
    pub fn with_environment_overrides(self, aliases: &EnvironmentAliases) -> Result<Self> {
        let config = self.build()?;
        let overrides = resolve_overrides(&config, aliases);
        if overrides.is_empty() {
            return Ok(self);
        }
        tracing::debug!(
            overrides = overrides.len(),
            "Applying environment-specific configuration overrides"
        );
        Ok(self.add_in_memory(OVERRIDES_SOURCE, overrides))
    }
}

impl std::fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("sources", &self.source_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_sources_override_earlier() {
        let config = ConfigurationBuilder::new()
            .add_in_memory("defaults", [("Database:Host", "localhost"), ("Port", "80")])
            .add_in_memory("overrides", [("database:host", "db.internal")])
            .build()
            .unwrap();

        assert_eq!(config.get("Database:Host"), Some("db.internal"));
        assert_eq!(config.get("Port"), Some("80"));
        assert_eq!(config.provider("Database:Host"), Some("overrides"));
        assert_eq!(config.provider("Port"), Some("defaults"));
    }

    #[test]
    fn test_build_is_repeatable() {
        let builder = ConfigurationBuilder::new().add_in_memory("a", [("K", "V")]);
        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(first.to_flat(), second.to_flat());
    }

    #[test]
    fn test_debug_lists_sources() {
        let builder = ConfigurationBuilder::new()
            .add_in_memory("first", [("K", "V")])
            .add_command_line(["--A=1"]);
        let debug = format!("{builder:?}");
        assert!(debug.contains("first"));
        assert!(debug.contains("command-line"));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_environment_overrides_layer() {
        let builder = ConfigurationBuilder::new().add_in_memory(
            "base",
            [
                ("TestEnvironment", "qa"),
                ("Database:Host", "prod-db"),
                ("qa-Database:Host", "qa-db"),
            ],
        );
        let config = builder
            .with_environment_overrides(&EnvironmentAliases::new())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.get("Database:Host"), Some("qa-db"));
        assert_eq!(config.provider("Database:Host"), Some(OVERRIDES_SOURCE));
    }

    #[test]
    fn test_environment_overrides_noop_without_marker() {
        let builder = ConfigurationBuilder::new().add_in_memory("base", [("A", "1")]);
        let with = builder
            .clone()
            .with_environment_overrides(&EnvironmentAliases::new())
            .unwrap();
        assert_eq!(with.len(), builder.len());
    }
}
