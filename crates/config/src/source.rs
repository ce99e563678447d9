//! Configuration sources
//!
//! Every source yields an ordered list of flattened `(key, value)` pairs. The
//! [`ConfigurationBuilder`](crate::ConfigurationBuilder) merges them in the
//! order they were added.

use crate::configuration::{KEY_DELIMITER, combine_path};
use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// A layer of configuration values.
pub trait ConfigurationSource: Send + Sync + Debug {
    /// Name reported by [`Configuration::provider`](crate::Configuration::provider).
    fn name(&self) -> &str;

    /// Load the flattened entries of this layer.
    fn load(&self) -> Result<Vec<(String, String)>>;
}

/// JSON file source.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    optional: bool,
    name: String,
}

impl JsonFileSource {
    /// Create a source for a JSON file.
    ///
    /// A missing optional file contributes no entries; a missing required file
    /// is an error.
    pub fn new(path: impl Into<PathBuf>, optional: bool) -> Self {
        let path = path.into();
        let name = format!("json:{}", path.display());
        Self {
            path,
            optional,
            name,
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<(String, String)>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if self.optional && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Optional configuration file not found");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let value: Value = serde_json::from_str(&text).map_err(|e| ConfigError::Json {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(ConfigError::Json {
                path: self.path.clone(),
                message: "top-level value is not an object".to_string(),
            });
        }

        let mut entries = Vec::new();
        flatten_json("", &value, &mut entries);
        Ok(entries)
    }
}

/// Flatten a JSON value into colon-delimited entries.
///
/// Arrays are indexed (`Hosts:0`), `null` becomes an empty string and empty
/// objects or arrays contribute nothing.
pub fn flatten_json(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_json(&combine_path(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(&combine_path(prefix, &index.to_string()), child, out);
            }
        }
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
    }
}

/// Process environment source.
///
/// Variables are filtered by an optional prefix (case-insensitive, stripped
/// from the key) and `__` in names maps to the key delimiter.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariablesSource {
    prefix: Option<String>,
}

impl EnvironmentVariablesSource {
    /// Create a source reading every environment variable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read variables that start with `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()).filter(|p| !p.is_empty()),
        }
    }

    fn map_name(&self, name: &str) -> Option<String> {
        let rest = match &self.prefix {
            Some(prefix) => {
                let head = name.get(..prefix.len())?;
                if !head.eq_ignore_ascii_case(prefix) {
                    return None;
                }
                &name[prefix.len()..]
            }
            None => name,
        };
        if rest.is_empty() {
            return None;
        }
        Some(rest.replace("__", &KEY_DELIMITER.to_string()))
    }
}

impl ConfigurationSource for EnvironmentVariablesSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn load(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for (name, value) in std::env::vars_os() {
            let (Some(name), Some(value)) = (name.to_str(), value.to_str()) else {
                tracing::trace!("Skipping non UTF-8 environment variable");
                continue;
            };
            if let Some(key) = self.map_name(name) {
                entries.push((key, value.to_string()));
            }
        }
        Ok(entries)
    }
}

/// Command-line arguments source.
///
/// Accepts `--key=value`, `--key value`, `/key=value` and `key=value`.
/// Other arguments are ignored.
#[derive(Debug, Clone, Default)]
pub struct CommandLineSource {
    args: Vec<String>,
}

impl CommandLineSource {
    /// Create a source from raw arguments.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigurationSource for CommandLineSource {
    fn name(&self) -> &str {
        "command-line"
    }

    fn load(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            if let Some(switch) = arg.strip_prefix("--") {
                if let Some((key, value)) = switch.split_once('=') {
                    entries.push((key.to_string(), value.to_string()));
                } else {
                    let value = args.next().ok_or_else(|| ConfigError::InvalidCommandLine {
                        switch: arg.clone(),
                    })?;
                    entries.push((switch.to_string(), value.clone()));
                }
            } else if let Some((key, value)) = arg.strip_prefix('/').and_then(|s| s.split_once('='))
            {
                entries.push((key.to_string(), value.to_string()));
            } else if let Some((key, value)) = arg.split_once('=')
                && !key.is_empty()
            {
                entries.push((key.to_string(), value.to_string()));
            }
        }
        Ok(entries)
    }
}

/// In-memory source of fixed entries.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    entries: Vec<(String, String)>,
}

impl InMemorySource {
    /// Create an in-memory source.
    pub fn new<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigurationSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<(String, String)>> {
        Ok(self.entries.clone())
    }
}
