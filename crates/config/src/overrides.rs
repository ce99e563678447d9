//! Environment-specific configuration overrides.
//!
//! A configuration may name its current environment under
//! [`TEST_ENVIRONMENT_KEY`]. Keys carrying that environment's name, such as
//! `qa-Database:Host`, are promoted to their unprefixed form (`Database:Host`)
//! in a layer that sits above the rest of the configuration.

use crate::configuration::Configuration;
use crate::error::{ConfigError, Result};
use indexmap::IndexMap;

/// Top-level key holding the current environment name.
pub const TEST_ENVIRONMENT_KEY: &str = "TestEnvironment";

/// Source name of the override layer appended by
/// [`ConfigurationBuilder::with_environment_overrides`](crate::ConfigurationBuilder::with_environment_overrides).
pub const OVERRIDES_SOURCE: &str = "environment-overrides";

/// Ordered map from canonical environment names to their aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentAliases {
    aliases: IndexMap<String, Vec<String>>,
}

impl EnvironmentAliases {
    /// Create an empty alias map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add aliases for a canonical name.
    #[must_use]
    pub fn with_alias<I, S>(mut self, canonical: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(canonical, aliases);
        self
    }

    /// Add aliases for a canonical name, extending any existing entry.
    pub fn insert<I, S>(&mut self, canonical: impl Into<String>, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(canonical.into())
            .or_default()
            .extend(aliases.into_iter().map(Into::into));
    }

    /// Parse entries written as `Canonical=alias1,alias2`.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            let invalid = || ConfigError::InvalidAlias {
                entry: entry.to_string(),
            };
            let (canonical, list) = entry.split_once('=').ok_or_else(invalid)?;
            let canonical = canonical.trim();
            let aliases: Vec<&str> = list
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            if canonical.is_empty() || aliases.is_empty() {
                return Err(invalid());
            }
            parsed.insert(canonical, aliases);
        }
        Ok(parsed)
    }

    /// Map `raw` to its canonical name when it matches an alias
    /// (case-insensitively); otherwise return it unchanged.
    #[must_use]
    pub fn canonicalize<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| a.eq_ignore_ascii_case(raw)))
            .map_or(raw, |(canonical, _)| canonical.as_str())
    }

    /// Check whether no aliases are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Iterate over `(canonical, aliases)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Byte range of the first case-insensitive occurrence of `needle` in
/// `haystack`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return Some((0, 0));
    }
    for (start, _) in haystack.char_indices() {
        let mut rest = haystack[start..].char_indices();
        let mut end = start;
        let mut matched = true;
        for expected in needle.chars() {
            match rest.next() {
                Some((offset, actual)) if chars_eq_ignore_case(actual, expected) => {
                    end = start + offset + actual.len_utf8();
                }
                _ => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            return Some((start, end));
        }
    }
    None
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Resolve the override layer for the configuration's current environment.
///
/// Returns an empty layer when [`TEST_ENVIRONMENT_KEY`] is absent or blank.
/// Every key containing the environment name (anywhere, not only as a
/// prefix) with a non-blank value is included, with the first
/// `"{environment}-"` occurrence removed from it. The environment name is
/// used as written; surrounding whitespace is part of it.
#[must_use]
pub fn resolve_overrides(
    config: &Configuration,
    aliases: &EnvironmentAliases,
) -> IndexMap<String, String> {
    promoted_entries(config, aliases)
        .into_iter()
        .map(|(promoted, _, value)| (promoted, value.to_string()))
        .collect()
}

/// Map each key of the override layer to the key it was promoted from.
///
/// When several keys promote to the same key, the last one wins, matching
/// [`resolve_overrides`].
#[must_use]
pub fn resolve_override_origins(
    config: &Configuration,
    aliases: &EnvironmentAliases,
) -> IndexMap<String, String> {
    promoted_entries(config, aliases)
        .into_iter()
        .map(|(promoted, source, _)| (promoted, source.to_string()))
        .collect()
}

/// `(promoted key, source key, value)` in configuration order.
fn promoted_entries<'a>(
    config: &'a Configuration,
    aliases: &EnvironmentAliases,
) -> Vec<(String, &'a str, &'a str)> {
    let Some(raw) = config
        .get(TEST_ENVIRONMENT_KEY)
        .filter(|v| !v.trim().is_empty())
    else {
        return Vec::new();
    };

    let environment = aliases.canonicalize(raw);
    let token = format!("{environment}-");
    tracing::debug!(raw, environment, "Resolving environment overrides");

    let mut entries = Vec::new();
    for (key, value) in config.iter() {
        if value.trim().is_empty() || find_ignore_case(key, environment).is_none() {
            continue;
        }
        let promoted = match find_ignore_case(key, &token) {
            Some((start, end)) => format!("{}{}", &key[..start], &key[end..]),
            None => key.to_string(),
        };
        tracing::trace!(key, promoted = %promoted, "Environment override");
        entries.push((promoted, key, value));
    }
    entries
}
