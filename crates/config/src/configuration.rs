//! Built configuration snapshot
//!
//! A [`Configuration`] is the merged, flattened view of every source added to a
//! [`ConfigurationBuilder`](crate::ConfigurationBuilder). Keys are
//! colon-delimited paths (`Database:ConnectionString`) and lookups ignore case.

use crate::error::{ConfigError, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Separator between the segments of a hierarchical key.
pub const KEY_DELIMITER: char = ':';

/// Fold a key for case-insensitive comparison.
pub(crate) fn fold(key: &str) -> String {
    key.to_lowercase()
}

/// Join two key paths with the key delimiter.
#[must_use]
pub fn combine_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}{KEY_DELIMITER}{child}")
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: String,
    provider: Arc<str>,
}

/// Merged configuration snapshot.
///
/// Entries keep the order in which their keys were first seen; a later layer
/// replaces the value (and key casing) of an earlier one.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    path: String,
    entries: IndexMap<String, Entry>,
}

impl Configuration {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, provider: &Arc<str>, key: String, value: String) {
        self.entries.insert(
            fold(&key),
            Entry {
                key,
                value,
                provider: Arc::clone(provider),
            },
        );
    }

    /// Path of this section relative to the root (empty for the root).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold(key)).map(|e| e.value.as_str())
    }

    /// Name of the source that supplied the value for `key`.
    #[must_use]
    pub fn provider(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold(key)).map(|e| &*e.provider)
    }

    /// Check whether a value exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    /// Number of flattened entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the configuration holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the flattened `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|e| (e.key.as_str(), e.value.as_str()))
    }

    /// Copy the flattened snapshot into an owned list.
    #[must_use]
    pub fn to_flat(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Get the sub-tree rooted at `path`, with the prefix stripped from keys.
    ///
    /// A missing section yields an empty configuration.
    #[must_use]
    pub fn section(&self, path: &str) -> Self {
        let prefix = format!("{}{KEY_DELIMITER}", fold(path));
        let depth = path.split(KEY_DELIMITER).count();
        let mut section = Self {
            path: combine_path(&self.path, path),
            entries: IndexMap::new(),
        };
        for (folded, entry) in &self.entries {
            if !folded.starts_with(&prefix) {
                continue;
            }
            let (Some(folded_rest), Some(key_rest)) = (
                folded.splitn(depth + 1, KEY_DELIMITER).nth(depth),
                entry.key.splitn(depth + 1, KEY_DELIMITER).nth(depth),
            ) else {
                continue;
            };
            section.entries.insert(
                folded_rest.to_string(),
                Entry {
                    key: key_rest.to_string(),
                    value: entry.value.clone(),
                    provider: Arc::clone(&entry.provider),
                },
            );
        }
        section
    }

    /// Distinct first segments of every key, in first-seen order.
    #[must_use]
    pub fn children(&self) -> Vec<String> {
        let mut seen = IndexMap::new();
        for entry in self.entries.values() {
            let head = entry
                .key
                .split(KEY_DELIMITER)
                .next()
                .unwrap_or_default()
                .to_string();
            seen.entry(fold(&head)).or_insert(head);
        }
        seen.into_values().collect()
    }

    /// Deserialize this configuration into `T`.
    ///
    /// Keys are lower-cased before deserialization so binding is
    /// case-insensitive; target types name their fields in lower case.
    /// All leaf values are strings.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value_tree())
            .map_err(|e| ConfigError::binding(&self.path, e.to_string()))
    }

    fn to_value_tree(&self) -> Value {
        let mut root = Map::new();
        for (folded, entry) in &self.entries {
            let segments: Vec<&str> = folded.split(KEY_DELIMITER).collect();
            insert_path(&mut root, &segments, &entry.value);
        }
        Value::Object(root)
    }
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: &str) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        // A section with children wins over a scalar at the same path.
        if !matches!(map.get(*head), Some(Value::Object(_))) {
            map.insert((*head).to_string(), Value::String(value.to_string()));
        }
        return;
    }
    let child = map
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(inner) = child {
        insert_path(inner, rest, value);
    }
}

/// Deserialization helpers for binding string-valued configuration.
pub mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    /// Parse `true`/`false` (any case, surrounding whitespace ignored).
    /// A blank value binds as `false`.
    pub fn bool_from_str<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match BoolOrString::deserialize(deserializer)? {
            BoolOrString::Bool(b) => Ok(b),
            BoolOrString::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(false)
                } else if trimmed.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "'{s}' is not a valid boolean"
                    )))
                }
            }
        }
    }
}
