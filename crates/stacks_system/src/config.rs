//! Runtime configuration.
//!
//! A flat, ordered map of string keys to string values. Loading it from
//! files or the environment is left to the embedding process; the runtime
//! only reads and updates the keys below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stacks_component::{Result, StacksError};

/// Comma-separated names of every registered processor.
pub const PROCESSOR_LIST: &str = "stacks.processor.list";

/// Storage backend name of the built-in in-memory store.
pub const IN_MEMORY: &str = "inmemory";

/// Storage backend name of the relational store.
pub const JDBC: &str = "jdbc";

/// Key of the per-processor active flag.
#[must_use]
pub fn processor_active_key(name: &str) -> String {
    format!("stacks.processor.{name}.active")
}

/// Key enabling a backend as a reader.
#[must_use]
pub fn reader_enabled_key(backend: &str) -> String {
    format!("stacks.entity.storage.{backend}.reader.enabled")
}

/// Key enabling a backend as a writer.
#[must_use]
pub fn writer_enabled_key(backend: &str) -> String {
    format!("stacks.entity.storage.{backend}.writer.enabled")
}

/// Ordered key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    /// An empty configuration with no keys at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration a fresh runtime starts from: no processors, the
    /// in-memory store enabled for reads and writes, jdbc disabled.
    #[must_use]
    pub fn defaults() -> Self {
        let mut config = Self::new();
        config.set(PROCESSOR_LIST, "");
        config.set(reader_enabled_key(IN_MEMORY), "true");
        config.set(writer_enabled_key(IN_MEMORY), "true");
        config.set(reader_enabled_key(JDBC), "false");
        config.set(writer_enabled_key(JDBC), "false");
        config
    }

    /// Parse a JSON object of string values.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::Backend`] if the text is not such an object.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(StacksError::backend)
    }

    /// This configuration with every entry of `other` laid over it.
    #[must_use]
    pub fn overlay(mut self, other: Configuration) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// The value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StacksError::LookupMiss`] if the key is absent.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| StacksError::lookup("configuration entry", key))
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// `true` only when `key` is present and equal to `"true"`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Set a boolean entry.
    pub fn set_flag(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, value.to_string());
    }

    /// The non-empty names in a comma-separated entry, in order.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append `item` to a comma-separated entry unless already listed.
    pub fn append_to_list(&mut self, key: &str, item: &str) {
        let mut items: Vec<String> = self.list(key).into_iter().map(String::from).collect();
        if items.iter().any(|existing| existing == item) {
            return;
        }
        items.push(item.to_string());
        self.set(key, items.join(","));
    }

    /// Drop `item` from a comma-separated entry. Returns `true` if it was listed.
    pub fn remove_from_list(&mut self, key: &str, item: &str) -> bool {
        let items: Vec<String> = self.list(key).into_iter().map(String::from).collect();
        let kept: Vec<&str> = items
            .iter()
            .map(String::as_str)
            .filter(|existing| *existing != item)
            .collect();
        if kept.len() == items.len() {
            return false;
        }
        self.set(key, kept.join(","));
        true
    }

    /// Iterate over every entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
