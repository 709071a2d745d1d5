//! Change and build properties.
//!
//! A property bag is an ordered mapping from string key to a value plus the
//! source that set it ("Change", "Scheduler", a change source name, ...).
//! The last writer for a key wins; the source tag is kept for auditing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One property value together with the subsystem that set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value: Value,
    pub source: String,
}

/// An ordered key/value property bag with per-key source tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    entries: BTreeMap<String, Property>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value and source for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>, source: impl Into<String>) {
        self.entries.insert(
            key.into(),
            Property {
                value: value.into(),
                source: source.into(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|p| &p.value)
    }

    pub fn source_of(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|p| p.source.as_str())
    }

    /// Merge another bag into this one. Last writer per key wins.
    pub fn update_from(&mut self, other: &Properties) {
        for (key, prop) in &other.entries {
            self.entries.insert(key.clone(), prop.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }
}
