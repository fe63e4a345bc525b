//! Fact store and change sets

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path;

/// Hierarchical fact store owned by a rules engine
///
/// Facts are JSON values addressed by dotted paths. Unset paths read as
/// `None`, which is distinct from an explicit JSON `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facts(Map<String, Value>);

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a fact by dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path::get(&self.0, path)
    }

    /// Write a fact by dotted path, pruning whatever stood in the way
    pub fn set(&mut self, path: &str, value: Value) {
        path::set(&mut self.0, path, value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of the whole store as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Facts {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Paths written during one assertion, with the values written
///
/// Later writes to the same path replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(Map<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(path: impl Into<String>, value: Value) -> Self {
        let mut changes = Self::new();
        changes.insert(path, value);
        changes
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Value) {
        self.0.insert(path.into(), value);
    }

    /// Merge `other` into this set, last write wins per path
    pub fn merge(&mut self, other: ChangeSet) {
        for (path, value) in other.0 {
            self.0.insert(path, value);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    /// Whether a write in this set can change the value read at `path`
    ///
    /// True when `path` or any path below it was written. Writes to
    /// ancestors show up as ancestor paths, which readers declare as well.
    pub fn affects(&self, path: &str) -> bool {
        self.paths().any(|changed| path::is_within(changed, path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
