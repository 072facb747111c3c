//! Core types for declarative reconciliation
//!
//! [`ConfigNode`] is the one value representation used for desired
//! configuration, observed external state and structured sub-documents such
//! as permission-policy bodies. [`ChangeSet`] carries the changed field paths
//! the host hands to a lifecycle call.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar leaf of a configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A configuration tree: a scalar, an ordered list, or a map with unique keys
///
/// Serializes to and from plain JSON/TOML documents, so a desired
/// configuration can be written by hand and an observed state can be
/// persisted by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ConfigNode {
    Scalar(Scalar),
    List(Vec<ConfigNode>),
    Map(BTreeMap<String, ConfigNode>),
}

impl Default for ConfigNode {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConfigNode {
    /// An empty map; as observed state it means "the resource no longer exists"
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Str(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }

    /// Build a list node
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = ConfigNode>,
    {
        Self::List(items.into_iter().collect())
    }

    /// Build a list of string scalars
    pub fn str_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Self::str).collect())
    }

    /// Build a map node
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigNode)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Insert a field, turning a non-map node into a map first
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigNode) {
        if !matches!(self, Self::Map(_)) {
            *self = Self::empty();
        }
        if let Self::Map(map) = self {
            map.insert(key.into(), value);
        }
    }

    /// Builder form of [`ConfigNode::insert`]
    pub fn with(mut self, key: impl Into<String>, value: ConfigNode) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field only when a value is present
    pub fn with_opt(self, key: impl Into<String>, value: Option<ConfigNode>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    /// True for an empty map, empty list or null
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(Scalar::Null) => true,
            Self::Scalar(_) => false,
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigNode]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a dotted path (`login_profile.password_length`)
    ///
    /// Null values are reported as absent.
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        let mut node = self;
        for segment in path.split('.') {
            node = node.as_map()?.get(segment)?;
        }
        if node.is_null() { None } else { Some(node) }
    }

    /// Required string field
    pub fn required_str(&self, path: &str) -> Result<&str> {
        match self.optional_str(path)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(Error::MissingField(path.to_string())),
        }
    }

    /// Optional string field; present-but-not-a-string is an error
    pub fn optional_str(&self, path: &str) -> Result<Option<&str>> {
        self.get(path)
            .map(|node| node.as_str().ok_or_else(|| mismatch(path, "a string")))
            .transpose()
    }

    pub fn optional_bool(&self, path: &str) -> Result<Option<bool>> {
        self.get(path)
            .map(|node| node.as_bool().ok_or_else(|| mismatch(path, "a boolean")))
            .transpose()
    }

    pub fn optional_i64(&self, path: &str) -> Result<Option<i64>> {
        self.get(path)
            .map(|node| node.as_i64().ok_or_else(|| mismatch(path, "an integer")))
            .transpose()
    }

    pub fn optional_list(&self, path: &str) -> Result<Option<&[ConfigNode]>> {
        self.get(path)
            .map(|node| node.as_list().ok_or_else(|| mismatch(path, "a list")))
            .transpose()
    }

    /// Optional list of strings
    pub fn optional_str_list(&self, path: &str) -> Result<Option<Vec<String>>> {
        let Some(items) = self.optional_list(path)? else {
            return Ok(None);
        };
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch(path, "a list of strings"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Whether a top-level field is declared (present and not null)
    pub fn declares(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Convert into a `serde_json::Value`
    pub fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

fn mismatch(path: &str, expected: &'static str) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected,
    }
}

impl From<Value> for ConfigNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::null(),
            Value::Bool(b) => Self::bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::int(i),
                None => Self::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Self::str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<ConfigNode> for Value {
    fn from(node: ConfigNode) -> Self {
        match node {
            ConfigNode::Scalar(Scalar::Null) => Value::Null,
            ConfigNode::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            ConfigNode::Scalar(Scalar::Int(i)) => Value::from(i),
            ConfigNode::Scalar(Scalar::Float(f)) => {
                serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
            }
            ConfigNode::Scalar(Scalar::Str(s)) => Value::String(s),
            ConfigNode::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            ConfigNode::Map(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ConfigNode {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<String> for ConfigNode {
    fn from(value: String) -> Self {
        Self::str(value)
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// A changed field path with its previous and new values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub previous: Option<ConfigNode>,
    pub new: Option<ConfigNode>,
}

impl FieldChange {
    pub fn new(
        path: impl Into<String>,
        previous: Option<ConfigNode>,
        new: Option<ConfigNode>,
    ) -> Self {
        Self {
            path: path.into(),
            previous,
            new,
        }
    }
}

/// The set of changed field paths supplied with a lifecycle call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every declared top-level field of `desired` as a new field
    pub fn all(desired: &ConfigNode) -> Self {
        let changes = desired
            .as_map()
            .into_iter()
            .flatten()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| FieldChange::new(k.clone(), None, Some(v.clone())))
            .collect();
        Self { changes }
    }

    /// Top-level fields that differ between two desired trees
    pub fn between(old: &ConfigNode, new: &ConfigNode) -> Self {
        let empty = BTreeMap::new();
        let old_map = old.as_map().unwrap_or(&empty);
        let new_map = new.as_map().unwrap_or(&empty);

        let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
        keys.sort();
        keys.dedup();

        let changes = keys
            .into_iter()
            .filter_map(|key| {
                let before = old_map.get(key).filter(|v| !v.is_null());
                let after = new_map.get(key).filter(|v| !v.is_null());
                if before == after {
                    return None;
                }
                Some(FieldChange::new(key.clone(), before.cloned(), after.cloned()))
            })
            .collect();
        Self { changes }
    }

    pub fn push(&mut self, change: FieldChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// Whether `path`, one of its ancestors or one of its descendants changed
    pub fn touches(&self, path: &str) -> bool {
        self.changes.iter().any(|c| {
            c.path == path
                || c.path
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'))
                || path
                    .strip_prefix(c.path.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// The change recorded for exactly `path`
    pub fn get(&self, path: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.path == path)
    }

    pub fn touches_any(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.touches(p))
    }

    /// Changed paths in order
    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }
}

impl FromIterator<FieldChange> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = FieldChange>>(iter: T) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}
