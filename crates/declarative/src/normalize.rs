//! Canonicalization helpers
//!
//! Remote APIs hand back documents with their own key order and whitespace,
//! and sometimes URL-encoded or as JSON strings. Everything compared or sent
//! goes through the same deterministic encoder first.

use crate::diff::KeyedItem;
use crate::error::{Error, Result};
use crate::types::ConfigNode;
use serde_json::Value;
use std::collections::BTreeMap;

/// Interpret a node as a structured document
///
/// A string that parses as JSON is replaced by the parsed tree, so a policy
/// given as a heredoc and the same policy given as a map compare equal.
pub fn document(node: &ConfigNode) -> ConfigNode {
    match node.as_str() {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => ConfigNode::from(value),
            Err(_) => node.clone(),
        },
        None => node.clone(),
    }
}

/// Deterministic compact JSON encoding with sorted map keys
pub fn canonical_json(node: &ConfigNode) -> String {
    // ConfigNode maps are BTreeMaps, so keys come out sorted.
    document(node).to_string()
}

/// Byte equality of the canonical encodings
pub fn canonical_eq(a: &ConfigNode, b: &ConfigNode) -> bool {
    canonical_json(a) == canonical_json(b)
}

/// Whether an observed value satisfies a desired one
///
/// Lists compare as unordered collections, maps key by key with null
/// entries ignored, and everything else by canonical encoding, so a JSON
/// document held as a string matches the same document held as a tree.
pub fn converged(desired: &ConfigNode, observed: &ConfigNode) -> bool {
    match (desired, observed) {
        (ConfigNode::List(wanted), ConfigNode::List(actual)) => {
            wanted.iter().all(|w| actual.iter().any(|a| converged(w, a)))
                && actual.iter().all(|a| wanted.iter().any(|w| converged(w, a)))
        }
        (ConfigNode::Map(wanted), ConfigNode::Map(actual)) => {
            declared_keys(wanted).eq(declared_keys(actual))
                && declared_keys(wanted).all(|k| converged(&wanted[k], &actual[k]))
        }
        _ => canonical_eq(desired, observed),
    }
}

fn declared_keys(map: &BTreeMap<String, ConfigNode>) -> impl Iterator<Item = &String> {
    map.iter().filter(|(_, v)| !v.is_null()).map(|(k, _)| k)
}

/// Direct equality for scalar items (tag values, ARNs)
pub fn scalar_eq(a: &ConfigNode, b: &ConfigNode) -> bool {
    a == b
}

/// Read a tag collection
///
/// Accepts a list of `{key, value}` maps or a plain `{key = value}` map.
/// The result is sorted by key; a repeated key keeps its last value.
pub fn tags(node: Option<&ConfigNode>, path: &str) -> Result<Vec<KeyedItem>> {
    let mut items = match node {
        None => Vec::new(),
        Some(ConfigNode::Map(map)) => map
            .iter()
            .map(|(k, v)| KeyedItem::new(k.clone(), v.clone()))
            .collect(),
        Some(ConfigNode::List(list)) => list
            .iter()
            .map(|entry| {
                let key = entry.required_str("key").map_err(|_| tag_shape(path))?;
                let value = entry.get("value").cloned().unwrap_or_else(|| ConfigNode::str(""));
                Ok(KeyedItem::new(key, value))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(tag_shape(path)),
    };
    sort_dedup(&mut items);
    Ok(items)
}

/// Render tags back into the list-of-maps form, sorted by key
pub fn tags_node(items: &[KeyedItem]) -> ConfigNode {
    let mut sorted = items.to_vec();
    sort_dedup(&mut sorted);
    ConfigNode::list(sorted.into_iter().map(|item| {
        ConfigNode::empty()
            .with("key", ConfigNode::str(item.key))
            .with("value", item.value)
    }))
}

/// Read a list of named documents (`[{name, document}]`)
///
/// `doc_field` names the document field; values are normalized with
/// [`document`]. Sorted by name.
pub fn named_documents(
    node: Option<&ConfigNode>,
    path: &str,
    doc_field: &str,
) -> Result<Vec<KeyedItem>> {
    let Some(node) = node else {
        return Ok(Vec::new());
    };
    let list = node.as_list().ok_or_else(|| Error::TypeMismatch {
        path: path.to_string(),
        expected: "a list of {name, document} maps",
    })?;
    let mut items = list
        .iter()
        .map(|entry| {
            let name = entry.required_str("name").map_err(|_| Error::MissingField(format!("{path}[].name")))?;
            let doc = entry
                .get(doc_field)
                .ok_or_else(|| Error::MissingField(format!("{path}[].{doc_field}")))?;
            Ok(KeyedItem::new(name, document(doc)))
        })
        .collect::<Result<Vec<_>>>()?;
    sort_dedup(&mut items);
    Ok(items)
}

/// Key-only items from a list of strings, sorted and deduplicated
pub fn keys<I, S>(values: I) -> Vec<KeyedItem>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut items: Vec<KeyedItem> = values
        .into_iter()
        .map(|v| KeyedItem::key_only(v.into()))
        .collect();
    sort_dedup(&mut items);
    items
}

/// Stable sort by key, keeping the last occurrence of a repeated key
pub fn sort_dedup(items: &mut Vec<KeyedItem>) {
    items.reverse();
    items.sort_by(|a, b| a.key.cmp(&b.key));
    items.dedup_by(|a, b| a.key == b.key);
}

fn tag_shape(path: &str) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected: "a list of {key, value} maps or a map",
    }
}
