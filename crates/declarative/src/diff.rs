//! Keyed-set diff computation
//!
//! List-valued sub-resources (inline policies, tags, managed-policy
//! attachments, group memberships, federation client IDs) are compared by key.
//! The diff is pure; emitting remote calls from it is the caller's job.

use crate::types::ConfigNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named member of a list-valued sub-resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedItem {
    /// Stable identity: policy name, tag key, policy ARN, group name
    pub key: String,
    /// Payload compared for updates (null for key-only sets)
    pub value: ConfigNode,
}

impl KeyedItem {
    pub fn new(key: impl Into<String>, value: ConfigNode) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// An item whose identity is its whole content
    pub fn key_only(key: impl Into<String>) -> Self {
        Self::new(key, ConfigNode::null())
    }
}

/// Add/update/remove partition between a current and a desired collection
///
/// Every list is sorted by key so that calls derived from it are emitted in
/// a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub to_add: Vec<KeyedItem>,
    pub to_update: Vec<KeyedItem>,
    pub to_remove: Vec<String>,
}

impl DiffResult {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// Items that must be written remotely (adds followed by updates), by key
    pub fn upserts(&self) -> Vec<&KeyedItem> {
        let mut items: Vec<&KeyedItem> = self.to_add.iter().chain(&self.to_update).collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }
}

/// Compare two keyed collections
///
/// `eq` decides whether an item present on both sides needs an update. A
/// repeated key within one side keeps its last occurrence.
pub fn diff<F>(current: &[KeyedItem], desired: &[KeyedItem], eq: F) -> DiffResult
where
    F: Fn(&ConfigNode, &ConfigNode) -> bool,
{
    let current: BTreeMap<&str, &ConfigNode> =
        current.iter().map(|i| (i.key.as_str(), &i.value)).collect();
    let desired: BTreeMap<&str, &ConfigNode> =
        desired.iter().map(|i| (i.key.as_str(), &i.value)).collect();

    let mut result = DiffResult::default();

    for (key, want) in &desired {
        match current.get(key) {
            None => result.to_add.push(KeyedItem::new(*key, (*want).clone())),
            Some(have) if !eq(*have, *want) => {
                result.to_update.push(KeyedItem::new(*key, (*want).clone()));
            }
            Some(_) => {}
        }
    }

    result.to_remove = current
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .map(|key| (*key).to_string())
        .collect();

    result
}

/// Diff two plain key sets (ARNs, group names, client IDs)
pub fn diff_keys<A, B>(current: &[A], desired: &[B]) -> DiffResult
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let current: Vec<KeyedItem> = current.iter().map(|k| KeyedItem::key_only(k.as_ref())).collect();
    let desired: Vec<KeyedItem> = desired.iter().map(|k| KeyedItem::key_only(k.as_ref())).collect();
    diff(&current, &desired, |_, _| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{canonical_eq, scalar_eq};
    use serde_json::json;

    fn tag(key: &str, value: &str) -> KeyedItem {
        KeyedItem::new(key, ConfigNode::str(value))
    }

    #[test]
    fn test_tag_value_change_is_update() {
        let current = vec![tag("env", "dev"), tag("team", "x")];
        let desired = vec![tag("env", "prod"), tag("team", "x")];

        let result = diff(&current, &desired, scalar_eq);

        assert_eq!(result.to_update, vec![tag("env", "prod")]);
        assert!(result.to_add.is_empty());
        assert!(result.to_remove.is_empty());
    }

    #[test]
    fn test_managed_policy_swap() {
        let result = diff_keys(&["A", "B"], &["B", "C"]);

        assert_eq!(result.to_add, vec![KeyedItem::key_only("C")]);
        assert_eq!(result.to_remove, vec!["A".to_string()]);
        assert!(result.to_update.is_empty());
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn test_identical_collections_produce_nothing() {
        let items = vec![tag("a", "1"), tag("b", "2")];
        let result = diff(&items, &items, scalar_eq);
        assert_eq!(result, DiffResult::default());
        assert!(!result.has_changes());
    }

    #[test]
    fn test_empty_desired_removes_everything() {
        let current = vec![tag("b", "2"), tag("a", "1")];
        let result = diff(&current, &[], scalar_eq);
        assert_eq!(result.to_remove, vec!["a".to_string(), "b".to_string()]);
        assert!(result.to_add.is_empty());
    }

    #[test]
    fn test_output_sorted_by_key() {
        let desired = vec![tag("zeta", "1"), tag("alpha", "1"), tag("mid", "1")];
        let result = diff(&[], &desired, scalar_eq);
        let keys: Vec<&str> = result.to_add.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_documents_compared_canonically() {
        let current = vec![KeyedItem::new(
            "s3",
            ConfigNode::str(r#"{"Statement":[],"Version":"2012-10-17"}"#),
        )];
        let same = vec![KeyedItem::new(
            "s3",
            ConfigNode::from(json!({"Version": "2012-10-17", "Statement": []})),
        )];
        let changed = vec![KeyedItem::new(
            "s3",
            ConfigNode::from(json!({"Version": "2008-10-17", "Statement": []})),
        )];

        assert!(!diff(&current, &same, canonical_eq).has_changes());
        assert_eq!(diff(&current, &changed, canonical_eq).to_update.len(), 1);
    }

    #[test]
    fn test_upserts_merge_sorted() {
        let current = vec![tag("b", "old")];
        let desired = vec![tag("c", "1"), tag("b", "new"), tag("a", "1")];
        let result = diff(&current, &desired, scalar_eq);
        let keys: Vec<&str> = result.upserts().iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
