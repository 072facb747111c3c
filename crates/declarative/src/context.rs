//! Pipeline context
//!
//! [`SharedContext`] is the mutable bag threaded through one pipeline run so
//! a later operation can read what an earlier one produced (a freshly minted
//! ARN, a generated secret). [`CancelToken`] carries the caller's
//! cancellation request to every step and every remote call.

use crate::error::{Error, Result};
use crate::types::ConfigNode;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cross-step data for a single pipeline run
///
/// Owned by exactly one run; it is never shared between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext {
    /// Identifier of the primary remote resource, once known
    pub upstream_id: Option<String>,
    data: BTreeMap<String, ConfigNode>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context with a known upstream identifier (update/destroy)
    pub fn for_upstream(id: impl Into<String>) -> Self {
        Self {
            upstream_id: Some(id.into()),
            data: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ConfigNode) {
        self.data.insert(key.into(), value);
    }

    pub fn insert_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, ConfigNode::str(value));
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(ConfigNode::as_str)
    }

    /// A string an earlier step must have produced
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| Error::MissingContext(key.to_string()))
    }

    /// The upstream identifier, or an error naming it
    pub fn require_upstream(&self) -> Result<&str> {
        self.upstream_id
            .as_deref()
            .ok_or_else(|| Error::MissingContext("upstream_id".to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Iterate over stored values in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Cooperative cancellation flag
///
/// Cloning shares the flag. Checked before every pipeline phase and before
/// every remote call; in-flight calls are not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub fn check(&self, step: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(step.to_string()))
        } else {
            Ok(())
        }
    }
}
