use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::ConfigNode;
use iamkit::Account;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::resource::Computed;

// ============================================================================
// State Structures
// ============================================================================

/// Everything iamsync knows after the last run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IamState {
    /// Contents of the emulated account
    pub account: Account,

    /// Managed resources in the order they were first applied
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// One managed resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Manifest identifier
    pub id: String,

    /// Registered resource type, e.g. `iam_user`
    pub resource_type: String,

    /// Desired configuration as last applied
    pub desired: ConfigNode,

    /// Computed fields returned by the last create/update
    #[serde(default)]
    pub computed: Computed,

    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Load/Save
// ============================================================================

impl IamState {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            resources: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Load state from disk; a missing file yields a fresh account
    pub fn load(path: &Path, fresh: impl FnOnce() -> Account) -> Result<Self> {
        if !path.exists() {
            log::debug!("No state at {}, starting fresh", path.display());
            return Ok(Self::new(fresh()));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    /// Save state to disk, creating parent directories
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        self.last_updated = Utc::now();

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Insert or replace a record, keeping its original position
    pub fn upsert(&mut self, record: ResourceRecord) {
        match self.resources.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.resources.push(record),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceRecord> {
        let index = self.resources.iter().position(|r| r.id == id)?;
        Some(self.resources.remove(index))
    }
}

impl ResourceRecord {
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        desired: ConfigNode,
        computed: Computed,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            desired,
            computed,
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
