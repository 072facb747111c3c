//! `iamsync.toml` loading

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

pub const CONFIG_FILE: &str = "iamsync.toml";

const ACCOUNT_ID_PATTERN: &str = r"^\d{12}$";

/// Settings for the emulated account and where its state lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account_id: String,
    pub partition: String,
    /// State file; relative paths resolve against the state directory
    pub state_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_id: "123456789012".to_string(),
            partition: "aws".to_string(),
            state_file: None,
        }
    }
}

impl Config {
    /// Load from the config directory; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid {} format", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !Regex::new(ACCOUNT_ID_PATTERN)?.is_match(&self.account_id) {
            bail!("account_id must be 12 digits, got '{}'", self.account_id);
        }
        if self.partition.trim().is_empty() {
            bail!("partition must not be empty");
        }
        Ok(())
    }

    /// Resolve the state file path
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(file) => {
                let path = paths::expand(file);
                if path.is_absolute() {
                    Ok(path)
                } else {
                    Ok(paths::state_dir()?.join(path))
                }
            }
            None => Ok(paths::state_dir()?.join("state.json")),
        }
    }
}
