pub mod apply;
pub mod destroy;
pub mod inspect;

use crate::Context;
use crate::config::Config;
use crate::resource::{self, Lifecycle};
use crate::state::IamState;
use anyhow::{Context as _, Result};
use iamkit::{Account, MemoryBackend};
use std::path::PathBuf;

/// Loaded state plus the account emulator it drives
pub struct Session {
    pub state: IamState,
    pub backend: MemoryBackend,
    state_path: PathBuf,
}

impl Session {
    /// Open the configured (or overridden) state file
    pub fn open(ctx: &Context) -> Result<Self> {
        let config = Config::load()?;
        let state_path = match &ctx.state {
            Some(path) => path.clone(),
            None => config.state_path()?,
        };
        Self::open_at(&config, state_path)
    }

    pub fn open_at(config: &Config, state_path: PathBuf) -> Result<Self> {
        log::debug!("State file: {}", state_path.display());
        let state = IamState::load(&state_path, || {
            Account::new(config.account_id.as_str(), config.partition.as_str())
        })?;
        let backend = MemoryBackend::from_account(state.account.clone());
        Ok(Self {
            state,
            backend,
            state_path,
        })
    }

    /// Persist the account contents and resource records
    pub fn save(&mut self) -> Result<()> {
        self.state.account = self.backend.snapshot();
        self.state.save(&self.state_path)
    }
}

/// Controller for a type name, or an error naming the supported types
pub fn lifecycle(type_name: &str) -> Result<&'static dyn Lifecycle> {
    resource::lifecycle_for(type_name).with_context(|| {
        format!(
            "unknown resource type '{type_name}' (supported: {})",
            resource::RESOURCE_TYPES.join(", ")
        )
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// A session backed by a state file in a fresh temp dir
    pub fn session() -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let session = Session::open_at(&Config::default(), dir.path().join("state.json")).unwrap();
        (dir, session)
    }
}
