//! Remote service handle passed to every operation
//!
//! Wraps a [`Backend`] with the run's cancellation token so no call is
//! issued after cancellation, and attaches the RPC name to every error.

use anyhow::{Context, Result};
use declarative::CancelToken;
use iamkit::Backend;

/// A backend plus the cancellation token of the current run
pub struct Remote<'a> {
    backend: &'a dyn Backend,
    cancel: CancelToken,
}

impl<'a> Remote<'a> {
    pub fn new(backend: &'a dyn Backend, cancel: CancelToken) -> Self {
        Self { backend, cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Issue one remote call
    pub fn call<T>(
        &self,
        rpc: &str,
        f: impl FnOnce(&dyn Backend) -> iamkit::Result<T>,
    ) -> Result<T> {
        self.cancel.check(rpc)?;
        log::debug!("-> {rpc}");
        f(self.backend).with_context(|| format!("{rpc} failed"))
    }

    /// Issue one remote call where "not found" means there is nothing to do
    ///
    /// Returns `Ok(None)` when the remote reports the entity as absent.
    pub fn call_tolerant<T>(
        &self,
        rpc: &str,
        f: impl FnOnce(&dyn Backend) -> iamkit::Result<T>,
    ) -> Result<Option<T>> {
        self.cancel.check(rpc)?;
        log::debug!("-> {rpc} (absence tolerated)");
        match f(self.backend) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                log::debug!("{rpc}: {e}, nothing to do");
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("{rpc} failed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamkit::MemoryBackend;

    #[test]
    fn test_call_adds_rpc_context() {
        let backend = MemoryBackend::new("123456789012", "aws");
        let remote = Remote::new(&backend, CancelToken::new());
        let err = remote.call("GetGroup", |b| b.get_group("missing")).unwrap_err();
        assert!(err.to_string().contains("GetGroup failed"));
        assert!(
            err.downcast_ref::<iamkit::Error>()
                .is_some_and(iamkit::Error::is_not_found)
        );
    }

    #[test]
    fn test_tolerant_call_swallows_not_found_only() {
        let backend = MemoryBackend::new("123456789012", "aws");
        let remote = Remote::new(&backend, CancelToken::new());
        assert!(
            remote
                .call_tolerant("GetGroup", |b| b.get_group("missing"))
                .unwrap()
                .is_none()
        );

        backend.fail_on("GetGroup", "DeleteConflict", "in use");
        assert!(remote.call_tolerant("GetGroup", |b| b.get_group("x")).is_err());
    }

    #[test]
    fn test_cancelled_remote_issues_nothing() {
        let backend = MemoryBackend::new("123456789012", "aws");
        let cancel = CancelToken::new();
        let remote = Remote::new(&backend, cancel.clone());
        cancel.cancel();
        assert!(remote.call("CreateGroup", |b| b.create_group("g", None)).is_err());
        assert!(backend.calls().is_empty());
    }
}
