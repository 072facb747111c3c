//! Best-effort teardown steps
//!
//! These run between the attachment teardown and the primary delete. A
//! "not found" from the remote means the step has nothing to do; any other
//! error still aborts the run.

use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, SharedContext};
use iamkit::Principal;

/// Remove the permissions boundary of a user or role
#[derive(Debug)]
pub struct RemoveBoundary {
    principal: Principal,
}

impl RemoveBoundary {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }
}

impl<'r> Operation<Remote<'r>> for RemoveBoundary {
    fn name(&self) -> &'static str {
        "remove_permissions_boundary"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(self.principal.supports_boundary())
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let principal = self.principal;
        let name = shared.require_upstream()?;
        remote.call_tolerant(
            &format!("Delete{}PermissionsBoundary", principal.noun()),
            |b| b.delete_permissions_boundary(principal, name),
        )?;
        Ok(())
    }
}

/// Delete the login profile of a user
#[derive(Debug, Default)]
pub struct DeleteLoginProfile;

impl<'r> Operation<Remote<'r>> for DeleteLoginProfile {
    fn name(&self) -> &'static str {
        "delete_login_profile"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let user = shared.require_upstream()?;
        remote.call_tolerant("DeleteLoginProfile", |b| b.delete_login_profile(user))?;
        Ok(())
    }
}

/// Delete every access key of a user
#[derive(Debug, Default)]
pub struct DeleteAccessKeys;

impl<'r> Operation<Remote<'r>> for DeleteAccessKeys {
    fn name(&self) -> &'static str {
        "delete_access_keys"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let user = shared.require_upstream()?;
        let keys = remote
            .call_tolerant("ListAccessKeys", |b| b.list_access_keys(user))?
            .unwrap_or_default();
        for key in &keys {
            remote.call_tolerant("DeleteAccessKey", |b| {
                b.delete_access_key(user, &key.access_key_id)
            })?;
        }
        Ok(())
    }
}

/// Delete every non-default version of a managed policy
///
/// Reads the policy ARN from the `arn` context value.
#[derive(Debug, Default)]
pub struct DeleteNonDefaultVersions;

impl<'r> Operation<Remote<'r>> for DeleteNonDefaultVersions {
    fn name(&self) -> &'static str {
        "delete_policy_versions"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let arn = shared.require_str("arn")?;
        let versions = remote
            .call_tolerant("ListPolicyVersions", |b| b.list_policy_versions(arn))?
            .unwrap_or_default();
        for version in versions.iter().filter(|v| !v.is_default) {
            remote.call_tolerant("DeletePolicyVersion", |b| {
                b.delete_policy_version(arn, &version.version_id)
            })?;
        }
        Ok(())
    }
}
