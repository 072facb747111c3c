//! Managed-policy attachments of users, groups and roles

use super::{changed, prepared, str_list};
use crate::remote::Remote;
use anyhow::{Context, Result};
use declarative::{ChangeSet, ConfigNode, DiffResult, Operation, SharedContext, diff_keys};
use iamkit::Principal;
use iamkit::arn::{self, kind};

const FIELD: &str = "managed_policy_arns";

/// Converge `managed_policy_arns`: detach dropped ARNs, then attach new ones
#[derive(Debug)]
pub struct ReconcileManagedPolicies {
    principal: Principal,
    diff: Option<DiffResult>,
}

impl ReconcileManagedPolicies {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            diff: None,
        }
    }
}

impl<'r> Operation<Remote<'r>> for ReconcileManagedPolicies {
    fn name(&self) -> &'static str {
        "reconcile_managed_policies"
    }

    fn prepare(
        &mut self,
        _shared: &mut SharedContext,
        desired: &ConfigNode,
        changes: &ChangeSet,
    ) -> Result<bool> {
        let Some((previous, wanted)) = changed(changes, desired, FIELD) else {
            return Ok(false);
        };
        let current = str_list(previous, FIELD)?;
        let wanted = str_list(wanted, FIELD)?;
        for policy_arn in &wanted {
            arn::extract_name(policy_arn, kind::POLICY)
                .with_context(|| format!("{FIELD} contains an invalid policy ARN"))?;
        }

        let result = diff_keys(&current, &wanted);
        if !result.has_changes() {
            return Ok(false);
        }
        self.diff = Some(result);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let diff = prepared(&mut self.diff, "reconcile_managed_policies")?;
        let principal = self.principal;
        let name = shared.require_upstream()?;

        for policy_arn in &diff.to_remove {
            remote.call(&format!("Detach{}Policy", principal.noun()), |b| {
                b.detach_policy(principal, name, policy_arn)
            })?;
        }
        for item in &diff.to_add {
            remote.call(&format!("Attach{}Policy", principal.noun()), |b| {
                b.attach_policy(principal, name, &item.key)
            })?;
        }
        Ok(())
    }
}

/// Teardown: list attached policies, detach each
#[derive(Debug)]
pub struct DetachManagedPolicies {
    principal: Principal,
}

impl DetachManagedPolicies {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }
}

impl<'r> Operation<Remote<'r>> for DetachManagedPolicies {
    fn name(&self) -> &'static str {
        "detach_managed_policies"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let principal = self.principal;
        let name = shared.require_upstream()?;
        let attached = remote.call(&format!("ListAttached{}Policies", principal.noun()), |b| {
            b.list_attached_policies(principal, name)
        })?;
        for policy in &attached {
            remote.call(&format!("Detach{}Policy", principal.noun()), |b| {
                b.detach_policy(principal, name, &policy.policy_arn)
            })?;
        }
        Ok(())
    }
}

/// Attached policy ARNs, sorted
pub fn observe(remote: &Remote<'_>, principal: Principal, name: &str) -> Result<ConfigNode> {
    let mut arns: Vec<String> = remote
        .call(&format!("ListAttached{}Policies", principal.noun()), |b| {
            b.list_attached_policies(principal, name)
        })?
        .into_iter()
        .map(|p| p.policy_arn)
        .collect();
    arns.sort();
    Ok(ConfigNode::str_list(arns))
}
