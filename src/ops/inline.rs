//! Inline policies of users, groups and roles

use super::{changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::normalize::{canonical_json, named_documents};
use declarative::{ChangeSet, ConfigNode, DiffResult, Operation, SharedContext, canonical_eq, diff};
use iamkit::Principal;

const FIELD: &str = "inline_policies";

/// Converge `inline_policies` (`[{name, document}]`)
#[derive(Debug)]
pub struct ReconcileInlinePolicies {
    principal: Principal,
    diff: Option<DiffResult>,
}

impl ReconcileInlinePolicies {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            diff: None,
        }
    }
}

impl<'r> Operation<Remote<'r>> for ReconcileInlinePolicies {
    fn name(&self) -> &'static str {
        "reconcile_inline_policies"
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
        let current = named_documents(previous, FIELD, "document")?;
        let wanted = named_documents(wanted, FIELD, "document")?;
        let result = diff(&current, &wanted, canonical_eq);
        if !result.has_changes() {
            return Ok(false);
        }
        self.diff = Some(result);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let diff = prepared(&mut self.diff, "reconcile_inline_policies")?;
        let principal = self.principal;
        let name = shared.require_upstream()?;

        for policy_name in &diff.to_remove {
            remote.call(&format!("Delete{}Policy", principal.noun()), |b| {
                b.delete_inline_policy(principal, name, policy_name)
            })?;
        }
        for item in diff.upserts() {
            let document = canonical_json(&item.value);
            remote.call(&format!("Put{}Policy", principal.noun()), |b| {
                b.put_inline_policy(principal, name, &item.key, &document)
            })?;
        }

        log::info!(
            "{principal} {name}: {} inline policies written, {} removed",
            diff.to_add.len() + diff.to_update.len(),
            diff.to_remove.len()
        );
        Ok(())
    }
}

/// Teardown: list inline policies, delete each
#[derive(Debug)]
pub struct DeleteInlinePolicies {
    principal: Principal,
}

impl DeleteInlinePolicies {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }
}

impl<'r> Operation<Remote<'r>> for DeleteInlinePolicies {
    fn name(&self) -> &'static str {
        "delete_inline_policies"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let principal = self.principal;
        let name = shared.require_upstream()?;
        let policies = remote.call(&format!("List{}Policies", principal.noun()), |b| {
            b.list_inline_policies(principal, name)
        })?;
        for policy_name in &policies {
            remote.call(&format!("Delete{}Policy", principal.noun()), |b| {
                b.delete_inline_policy(principal, name, policy_name)
            })?;
        }
        Ok(())
    }
}

/// Observed inline policies in the desired shape, sorted by name
pub fn observe(remote: &Remote<'_>, principal: Principal, name: &str) -> Result<ConfigNode> {
    let names = remote.call(&format!("List{}Policies", principal.noun()), |b| {
        b.list_inline_policies(principal, name)
    })?;
    let mut entries = Vec::with_capacity(names.len());
    for policy_name in names {
        let document = remote.call(&format!("Get{}Policy", principal.noun()), |b| {
            b.get_inline_policy(principal, name, &policy_name)
        })?;
        entries.push(
            ConfigNode::empty()
                .with("name", ConfigNode::str(policy_name))
                .with("document", declarative::normalize::document(&ConfigNode::str(document))),
        );
    }
    Ok(ConfigNode::list(entries))
}
