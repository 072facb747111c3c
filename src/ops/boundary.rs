//! Permissions boundary of users and roles

use super::{changed, prepared};
use crate::remote::Remote;
use anyhow::{Context, Result};
use declarative::{ChangeSet, ConfigNode, Operation, SharedContext};
use iamkit::Principal;
use iamkit::arn::{self, kind};

const FIELD: &str = "permissions_boundary";

#[derive(Debug)]
enum Action {
    Put(String),
    Remove,
}

/// Set, replace or remove `permissions_boundary`
#[derive(Debug)]
pub struct ReconcileBoundary {
    principal: Principal,
    action: Option<Action>,
}

impl ReconcileBoundary {
    pub fn new(principal: Principal) -> Self {
        debug_assert!(principal.supports_boundary());
        Self {
            principal,
            action: None,
        }
    }
}

impl<'r> Operation<Remote<'r>> for ReconcileBoundary {
    fn name(&self) -> &'static str {
        "reconcile_permissions_boundary"
    }

    fn prepare(
        &mut self,
        _shared: &mut SharedContext,
        desired: &ConfigNode,
        changes: &ChangeSet,
    ) -> Result<bool> {
        let Some((previous, _)) = changed(changes, desired, FIELD) else {
            return Ok(false);
        };
        let previous = previous.and_then(ConfigNode::as_str);
        let wanted = desired.optional_str(FIELD)?;

        self.action = match (previous, wanted) {
            (before, Some(after)) if before != Some(after) => {
                arn::extract_name(after, kind::POLICY)
                    .with_context(|| format!("{FIELD} must be a policy ARN"))?;
                Some(Action::Put(after.to_string()))
            }
            (Some(_), None) => Some(Action::Remove),
            _ => None,
        };
        Ok(self.action.is_some())
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let action = prepared(&mut self.action, "reconcile_permissions_boundary")?;
        let principal = self.principal;
        let name = shared.require_upstream()?;

        match action {
            Action::Put(policy_arn) => {
                remote.call(&format!("Put{}PermissionsBoundary", principal.noun()), |b| {
                    b.put_permissions_boundary(principal, name, &policy_arn)
                })?;
            }
            Action::Remove => {
                remote.call(&format!("Delete{}PermissionsBoundary", principal.noun()), |b| {
                    b.delete_permissions_boundary(principal, name)
                })?;
            }
        }
        Ok(())
    }
}
