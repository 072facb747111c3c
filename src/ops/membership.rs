//! Group memberships, seen from the user and from the group

use super::{changed, prepared, str_list};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, DiffResult, Operation, SharedContext, diff_keys};
use iamkit::arn::{kind, resolve_name};

const FIELD: &str = "groups";

fn group_names(node: Option<&ConfigNode>) -> Result<Vec<String>> {
    str_list(node, FIELD)?
        .iter()
        .map(|reference| resolve_name(reference, kind::GROUP).map_err(anyhow::Error::from))
        .collect()
}

/// Converge `groups`: leave dropped groups, then join new ones
///
/// Entries may be group names or group ARNs.
#[derive(Debug, Default)]
pub struct ReconcileGroupMemberships {
    diff: Option<DiffResult>,
}

impl ReconcileGroupMemberships {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'r> Operation<Remote<'r>> for ReconcileGroupMemberships {
    fn name(&self) -> &'static str {
        "reconcile_group_memberships"
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
        let result = diff_keys(&group_names(previous)?, &group_names(wanted)?);
        if !result.has_changes() {
            return Ok(false);
        }
        self.diff = Some(result);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let diff = prepared(&mut self.diff, "reconcile_group_memberships")?;
        let user = shared.require_upstream()?;

        for group in &diff.to_remove {
            remote.call("RemoveUserFromGroup", |b| b.remove_user_from_group(group, user))?;
        }
        for item in &diff.to_add {
            remote.call("AddUserToGroup", |b| b.add_user_to_group(&item.key, user))?;
        }
        Ok(())
    }
}

/// Teardown: leave every group the user belongs to
#[derive(Debug, Default)]
pub struct LeaveAllGroups;

impl<'r> Operation<Remote<'r>> for LeaveAllGroups {
    fn name(&self) -> &'static str {
        "leave_all_groups"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let user = shared.require_upstream()?;
        let groups = remote.call("ListGroupsForUser", |b| b.list_groups_for_user(user))?;
        for group in &groups {
            remote.call("RemoveUserFromGroup", |b| {
                b.remove_user_from_group(&group.name, user)
            })?;
        }
        Ok(())
    }
}

/// Teardown: remove every member of a group
#[derive(Debug, Default)]
pub struct RemoveAllMembers;

impl<'r> Operation<Remote<'r>> for RemoveAllMembers {
    fn name(&self) -> &'static str {
        "remove_group_members"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let group = shared.require_upstream()?;
        let members = remote.call("GetGroup", |b| b.list_group_members(group))?;
        for user in &members {
            remote.call("RemoveUserFromGroup", |b| b.remove_user_from_group(group, user))?;
        }
        Ok(())
    }
}

/// Group names of a user, sorted
pub fn observe(remote: &Remote<'_>, user: &str) -> Result<ConfigNode> {
    let mut names: Vec<String> = remote
        .call("ListGroupsForUser", |b| b.list_groups_for_user(user))?
        .into_iter()
        .map(|g| g.name)
        .collect();
    names.sort();
    Ok(ConfigNode::str_list(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::FieldChange;

    #[test]
    fn test_arn_and_name_references_are_the_same_group() {
        let desired = ConfigNode::empty().with(
            FIELD,
            ConfigNode::str_list(["arn:aws:iam::123456789012:group/eng/devs", "ops"]),
        );
        let changes: ChangeSet = [FieldChange::new(
            FIELD,
            Some(ConfigNode::str_list(["devs"])),
            desired.get(FIELD).cloned(),
        )]
        .into_iter()
        .collect();

        let mut op = ReconcileGroupMemberships::new();
        let applicable =
            Operation::<Remote<'_>>::prepare(&mut op, &mut SharedContext::new(), &desired, &changes)
                .unwrap();
        assert!(applicable);
        let diff = op.diff.unwrap();
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].key, "ops");
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_user_arn_rejected_as_group() {
        let desired = ConfigNode::empty().with(
            FIELD,
            ConfigNode::str_list(["arn:aws:iam::123456789012:user/alice"]),
        );
        let mut op = ReconcileGroupMemberships::new();
        let result = Operation::<Remote<'_>>::prepare(
            &mut op,
            &mut SharedContext::new(),
            &desired,
            &ChangeSet::all(&desired),
        );
        assert!(result.is_err());
    }
}
