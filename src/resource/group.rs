//! iam_group controller

use super::{
    Computed, Lifecycle, adopt, collect, execute, execute_create, execute_update, name_from_arn,
    rebase, seed,
};
use crate::ops::{
    self, DeleteInlinePolicies, DetachManagedPolicies, RemoveAllMembers, changed, prepared,
};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext};
use iamkit::Principal;
use iamkit::arn::kind;

const COMPUTED: &[&str] = &["arn", "group_id"];

#[derive(Debug, Default)]
pub struct GroupLifecycle;

/// Publish the observed group into the context
fn record(shared: &mut SharedContext, group: &iamkit::Group) {
    shared.insert_str("arn", &group.arn);
    shared.insert_str("group_id", &group.group_id);
}

fn identity(group: &iamkit::Group) -> Computed {
    let mut shared = SharedContext::new();
    record(&mut shared, group);
    collect(&shared, COMPUTED)
}

#[derive(Debug, Default)]
struct CreateGroup {
    request: Option<(String, Option<String>)>,
}

impl<'r> Operation<Remote<'r>> for CreateGroup {
    fn name(&self) -> &'static str {
        "create_group"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        let name = desired.required_str("name")?.to_string();
        let path = desired.optional_str("path")?.map(str::to_string);
        self.request = Some((name, path));
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let (name, path) = prepared(&mut self.request, "create_group")?;
        let group = remote.call("CreateGroup", |b| b.create_group(&name, path.as_deref()))?;
        shared.upstream_id = Some(group.name.clone());
        record(shared, &group);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UpdateGroupPath {
    path: Option<String>,
}

impl<'r> Operation<Remote<'r>> for UpdateGroupPath {
    fn name(&self) -> &'static str {
        "update_group"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, _)) = changed(changes, desired, "path") else {
            return Ok(false);
        };
        let path = desired.optional_str("path")?.unwrap_or("/");
        if previous.and_then(ConfigNode::as_str) == Some(path) {
            return Ok(false);
        }
        self.path = Some(path.to_string());
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let path = prepared(&mut self.path, "update_group")?;
        let name = shared.require_upstream()?;
        remote.call("UpdateGroup", |b| b.update_group(name, &path))
    }
}

#[derive(Debug, Default)]
struct DeleteGroup;

impl<'r> Operation<Remote<'r>> for DeleteGroup {
    fn name(&self) -> &'static str {
        "delete_group"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let name = shared.require_upstream()?;
        remote.call("DeleteGroup", |b| b.delete_group(name))
    }
}

impl Lifecycle for GroupLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_group"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let name = desired.required_str("name")?;
            if let Some(group) = remote.call_tolerant("GetGroup", |b| b.get_group(name))? {
                return adopt(self, remote, desired, identity(&group));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateGroup::default());
        plan.push_if(
            desired.declares("inline_policies"),
            ops::ReconcileInlinePolicies::new(Principal::Group),
        );
        plan.push_if(
            desired.declares("managed_policy_arns"),
            ops::ReconcileManagedPolicies::new(Principal::Group),
        );
        execute_create(remote, plan, desired, changes, COMPUTED)
    }

    fn update(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        changes: &ChangeSet,
        previous: &Computed,
    ) -> Result<Computed> {
        let name = name_from_arn(previous, kind::GROUP)?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(UpdateGroupPath::default())
            .then(ops::ReconcileInlinePolicies::new(Principal::Group))
            .then(ops::ReconcileManagedPolicies::new(Principal::Group));

        execute_update(remote, seed(&name, previous), plan, desired, &changes, previous, |_| {
            let group = remote.call("GetGroup", |b| b.get_group(&name))?;
            Ok(identity(&group))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let name = name_from_arn(previous, kind::GROUP)?;
        let plan = Plan::new()
            .then(RemoveAllMembers)
            .then(DeleteInlinePolicies::new(Principal::Group))
            .then(DetachManagedPolicies::new(Principal::Group))
            .then(DeleteGroup);
        execute(remote, seed(&name, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        _desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let name = name_from_arn(previous, kind::GROUP)?;
        let Some(group) = remote.call_tolerant("GetGroup", |b| b.get_group(&name))? else {
            return Ok(ConfigNode::empty());
        };
        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(&group.name))
            .with("path", ConfigNode::str(&group.path))
            .with(
                "inline_policies",
                ops::inline::observe(remote, Principal::Group, &group.name)?,
            )
            .with(
                "managed_policy_arns",
                ops::managed::observe(remote, Principal::Group, &group.name)?,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, doc, mutations, str_field};
    use declarative::CancelToken;
    use iamkit::{Backend, MemoryBackend, NewUser};

    const READ_ONLY: &str = "arn:aws:iam::aws:policy/ReadOnlyAccess";
    const AUDIT: &str = "arn:aws:iam::aws:policy/SecurityAudit";
    use pretty_assertions::assert_eq;

    fn admins() -> ConfigNode {
        ConfigNode::empty()
            .with("name", ConfigNode::str("admins"))
            .with(
                "inline_policies",
                ConfigNode::list([ConfigNode::empty()
                    .with("name", ConfigNode::str("p1"))
                    .with("document", doc("s3:*"))]),
            )
            .with(
                "managed_policy_arns",
                ConfigNode::str_list([READ_ONLY, AUDIT]),
            )
    }

    fn create_admins(backend: &MemoryBackend) -> Computed {
        let remote = Remote::new(backend, CancelToken::new());
        let desired = admins();
        GroupLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap()
    }

    #[test]
    fn test_create_records_identity() {
        let backend = backend();
        let computed = create_admins(&backend);
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:group/admins"
        );
        assert!(str_field(&computed, "group_id").starts_with("AGPA"));
        assert_eq!(
            backend.calls(),
            vec![
                "GetGroup",
                "CreateGroup",
                "PutGroupPolicy",
                "AttachGroupPolicy",
                "AttachGroupPolicy"
            ]
        );
    }

    #[test]
    fn test_create_without_changes_fails() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let err = GroupLifecycle
            .create(&remote, &admins(), &ChangeSet::new())
            .unwrap_err();
        assert!(err.to_string().contains("nothing to create"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_destroy_tears_down_in_dependency_order() {
        let backend = backend();
        let computed = create_admins(&backend);
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        GroupLifecycle
            .destroy(&remote, &admins(), &computed)
            .unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "GetGroup",
                "ListGroupPolicies",
                "DeleteGroupPolicy",
                "ListAttachedGroupPolicies",
                "DetachGroupPolicy",
                "DetachGroupPolicy",
                "DeleteGroup",
            ]
        );
        assert!(backend.get_group("admins").unwrap_err().is_not_found());
    }

    #[test]
    fn test_detach_failure_never_deletes_group() {
        let backend = backend();
        let computed = create_admins(&backend);
        backend.clear_calls();
        backend.fail_on("DetachGroupPolicy", "ServiceFailure", "boom");

        let remote = Remote::new(&backend, CancelToken::new());
        let err = GroupLifecycle
            .destroy(&remote, &admins(), &computed)
            .unwrap_err();
        assert!(err.to_string().contains("detach_managed_policies failed"));
        assert!(!backend.calls().iter().any(|c| c == "DeleteGroup"));
        backend.clear_failures();
        assert!(backend.get_group("admins").is_ok());
    }

    #[test]
    fn test_update_without_changes_returns_previous() {
        let backend = backend();
        let computed = create_admins(&backend);
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        let updated = GroupLifecycle
            .update(&remote, &admins(), &ChangeSet::new(), &computed)
            .unwrap();
        assert_eq!(updated, computed);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_update_path_refreshes_arn() {
        let backend = backend();
        let computed = create_admins(&backend);
        let desired = admins().with("path", ConfigNode::str("/eng/"));

        let remote = Remote::new(&backend, CancelToken::new());
        let updated = GroupLifecycle
            .update(&remote, &desired, &changes(&admins(), &desired), &computed)
            .unwrap();
        assert_eq!(
            str_field(&updated, "arn"),
            "arn:aws:iam::123456789012:group/eng/admins"
        );
    }

    #[test]
    fn test_external_state_of_deleted_group_is_empty() {
        let backend = backend();
        let computed = create_admins(&backend);
        let remote = Remote::new(&backend, CancelToken::new());

        let observed = GroupLifecycle
            .external_state(&remote, &admins(), &computed)
            .unwrap();
        assert_eq!(
            observed.get("managed_policy_arns").unwrap().as_list().unwrap().len(),
            2
        );

        GroupLifecycle.destroy(&remote, &admins(), &computed).unwrap();
        let observed = GroupLifecycle
            .external_state(&remote, &admins(), &computed)
            .unwrap();
        assert!(observed.is_empty());
    }

    fn attached(backend: &MemoryBackend) -> Vec<String> {
        backend
            .list_attached_policies(Principal::Group, "admins")
            .unwrap()
            .into_iter()
            .map(|p| p.policy_arn)
            .collect()
    }

    #[test]
    fn test_destroy_removes_members_first() {
        let backend = backend();
        let computed = create_admins(&backend);
        for user in ["alice", "bob"] {
            backend
                .create_user(&NewUser {
                    name: user.into(),
                    ..NewUser::default()
                })
                .unwrap();
            backend.add_user_to_group("admins", user).unwrap();
        }
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        GroupLifecycle.destroy(&remote, &admins(), &computed).unwrap();
        assert_eq!(
            backend.calls()[..3],
            ["GetGroup", "RemoveUserFromGroup", "RemoveUserFromGroup"]
        );
        assert!(backend.list_groups_for_user("alice").unwrap().is_empty());
        assert!(backend.get_group("admins").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_diffs_against_remote_attachments() {
        let backend = backend();
        let computed = create_admins(&backend);
        backend.detach_policy(Principal::Group, "admins", READ_ONLY).unwrap();
        backend
            .attach_policy(Principal::Group, "admins", "arn:aws:iam::aws:policy/PowerUserAccess")
            .unwrap();
        backend.clear_calls();

        let desired = admins().with("managed_policy_arns", ConfigNode::str_list(Vec::<&str>::new()));
        let remote = Remote::new(&backend, CancelToken::new());
        GroupLifecycle
            .update(&remote, &desired, &changes(&admins(), &desired), &computed)
            .unwrap();
        assert!(attached(&backend).is_empty());
        assert_eq!(
            mutations(&backend),
            vec!["DetachGroupPolicy", "DetachGroupPolicy"]
        );
    }

    #[test]
    fn test_update_restores_drifted_attachment() {
        let backend = backend();
        let computed = create_admins(&backend);
        backend.detach_policy(Principal::Group, "admins", AUDIT).unwrap();
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        let observed = GroupLifecycle.external_state(&remote, &admins(), &computed).unwrap();
        let drifted = crate::resource::drift(&GroupLifecycle, &admins(), &observed);
        assert_eq!(drifted.paths(), vec!["managed_policy_arns"]);

        GroupLifecycle
            .update(&remote, &admins(), &drifted, &computed)
            .unwrap();
        assert_eq!(attached(&backend), vec![READ_ONLY, AUDIT]);
        assert_eq!(mutations(&backend), vec!["AttachGroupPolicy"]);
    }

    #[test]
    fn test_create_retry_adopts_partial_group() {
        let backend = backend();
        backend.fail_on("AttachGroupPolicy", "ServiceFailure", "boom");
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = admins();
        let err = GroupLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap_err();
        assert!(err.to_string().contains("reconcile_managed_policies failed"));
        assert!(backend.get_group("admins").is_ok());

        backend.clear_failures();
        backend.clear_calls();
        let computed = GroupLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:group/admins"
        );
        assert_eq!(
            mutations(&backend),
            vec!["AttachGroupPolicy", "AttachGroupPolicy"]
        );
        assert_eq!(attached(&backend), vec![READ_ONLY, AUDIT]);
    }
}
