//! iam_user controller
//!
//! A user owns the widest set of sub-resources: boundary, tags, inline and
//! managed policies, group memberships and a console login profile. Access
//! keys are separate `iam_access_key` resources but are still removed when
//! the user is destroyed, since the remote refuses to delete a user that
//! has any.

use super::{
    Computed, Lifecycle, adopt, collect, execute, execute_create, execute_update, name_from_arn,
    rebase, seed,
};
use crate::ops::login_profile::PASSWORD_KEY;
use crate::ops::{self, changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext};
use iamkit::arn::kind;
use iamkit::{NewUser, Principal, TagTarget};

const COMPUTED: &[&str] = &["arn", "user_id", PASSWORD_KEY];

#[derive(Debug, Default)]
pub struct UserLifecycle;

fn record(shared: &mut SharedContext, user: &iamkit::User) {
    shared.insert_str("arn", &user.arn);
    shared.insert_str("user_id", &user.user_id);
}

fn identity(user: &iamkit::User) -> Computed {
    let mut shared = SharedContext::new();
    record(&mut shared, user);
    collect(&shared, COMPUTED)
}

#[derive(Debug, Default)]
struct CreateUser {
    request: Option<NewUser>,
}

impl<'r> Operation<Remote<'r>> for CreateUser {
    fn name(&self) -> &'static str {
        "create_user"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewUser {
            name: desired.required_str("name")?.to_string(),
            path: desired.optional_str("path")?.map(str::to_string),
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_user")?;
        let user = remote.call("CreateUser", |b| b.create_user(&request))?;
        shared.upstream_id = Some(user.name.clone());
        record(shared, &user);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UpdateUserPath {
    path: Option<String>,
}

impl<'r> Operation<Remote<'r>> for UpdateUserPath {
    fn name(&self) -> &'static str {
        "update_user"
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
        let path = prepared(&mut self.path, "update_user")?;
        let name = shared.require_upstream()?;
        remote.call("UpdateUser", |b| b.update_user(name, &path))
    }
}

#[derive(Debug, Default)]
struct DeleteUser;

impl<'r> Operation<Remote<'r>> for DeleteUser {
    fn name(&self) -> &'static str {
        "delete_user"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let name = shared.require_upstream()?;
        remote.call("DeleteUser", |b| b.delete_user(name))
    }
}

impl Lifecycle for UserLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_user"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let name = desired.required_str("name")?;
            if let Some(user) = remote.call_tolerant("GetUser", |b| b.get_user(name))? {
                return adopt(self, remote, desired, identity(&user));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateUser::default());
        plan.push_if(
            desired.declares("permissions_boundary"),
            ops::ReconcileBoundary::new(Principal::User),
        );
        plan.push_if(desired.declares("tags"), ops::ReconcileTags::by_name(TagTarget::User));
        plan.push_if(
            desired.declares("inline_policies"),
            ops::ReconcileInlinePolicies::new(Principal::User),
        );
        plan.push_if(
            desired.declares("managed_policy_arns"),
            ops::ReconcileManagedPolicies::new(Principal::User),
        );
        plan.push_if(desired.declares("groups"), ops::ReconcileGroupMemberships::new());
        plan.push_if(desired.declares("login_profile"), ops::ReconcileLoginProfile::new());
        execute_create(remote, plan, desired, changes, COMPUTED)
    }

    fn update(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        changes: &ChangeSet,
        previous: &Computed,
    ) -> Result<Computed> {
        let name = name_from_arn(previous, kind::USER)?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(UpdateUserPath::default())
            .then(ops::ReconcileBoundary::new(Principal::User))
            .then(ops::ReconcileTags::by_name(TagTarget::User))
            .then(ops::ReconcileInlinePolicies::new(Principal::User))
            .then(ops::ReconcileManagedPolicies::new(Principal::User))
            .then(ops::ReconcileGroupMemberships::new())
            .then(ops::ReconcileLoginProfile::new());

        let mut computed = execute_update(
            remote,
            seed(&name, previous),
            plan,
            desired,
            &changes,
            previous,
            |context| {
                let user = remote.call("GetUser", |b| b.get_user(&name))?;
                let mut shared = context.clone();
                record(&mut shared, &user);
                Ok(collect(&shared, COMPUTED))
            },
        )?;
        if !desired.declares("login_profile") {
            computed.remove(PASSWORD_KEY);
        }
        Ok(computed)
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let name = name_from_arn(previous, kind::USER)?;
        let plan = Plan::new()
            .then(ops::LeaveAllGroups)
            .then(ops::DeleteInlinePolicies::new(Principal::User))
            .then(ops::DetachManagedPolicies::new(Principal::User))
            .then(ops::RemoveBoundary::new(Principal::User))
            .then(ops::DeleteLoginProfile)
            .then(ops::DeleteAccessKeys)
            .then(DeleteUser);
        execute(remote, seed(&name, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let name = name_from_arn(previous, kind::USER)?;
        let Some(user) = remote.call_tolerant("GetUser", |b| b.get_user(&name))? else {
            return Ok(ConfigNode::empty());
        };

        // The password length is write-only; mirror what was asked for.
        let login_profile = remote
            .call_tolerant("GetLoginProfile", |b| b.get_login_profile(&user.name))?
            .map(|profile| {
                ConfigNode::empty()
                    .with(
                        "password_reset_required",
                        ConfigNode::bool(profile.password_reset_required),
                    )
                    .with_opt(
                        "password_length",
                        desired.get("login_profile.password_length").cloned(),
                    )
            });

        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(&user.name))
            .with("path", ConfigNode::str(&user.path))
            .with_opt(
                "permissions_boundary",
                user.permissions_boundary.as_deref().map(ConfigNode::str),
            )
            .with("tags", ops::tags::to_node(&user.tags))
            .with(
                "inline_policies",
                ops::inline::observe(remote, Principal::User, &user.name)?,
            )
            .with(
                "managed_policy_arns",
                ops::managed::observe(remote, Principal::User, &user.name)?,
            )
            .with("groups", ops::membership::observe(remote, &user.name)?)
            .with_opt("login_profile", login_profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, doc, mutations, str_field};
    use declarative::CancelToken;
    use iamkit::{Backend, MemoryBackend, Tag};
    use pretty_assertions::assert_eq;

    fn alice() -> ConfigNode {
        ConfigNode::empty()
            .with("name", ConfigNode::str("alice"))
            .with(
                "permissions_boundary",
                ConfigNode::str("arn:aws:iam::aws:policy/PowerUserAccess"),
            )
            .with(
                "tags",
                ops::tags::to_node(&[Tag::new("team", "a"), Tag::new("env", "dev")]),
            )
            .with(
                "inline_policies",
                ConfigNode::list([ConfigNode::empty()
                    .with("name", ConfigNode::str("s3"))
                    .with("document", doc("s3:GetObject"))]),
            )
            .with(
                "managed_policy_arns",
                ConfigNode::str_list(["arn:aws:iam::aws:policy/ReadOnlyAccess"]),
            )
            .with("groups", ConfigNode::str_list(["devs"]))
            .with(
                "login_profile",
                ConfigNode::empty().with("password_reset_required", ConfigNode::bool(true)),
            )
    }

    fn setup() -> (MemoryBackend, Computed) {
        let backend = backend();
        backend.create_group("devs", None).unwrap();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = alice();
        let computed = UserLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        backend.clear_calls();
        (backend, computed)
    }

    #[test]
    fn test_create_runs_declared_sub_resources() {
        let (backend, computed) = setup();
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:user/alice"
        );
        assert_eq!(str_field(&computed, PASSWORD_KEY).len(), 20);

        let user = backend.get_user("alice").unwrap();
        assert_eq!(
            user.permissions_boundary.as_deref(),
            Some("arn:aws:iam::aws:policy/PowerUserAccess")
        );
        assert_eq!(backend.list_groups_for_user("alice").unwrap().len(), 1);
        assert!(backend.get_login_profile("alice").unwrap().password_reset_required);
    }

    #[test]
    fn test_create_skips_undeclared_kinds() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = ConfigNode::empty().with("name", ConfigNode::str("bob"));
        let computed = UserLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(backend.calls(), vec!["GetUser", "CreateUser"]);
        assert!(!computed.contains_key(PASSWORD_KEY));
    }

    #[test]
    fn test_single_tag_change_is_one_call() {
        let (backend, computed) = setup();
        let desired = alice().with(
            "tags",
            ops::tags::to_node(&[Tag::new("team", "b"), Tag::new("env", "dev")]),
        );
        let remote = Remote::new(&backend, CancelToken::new());
        UserLifecycle
            .update(&remote, &desired, &changes(&alice(), &desired), &computed)
            .unwrap();

        assert_eq!(mutations(&backend), vec!["TagUser"]);
        let tags = backend.list_tags(&TagTarget::User("alice".into())).unwrap();
        assert!(tags.contains(&Tag::new("team", "b")));
        assert!(tags.contains(&Tag::new("env", "dev")));
    }

    #[test]
    fn test_dropping_login_profile_deletes_it() {
        let (backend, computed) = setup();
        let mut desired = alice();
        if let ConfigNode::Map(fields) = &mut desired {
            fields.remove("login_profile");
        }
        let remote = Remote::new(&backend, CancelToken::new());
        let updated = UserLifecycle
            .update(&remote, &desired, &changes(&alice(), &desired), &computed)
            .unwrap();

        assert!(backend.get_login_profile("alice").unwrap_err().is_not_found());
        assert!(!updated.contains_key(PASSWORD_KEY));
    }

    #[test]
    fn test_destroy_order() {
        let (backend, computed) = setup();
        backend.create_access_key("alice").unwrap();
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        UserLifecycle.destroy(&remote, &alice(), &computed).unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "ListGroupsForUser",
                "RemoveUserFromGroup",
                "ListUserPolicies",
                "DeleteUserPolicy",
                "ListAttachedUserPolicies",
                "DetachUserPolicy",
                "DeleteUserPermissionsBoundary",
                "DeleteLoginProfile",
                "ListAccessKeys",
                "DeleteAccessKey",
                "DeleteUser",
            ]
        );
        assert!(backend.get_user("alice").unwrap_err().is_not_found());
        assert_eq!(backend.get_group("devs").unwrap().name, "devs");
    }

    #[test]
    fn test_bare_user_destroy_tolerates_absent_parts() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = ConfigNode::empty().with("name", ConfigNode::str("bob"));
        let computed = UserLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();

        UserLifecycle.destroy(&remote, &desired, &computed).unwrap();
        assert!(backend.get_user("bob").unwrap_err().is_not_found());
    }

    #[test]
    fn test_observed_state_matches_desired() {
        let (backend, computed) = setup();
        let remote = Remote::new(&backend, CancelToken::new());
        let observed = UserLifecycle
            .external_state(&remote, &alice(), &computed)
            .unwrap();

        assert_eq!(observed.get("groups"), alice().get("groups"));
        assert_eq!(
            observed.get("managed_policy_arns"),
            alice().get("managed_policy_arns")
        );
        assert_eq!(observed.get("login_profile"), alice().get("login_profile"));
        assert_eq!(observed.get("tags"), alice().get("tags"));
    }

    #[test]
    fn test_update_rejoins_group_left_outside() {
        let (backend, computed) = setup();
        backend.create_group("ops", None).unwrap();
        backend.create_group("admins", None).unwrap();
        backend.remove_user_from_group("devs", "alice").unwrap();
        backend.add_user_to_group("ops", "alice").unwrap();
        backend.clear_calls();

        // Recorded groups are [devs]; the remote holds [ops].
        let desired = alice().with("groups", ConfigNode::str_list(["devs", "admins"]));
        let remote = Remote::new(&backend, CancelToken::new());
        UserLifecycle
            .update(&remote, &desired, &changes(&alice(), &desired), &computed)
            .unwrap();

        let mut groups: Vec<String> = backend
            .list_groups_for_user("alice")
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        groups.sort();
        assert_eq!(groups, vec!["admins", "devs"]);
        assert_eq!(
            mutations(&backend),
            vec!["RemoveUserFromGroup", "AddUserToGroup", "AddUserToGroup"]
        );
    }

    #[test]
    fn test_create_retry_converges_existing_user() {
        let backend = backend();
        backend.create_group("devs", None).unwrap();
        backend.fail_on("AddUserToGroup", "ServiceFailure", "boom");
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = alice();
        assert!(
            UserLifecycle
                .create(&remote, &desired, &ChangeSet::all(&desired))
                .is_err()
        );

        backend.clear_failures();
        backend.clear_calls();
        let computed = UserLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:user/alice"
        );
        assert_eq!(str_field(&computed, PASSWORD_KEY).len(), 20);
        assert_eq!(
            mutations(&backend),
            vec!["AddUserToGroup", "CreateLoginProfile"]
        );
    }
}
