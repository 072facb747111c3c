//! iam_instance_profile controller

use super::{
    Computed, Lifecycle, adopt, collect, execute, execute_create, execute_update, name_from_arn,
    rebase, seed,
};
use crate::ops::{self, changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext};
use iamkit::arn::{kind, resolve_name};
use iamkit::{NewInstanceProfile, TagTarget};

const COMPUTED: &[&str] = &["arn", "instance_profile_id"];

#[derive(Debug, Default)]
pub struct InstanceProfileLifecycle;

fn record(shared: &mut SharedContext, profile: &iamkit::InstanceProfile) {
    shared.insert_str("arn", &profile.arn);
    shared.insert_str("instance_profile_id", &profile.instance_profile_id);
}

fn identity(profile: &iamkit::InstanceProfile) -> Computed {
    let mut shared = SharedContext::new();
    record(&mut shared, profile);
    collect(&shared, COMPUTED)
}

fn role_name(node: Option<&ConfigNode>) -> Result<Option<String>> {
    node.and_then(ConfigNode::as_str)
        .map(|reference| resolve_name(reference, kind::ROLE))
        .transpose()
        .map_err(anyhow::Error::from)
}

#[derive(Debug, Default)]
struct CreateInstanceProfile {
    request: Option<NewInstanceProfile>,
}

impl<'r> Operation<Remote<'r>> for CreateInstanceProfile {
    fn name(&self) -> &'static str {
        "create_instance_profile"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewInstanceProfile {
            name: desired.required_str("name")?.to_string(),
            path: desired.optional_str("path")?.map(str::to_string),
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_instance_profile")?;
        let profile = remote.call("CreateInstanceProfile", |b| {
            b.create_instance_profile(&request)
        })?;
        shared.upstream_id = Some(profile.name.clone());
        record(shared, &profile);
        Ok(())
    }
}

/// Swap the single role of the profile
#[derive(Debug, Default)]
struct ReconcileProfileRole {
    swap: Option<(Option<String>, Option<String>)>,
}

impl<'r> Operation<Remote<'r>> for ReconcileProfileRole {
    fn name(&self) -> &'static str {
        "reconcile_profile_role"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, wanted)) = changed(changes, desired, "role") else {
            return Ok(false);
        };
        let previous = role_name(previous)?;
        let wanted = role_name(wanted)?;
        if previous == wanted {
            return Ok(false);
        }
        self.swap = Some((previous, wanted));
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let (previous, wanted) = prepared(&mut self.swap, "reconcile_profile_role")?;
        let profile = shared.require_upstream()?;
        if let Some(role) = previous {
            remote.call("RemoveRoleFromInstanceProfile", |b| {
                b.remove_role_from_instance_profile(profile, &role)
            })?;
        }
        if let Some(role) = wanted {
            remote.call("AddRoleToInstanceProfile", |b| {
                b.add_role_to_instance_profile(profile, &role)
            })?;
        }
        Ok(())
    }
}

/// Teardown: unbind every role still in the profile
#[derive(Debug, Default)]
struct RemoveRoles;

impl<'r> Operation<Remote<'r>> for RemoveRoles {
    fn name(&self) -> &'static str {
        "remove_profile_roles"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let name = shared.require_upstream()?;
        let profile = remote.call("GetInstanceProfile", |b| b.get_instance_profile(name))?;
        for role in &profile.roles {
            remote.call("RemoveRoleFromInstanceProfile", |b| {
                b.remove_role_from_instance_profile(name, role)
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DeleteInstanceProfile;

impl<'r> Operation<Remote<'r>> for DeleteInstanceProfile {
    fn name(&self) -> &'static str {
        "delete_instance_profile"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let name = shared.require_upstream()?;
        remote.call("DeleteInstanceProfile", |b| b.delete_instance_profile(name))
    }
}

impl Lifecycle for InstanceProfileLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_instance_profile"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name", "path"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let name = desired.required_str("name")?;
            if let Some(profile) =
                remote.call_tolerant("GetInstanceProfile", |b| b.get_instance_profile(name))?
            {
                return adopt(self, remote, desired, identity(&profile));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateInstanceProfile::default());
        plan.push_if(desired.declares("role"), ReconcileProfileRole::default());
        plan.push_if(
            desired.declares("tags"),
            ops::ReconcileTags::by_name(TagTarget::InstanceProfile),
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
        let name = name_from_arn(previous, kind::INSTANCE_PROFILE)?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(ReconcileProfileRole::default())
            .then(ops::ReconcileTags::by_name(TagTarget::InstanceProfile));

        execute_update(remote, seed(&name, previous), plan, desired, &changes, previous, |_| {
            let profile = remote.call("GetInstanceProfile", |b| b.get_instance_profile(&name))?;
            Ok(identity(&profile))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let name = name_from_arn(previous, kind::INSTANCE_PROFILE)?;
        let plan = Plan::new().then(RemoveRoles).then(DeleteInstanceProfile);
        execute(remote, seed(&name, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let name = name_from_arn(previous, kind::INSTANCE_PROFILE)?;
        let Some(profile) =
            remote.call_tolerant("GetInstanceProfile", |b| b.get_instance_profile(&name))?
        else {
            return Ok(ConfigNode::empty());
        };

        // Echo the configured reference when it names the bound role.
        let role = profile.roles.first().map(|bound| match desired.get("role") {
            Some(reference)
                if role_name(Some(reference)).ok().flatten().as_deref() == Some(bound.as_str()) =>
            {
                reference.clone()
            }
            _ => ConfigNode::str(bound),
        });
        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(&profile.name))
            .with("path", ConfigNode::str(&profile.path))
            .with_opt("role", role)
            .with("tags", ops::tags::to_node(&profile.tags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, mutations, trust_policy};
    use declarative::CancelToken;
    use iamkit::{Backend, MemoryBackend, NewRole};
    use pretty_assertions::assert_eq;

    fn profile(role: &str) -> ConfigNode {
        ConfigNode::empty()
            .with("name", ConfigNode::str("web"))
            .with("role", ConfigNode::str(role))
    }

    fn setup() -> (MemoryBackend, Computed) {
        let backend = backend();
        for name in ["web-a", "web-b"] {
            backend
                .create_role(&NewRole {
                    name: name.into(),
                    assume_role_policy_document: trust_policy("ec2.amazonaws.com")
                        .as_str()
                        .unwrap()
                        .to_string(),
                    ..NewRole::default()
                })
                .unwrap();
        }
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = profile("web-a");
        let computed = InstanceProfileLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        backend.clear_calls();
        (backend, computed)
    }

    #[test]
    fn test_create_binds_role() {
        let (backend, computed) = setup();
        assert_eq!(
            computed["arn"],
            ConfigNode::str("arn:aws:iam::123456789012:instance-profile/web")
        );
        assert_eq!(backend.get_instance_profile("web").unwrap().roles, vec!["web-a"]);
    }

    #[test]
    fn test_role_swap_removes_before_adding() {
        let (backend, computed) = setup();
        let desired = profile("arn:aws:iam::123456789012:role/web-b");
        let remote = Remote::new(&backend, CancelToken::new());
        InstanceProfileLifecycle
            .update(&remote, &desired, &changes(&profile("web-a"), &desired), &computed)
            .unwrap();

        assert_eq!(
            mutations(&backend),
            vec!["RemoveRoleFromInstanceProfile", "AddRoleToInstanceProfile"]
        );
        assert_eq!(backend.get_instance_profile("web").unwrap().roles, vec!["web-b"]);
    }

    #[test]
    fn test_same_role_by_arn_is_no_change() {
        let (backend, computed) = setup();
        let desired = profile("arn:aws:iam::123456789012:role/web-a");
        let remote = Remote::new(&backend, CancelToken::new());
        let updated = InstanceProfileLifecycle
            .update(&remote, &desired, &changes(&profile("web-a"), &desired), &computed)
            .unwrap();
        assert_eq!(updated, computed);
        assert!(mutations(&backend).is_empty());
    }

    #[test]
    fn test_destroy_unbinds_role_first() {
        let (backend, computed) = setup();
        let remote = Remote::new(&backend, CancelToken::new());
        InstanceProfileLifecycle
            .destroy(&remote, &profile("web-a"), &computed)
            .unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "GetInstanceProfile",
                "RemoveRoleFromInstanceProfile",
                "DeleteInstanceProfile",
            ]
        );
        assert!(backend.delete_role("web-a").is_ok());
    }

    #[test]
    fn test_role_removed_outside_is_bound_again() {
        let (backend, computed) = setup();
        backend.remove_role_from_instance_profile("web", "web-a").unwrap();

        let remote = Remote::new(&backend, CancelToken::new());
        let desired = profile("arn:aws:iam::123456789012:role/web-a");
        let observed = InstanceProfileLifecycle
            .external_state(&remote, &desired, &computed)
            .unwrap();
        let drifted = crate::resource::drift(&InstanceProfileLifecycle, &desired, &observed);
        assert_eq!(drifted.paths(), vec!["role"]);
        backend.clear_calls();

        InstanceProfileLifecycle
            .update(&remote, &desired, &drifted, &computed)
            .unwrap();
        assert_eq!(mutations(&backend), vec!["AddRoleToInstanceProfile"]);
        assert_eq!(backend.get_instance_profile("web").unwrap().roles, vec!["web-a"]);
    }

    #[test]
    fn test_role_reference_form_is_echoed() {
        let (backend, computed) = setup();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = profile("arn:aws:iam::123456789012:role/web-a");
        let observed = InstanceProfileLifecycle
            .external_state(&remote, &desired, &computed)
            .unwrap();
        assert!(crate::resource::drift(&InstanceProfileLifecycle, &desired, &observed).is_empty());
    }
}
