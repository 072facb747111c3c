//! iam_role controller

use super::{
    Computed, Lifecycle, adopt, collect, execute, execute_create, execute_update, name_from_arn,
    rebase, seed,
};
use crate::ops::{self, changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext, canonical_eq, canonical_json};
use iamkit::arn::kind;
use iamkit::{NewRole, Principal, TagTarget};

const COMPUTED: &[&str] = &["arn", "role_id"];
const TRUST_POLICY: &str = "assume_role_policy_document";
const DEFAULT_SESSION_DURATION: i64 = 3600;

#[derive(Debug, Default)]
pub struct RoleLifecycle;

fn record(shared: &mut SharedContext, role: &iamkit::Role) {
    shared.insert_str("arn", &role.arn);
    shared.insert_str("role_id", &role.role_id);
}

fn identity(role: &iamkit::Role) -> Computed {
    let mut shared = SharedContext::new();
    record(&mut shared, role);
    collect(&shared, COMPUTED)
}

fn trust_policy(desired: &ConfigNode) -> Result<String> {
    let document = desired
        .get(TRUST_POLICY)
        .ok_or_else(|| declarative::Error::MissingField(TRUST_POLICY.to_string()))?;
    Ok(canonical_json(document))
}

#[derive(Debug, Default)]
struct CreateRole {
    request: Option<NewRole>,
}

impl<'r> Operation<Remote<'r>> for CreateRole {
    fn name(&self) -> &'static str {
        "create_role"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewRole {
            name: desired.required_str("name")?.to_string(),
            path: desired.optional_str("path")?.map(str::to_string),
            assume_role_policy_document: trust_policy(desired)?,
            description: desired.optional_str("description")?.map(str::to_string),
            max_session_duration: desired.optional_i64("max_session_duration")?,
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_role")?;
        let role = remote.call("CreateRole", |b| b.create_role(&request))?;
        shared.upstream_id = Some(role.name.clone());
        record(shared, &role);
        Ok(())
    }
}

/// Description and session duration are updated together
#[derive(Debug, Default)]
struct UpdateRole {
    request: Option<(Option<String>, i64)>,
}

impl<'r> Operation<Remote<'r>> for UpdateRole {
    fn name(&self) -> &'static str {
        "update_role"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if !changes.touches_any(&["description", "max_session_duration"]) {
            return Ok(false);
        }
        let description = desired.optional_str("description")?.map(str::to_string);
        let duration = desired
            .optional_i64("max_session_duration")?
            .unwrap_or(DEFAULT_SESSION_DURATION);

        let current = |field: &str| changed(changes, desired, field).and_then(|(previous, _)| previous);
        let description_held = !changes.touches("description")
            || current("description").and_then(ConfigNode::as_str) == description.as_deref();
        let duration_held = !changes.touches("max_session_duration")
            || current("max_session_duration").and_then(ConfigNode::as_i64) == Some(duration);
        if description_held && duration_held {
            return Ok(false);
        }
        self.request = Some((description, duration));
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let (description, duration) = prepared(&mut self.request, "update_role")?;
        let name = shared.require_upstream()?;
        remote.call("UpdateRole", |b| {
            b.update_role(name, description.as_deref(), Some(duration))
        })
    }
}

#[derive(Debug, Default)]
struct UpdateTrustPolicy {
    document: Option<String>,
}

impl<'r> Operation<Remote<'r>> for UpdateTrustPolicy {
    fn name(&self) -> &'static str {
        "update_assume_role_policy"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, _)) = changed(changes, desired, TRUST_POLICY) else {
            return Ok(false);
        };
        let wanted = trust_policy(desired)?;
        if previous.is_some_and(|p| canonical_eq(p, &ConfigNode::str(&wanted))) {
            log::debug!("{TRUST_POLICY} only reformatted");
            return Ok(false);
        }
        self.document = Some(wanted);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let document = prepared(&mut self.document, "update_assume_role_policy")?;
        let name = shared.require_upstream()?;
        remote.call("UpdateAssumeRolePolicy", |b| {
            b.update_assume_role_policy(name, &document)
        })
    }
}

#[derive(Debug, Default)]
struct DeleteRole;

impl<'r> Operation<Remote<'r>> for DeleteRole {
    fn name(&self) -> &'static str {
        "delete_role"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let name = shared.require_upstream()?;
        remote.call("DeleteRole", |b| b.delete_role(name))
    }
}

impl Lifecycle for RoleLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_role"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name", "path"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let name = desired.required_str("name")?;
            if let Some(role) = remote.call_tolerant("GetRole", |b| b.get_role(name))? {
                return adopt(self, remote, desired, identity(&role));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateRole::default());
        plan.push_if(
            desired.declares("permissions_boundary"),
            ops::ReconcileBoundary::new(Principal::Role),
        );
        plan.push_if(desired.declares("tags"), ops::ReconcileTags::by_name(TagTarget::Role));
        plan.push_if(
            desired.declares("inline_policies"),
            ops::ReconcileInlinePolicies::new(Principal::Role),
        );
        plan.push_if(
            desired.declares("managed_policy_arns"),
            ops::ReconcileManagedPolicies::new(Principal::Role),
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
        let name = name_from_arn(previous, kind::ROLE)?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(UpdateRole::default())
            .then(UpdateTrustPolicy::default())
            .then(ops::ReconcileBoundary::new(Principal::Role))
            .then(ops::ReconcileTags::by_name(TagTarget::Role))
            .then(ops::ReconcileInlinePolicies::new(Principal::Role))
            .then(ops::ReconcileManagedPolicies::new(Principal::Role));

        execute_update(remote, seed(&name, previous), plan, desired, &changes, previous, |_| {
            let role = remote.call("GetRole", |b| b.get_role(&name))?;
            Ok(identity(&role))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let name = name_from_arn(previous, kind::ROLE)?;
        let plan = Plan::new()
            .then(ops::DeleteInlinePolicies::new(Principal::Role))
            .then(ops::DetachManagedPolicies::new(Principal::Role))
            .then(ops::RemoveBoundary::new(Principal::Role))
            .then(DeleteRole);
        execute(remote, seed(&name, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        _desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let name = name_from_arn(previous, kind::ROLE)?;
        let Some(role) = remote.call_tolerant("GetRole", |b| b.get_role(&name))? else {
            return Ok(ConfigNode::empty());
        };
        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(&role.name))
            .with("path", ConfigNode::str(&role.path))
            .with(
                TRUST_POLICY,
                ConfigNode::str(&role.assume_role_policy_document),
            )
            .with_opt("description", role.description.as_deref().map(ConfigNode::str))
            .with("max_session_duration", ConfigNode::int(role.max_session_duration))
            .with_opt(
                "permissions_boundary",
                role.permissions_boundary.as_deref().map(ConfigNode::str),
            )
            .with("tags", ops::tags::to_node(&role.tags))
            .with(
                "inline_policies",
                ops::inline::observe(remote, Principal::Role, &role.name)?,
            )
            .with(
                "managed_policy_arns",
                ops::managed::observe(remote, Principal::Role, &role.name)?,
            ))
    }
}
