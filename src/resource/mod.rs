//! Lifecycle controllers for IAM resource types
//!
//! Every resource type is driven through the same five entry points:
//! - Create: primary create plus sub-resource operations for declared kinds;
//!   an entity that already exists is adopted and converged instead
//! - Update: mutable primary attributes plus one reconcile operation per
//!   list-valued sub-resource, diffed against the observed remote state
//!   with identity taken from the recorded computed fields
//! - Destroy: dependency-ordered teardown ending with the primary delete
//! - External state: read-only observation in the desired shape
//! - Stabilised: readiness check (IAM is immediately consistent here)
//!
//! Controllers only plan operations; [`declarative::run`] executes them.

use crate::remote::Remote;
use anyhow::{Context, Result};
use declarative::{
    ChangeSet, ConfigNode, FieldChange, PipelineOutcome, Plan, SharedContext, normalize,
};
use std::collections::BTreeMap;
use std::fmt;

pub mod access_key;
pub mod group;
pub mod instance_profile;
pub mod oidc_provider;
pub mod policy;
pub mod role;
pub mod saml_provider;
pub mod server_certificate;
pub mod user;

/// Computed fields of a resource, keyed by field path (`arn`,
/// `login_profile.password`)
pub type Computed = BTreeMap<String, ConfigNode>;

/// Core trait for all IAM resource types
pub trait Lifecycle: Send + Sync + fmt::Debug {
    /// Resource type name (e.g., "iam_user")
    fn resource_type(&self) -> &'static str;

    /// Fields that cannot change in place; changing one means replacement
    fn create_only(&self) -> &'static [&'static str];

    /// Create the resource and its declared sub-resources
    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet)
    -> Result<Computed>;

    /// Converge an existing resource with `desired`
    ///
    /// Returns `previous` unchanged when nothing applied.
    fn update(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        changes: &ChangeSet,
        previous: &Computed,
    ) -> Result<Computed>;

    /// Tear the resource down
    fn destroy(&self, remote: &Remote<'_>, desired: &ConfigNode, previous: &Computed)
    -> Result<()>;

    /// Observe the resource; an empty map means it no longer exists
    fn external_state(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode>;

    /// Whether the resource is ready for dependents
    fn stabilised(&self, _remote: &Remote<'_>, _previous: &Computed) -> Result<bool> {
        Ok(true)
    }

    /// Whether `changes` can only be applied by destroy + create
    fn requires_replacement(&self, changes: &ChangeSet) -> bool {
        changes.touches_any(self.create_only())
    }
}

static USER: user::UserLifecycle = user::UserLifecycle;
static GROUP: group::GroupLifecycle = group::GroupLifecycle;
static ROLE: role::RoleLifecycle = role::RoleLifecycle;
static POLICY: policy::PolicyLifecycle = policy::PolicyLifecycle;
static ACCESS_KEY: access_key::AccessKeyLifecycle = access_key::AccessKeyLifecycle;
static INSTANCE_PROFILE: instance_profile::InstanceProfileLifecycle =
    instance_profile::InstanceProfileLifecycle;
static OIDC_PROVIDER: oidc_provider::OidcProviderLifecycle = oidc_provider::OidcProviderLifecycle;
static SAML_PROVIDER: saml_provider::SamlProviderLifecycle = saml_provider::SamlProviderLifecycle;
static SERVER_CERTIFICATE: server_certificate::ServerCertificateLifecycle =
    server_certificate::ServerCertificateLifecycle;

/// Every supported resource type name
pub const RESOURCE_TYPES: &[&str] = &[
    "iam_user",
    "iam_group",
    "iam_role",
    "iam_policy",
    "iam_access_key",
    "iam_instance_profile",
    "iam_oidc_provider",
    "iam_saml_provider",
    "iam_server_certificate",
];

/// Look up the controller for a resource type name
pub fn lifecycle_for(type_name: &str) -> Option<&'static dyn Lifecycle> {
    let lifecycle: &'static dyn Lifecycle = match type_name {
        "iam_user" => &USER,
        "iam_group" => &GROUP,
        "iam_role" => &ROLE,
        "iam_policy" => &POLICY,
        "iam_access_key" => &ACCESS_KEY,
        "iam_instance_profile" => &INSTANCE_PROFILE,
        "iam_oidc_provider" => &OIDC_PROVIDER,
        "iam_saml_provider" => &SAML_PROVIDER,
        "iam_server_certificate" => &SERVER_CERTIFICATE,
        _ => return None,
    };
    Some(lifecycle)
}

// ============================================================================
// Shared controller plumbing
// ============================================================================

/// Run a plan with the remote's cancellation token
pub(crate) fn execute<'a>(
    remote: &Remote<'a>,
    seed: SharedContext,
    plan: Plan<'_, Remote<'a>>,
    desired: &ConfigNode,
    changes: &ChangeSet,
) -> Result<PipelineOutcome> {
    log::debug!("plan: {}", plan.names().join(" -> "));
    declarative::run(remote.cancel_token(), seed, plan, desired, changes, remote)
}

/// Run a create plan; a run where nothing applied is an error
pub(crate) fn execute_create<'a>(
    remote: &Remote<'a>,
    plan: Plan<'_, Remote<'a>>,
    desired: &ConfigNode,
    changes: &ChangeSet,
    computed_keys: &[&str],
) -> Result<Computed> {
    let outcome = execute(remote, SharedContext::new(), plan, desired, changes)?
        .require_changes()
        .context("nothing to create")?;
    Ok(collect(&outcome.context, computed_keys))
}

/// Run an update plan and refresh computed fields if anything applied
pub(crate) fn execute_update<'a>(
    remote: &Remote<'a>,
    seed: SharedContext,
    plan: Plan<'_, Remote<'a>>,
    desired: &ConfigNode,
    changes: &ChangeSet,
    previous: &Computed,
    refresh: impl FnOnce(&SharedContext) -> Result<Computed>,
) -> Result<Computed> {
    let outcome = execute(remote, seed, plan, desired, changes)?;
    if !outcome.has_changes {
        log::info!("no changes to apply");
        return Ok(previous.clone());
    }
    let mut computed = previous.clone();
    computed.extend(refresh(&outcome.context)?);
    Ok(computed)
}

/// Rebase `changes` on the observed remote state
///
/// Every touched top-level field takes its previous value from what
/// `observe` returns, so reconcile operations diff the remote against
/// `desired` rather than against the last recorded configuration. Nothing
/// is observed for an empty ChangeSet.
pub(crate) fn rebase(
    changes: &ChangeSet,
    desired: &ConfigNode,
    observe: impl FnOnce() -> Result<ConfigNode>,
) -> Result<ChangeSet> {
    if changes.is_empty() {
        return Ok(ChangeSet::new());
    }
    let observed = observe()?;

    let mut fields: Vec<&str> = changes
        .iter()
        .map(|c| c.path.split('.').next().unwrap_or(&c.path))
        .collect();
    fields.sort_unstable();
    fields.dedup();

    Ok(fields
        .into_iter()
        .map(|field| FieldChange::new(field, present(&observed, field), present(desired, field)))
        .collect())
}

fn present(node: &ConfigNode, field: &str) -> Option<ConfigNode> {
    node.get(field).filter(|value| !value.is_null()).cloned()
}

/// Converge an entity left behind by an earlier create that failed partway
///
/// Every declared field is diffed against the remote through `update`, so
/// sub-resources the first attempt already applied are not applied twice.
pub(crate) fn adopt(
    lifecycle: &dyn Lifecycle,
    remote: &Remote<'_>,
    desired: &ConfigNode,
    existing: Computed,
) -> Result<Computed> {
    log::info!(
        "{} already exists remotely, converging it",
        lifecycle.resource_type()
    );
    lifecycle.update(remote, desired, &ChangeSet::all(desired), &existing)
}

/// ARN an entity of `kind` would have in the remote's account
pub(crate) fn arn_in_account(
    remote: &Remote<'_>,
    kind: &str,
    path: &str,
    name: &str,
) -> Result<String> {
    let identity = remote.call("GetCallerIdentity", |b| b.get_caller_identity())?;
    Ok(iamkit::Arn::build(
        &identity.partition,
        &identity.account_id,
        kind,
        path,
        name,
    ))
}

/// Declared fields whose observed value no longer satisfies `desired`
///
/// Create-only fields are skipped since they never change in place.
pub fn drift(lifecycle: &dyn Lifecycle, desired: &ConfigNode, observed: &ConfigNode) -> ChangeSet {
    let Some(fields) = desired.as_map() else {
        return ChangeSet::new();
    };
    fields
        .iter()
        .filter(|(field, wanted)| {
            !wanted.is_null() && !lifecycle.create_only().contains(&field.as_str())
        })
        .filter(|(field, wanted)| !in_sync(field, wanted, observed.get(field)))
        .map(|(field, wanted)| {
            FieldChange::new(field.clone(), present(observed, field), Some(wanted.clone()))
        })
        .collect()
}

fn in_sync(field: &str, wanted: &ConfigNode, observed: Option<&ConfigNode>) -> bool {
    if field == "tags" {
        return match (normalize::tags(Some(wanted), field), normalize::tags(observed, field)) {
            (Ok(wanted), Ok(observed)) => wanted == observed,
            _ => false,
        };
    }
    observed.is_some_and(|observed| normalize::converged(wanted, observed))
}

/// Seed a context from previous computed fields
pub(crate) fn seed(upstream: impl Into<String>, previous: &Computed) -> SharedContext {
    let mut shared = SharedContext::for_upstream(upstream);
    for (key, value) in previous {
        shared.insert(key.clone(), value.clone());
    }
    shared
}

/// Pick the computed fields out of a final context
pub(crate) fn collect(shared: &SharedContext, keys: &[&str]) -> Computed {
    shared
        .iter()
        .filter(|(key, _)| keys.contains(key))
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// A string computed field that must have been recorded earlier
pub(crate) fn previous_str<'a>(previous: &'a Computed, key: &str) -> Result<&'a str> {
    previous
        .get(key)
        .and_then(ConfigNode::as_str)
        .with_context(|| format!("previous state has no '{key}'"))
}

/// Entity name extracted from the previously recorded ARN
pub(crate) fn name_from_arn(previous: &Computed, kind: &str) -> Result<String> {
    let arn = previous_str(previous, "arn")?;
    Ok(iamkit::arn::extract_name(arn, kind)?)
}

/// Render computed fields as a node
pub fn computed_node(computed: &Computed) -> ConfigNode {
    ConfigNode::map(computed.clone())
}
