//! iam_policy controller
//!
//! Managed policies are addressed by ARN. A document change never edits a
//! version in place: a new default version is created, and when the account
//! already holds the maximum number of versions the oldest non-default one
//! is deleted first.

use super::{
    Computed, Lifecycle, adopt, arn_in_account, collect, execute, execute_create, execute_update,
    previous_str, rebase, seed,
};
use crate::ops::{self, changed, prepared};
use crate::remote::Remote;
use anyhow::{Context, Result};
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext, canonical_eq, canonical_json};
use iamkit::{NewPolicy, TagTarget};

const COMPUTED: &[&str] = &["arn", "policy_id", "default_version_id"];

/// Versions a managed policy may hold at once
const MAX_VERSIONS: usize = 5;

#[derive(Debug, Default)]
pub struct PolicyLifecycle;

fn record(shared: &mut SharedContext, policy: &iamkit::ManagedPolicy) {
    shared.insert_str("arn", &policy.arn);
    shared.insert_str("policy_id", &policy.policy_id);
    shared.insert_str("default_version_id", &policy.default_version_id);
}

fn identity(policy: &iamkit::ManagedPolicy) -> Computed {
    let mut shared = SharedContext::new();
    record(&mut shared, policy);
    collect(&shared, COMPUTED)
}

fn document(desired: &ConfigNode) -> Result<String> {
    let document = desired
        .get("document")
        .ok_or_else(|| declarative::Error::MissingField("document".to_string()))?;
    Ok(canonical_json(document))
}

#[derive(Debug, Default)]
struct CreatePolicy {
    request: Option<NewPolicy>,
}

impl<'r> Operation<Remote<'r>> for CreatePolicy {
    fn name(&self) -> &'static str {
        "create_policy"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewPolicy {
            name: desired.required_str("name")?.to_string(),
            path: desired.optional_str("path")?.map(str::to_string),
            document: document(desired)?,
            description: desired.optional_str("description")?.map(str::to_string),
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_policy")?;
        let policy = remote.call("CreatePolicy", |b| b.create_policy(&request))?;
        shared.upstream_id = Some(policy.arn.clone());
        record(shared, &policy);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PublishVersion {
    document: Option<String>,
}

impl<'r> Operation<Remote<'r>> for PublishVersion {
    fn name(&self) -> &'static str {
        "create_policy_version"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, _)) = changed(changes, desired, "document") else {
            return Ok(false);
        };
        let wanted = document(desired)?;
        if previous.is_some_and(|p| canonical_eq(p, &ConfigNode::str(&wanted))) {
            log::debug!("document only reformatted");
            return Ok(false);
        }
        self.document = Some(wanted);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let document = prepared(&mut self.document, "create_policy_version")?;
        let arn = shared.require_str("arn")?.to_string();

        let versions = remote.call("ListPolicyVersions", |b| b.list_policy_versions(&arn))?;
        if versions.len() >= MAX_VERSIONS {
            let oldest = versions
                .iter()
                .filter(|v| !v.is_default)
                .min_by_key(|v| v.ordinal())
                .with_context(|| format!("{arn} has no non-default version to delete"))?;
            log::info!("deleting {} of {arn} to stay within {MAX_VERSIONS} versions", oldest.version_id);
            remote.call("DeletePolicyVersion", |b| {
                b.delete_policy_version(&arn, &oldest.version_id)
            })?;
        }

        let version = remote.call("CreatePolicyVersion", |b| {
            b.create_policy_version(&arn, &document, true)
        })?;
        shared.insert_str("default_version_id", version.version_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DeletePolicy;

impl<'r> Operation<Remote<'r>> for DeletePolicy {
    fn name(&self) -> &'static str {
        "delete_policy"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let arn = shared.require_str("arn")?;
        remote.call("DeletePolicy", |b| b.delete_policy(arn))
    }
}

impl Lifecycle for PolicyLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_policy"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name", "path", "description"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let arn = arn_in_account(
                remote,
                iamkit::arn::kind::POLICY,
                desired.optional_str("path")?.unwrap_or("/"),
                desired.required_str("name")?,
            )?;
            if let Some(policy) = remote.call_tolerant("GetPolicy", |b| b.get_policy(&arn))? {
                return adopt(self, remote, desired, identity(&policy));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreatePolicy::default());
        plan.push_if(desired.declares("tags"), ops::ReconcileTags::by_arn(TagTarget::Policy));
        execute_create(remote, plan, desired, changes, COMPUTED)
    }

    fn update(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        changes: &ChangeSet,
        previous: &Computed,
    ) -> Result<Computed> {
        let arn = previous_str(previous, "arn")?;
        iamkit::arn::extract_name(arn, iamkit::arn::kind::POLICY)?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(PublishVersion::default())
            .then(ops::ReconcileTags::by_arn(TagTarget::Policy));

        execute_update(remote, seed(arn, previous), plan, desired, &changes, previous, |_| {
            let policy = remote.call("GetPolicy", |b| b.get_policy(arn))?;
            Ok(identity(&policy))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let arn = previous_str(previous, "arn")?;
        let plan = Plan::new()
            .then(ops::DeleteNonDefaultVersions)
            .then(DeletePolicy);
        execute(remote, seed(arn, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        _desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let arn = previous_str(previous, "arn")?;
        let Some(policy) = remote.call_tolerant("GetPolicy", |b| b.get_policy(arn))? else {
            return Ok(ConfigNode::empty());
        };
        let version = remote.call("GetPolicyVersion", |b| {
            b.get_policy_version(arn, &policy.default_version_id)
        })?;
        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(&policy.name))
            .with("path", ConfigNode::str(&policy.path))
            .with_opt("description", policy.description.as_deref().map(ConfigNode::str))
            .with("document", ConfigNode::str(version.document))
            .with("tags", ops::tags::to_node(&policy.tags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, doc, mutations, str_field};
    use declarative::CancelToken;
    use iamkit::{Backend, MemoryBackend, Principal, Tag};
    use pretty_assertions::assert_eq;

    const ARN: &str = "arn:aws:iam::123456789012:policy/readers";

    fn readers(action: &str) -> ConfigNode {
        ConfigNode::empty()
            .with("name", ConfigNode::str("readers"))
            .with("document", doc(action))
            .with("tags", ops::tags::to_node(&[Tag::new("owner", "platform")]))
    }

    fn setup() -> (MemoryBackend, Computed) {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = readers("s3:GetObject");
        let computed = PolicyLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        backend.clear_calls();
        (backend, computed)
    }

    fn publish(backend: &MemoryBackend, computed: &Computed, from: &str, to: &str) -> Computed {
        let remote = Remote::new(backend, CancelToken::new());
        PolicyLifecycle
            .update(&remote, &readers(to), &changes(&readers(from), &readers(to)), computed)
            .unwrap()
    }

    #[test]
    fn test_create_then_tag_by_arn() {
        let (backend, computed) = setup();
        assert_eq!(str_field(&computed, "arn"), ARN);
        assert_eq!(str_field(&computed, "default_version_id"), "v1");
        let tags = backend.list_tags(&TagTarget::Policy(ARN.into())).unwrap();
        assert_eq!(tags, vec![Tag::new("owner", "platform")]);
    }

    #[test]
    fn test_document_change_publishes_default_version() {
        let (backend, computed) = setup();
        let updated = publish(&backend, &computed, "s3:GetObject", "s3:ListBucket");

        assert_eq!(str_field(&updated, "default_version_id"), "v2");
        assert_eq!(mutations(&backend), vec!["CreatePolicyVersion"]);
    }

    #[test]
    fn test_version_limit_deletes_oldest_non_default() {
        let (backend, mut computed) = setup();
        let actions = ["a:1", "a:2", "a:3", "a:4", "a:5"];
        let mut from = "s3:GetObject";
        for action in actions {
            computed = publish(&backend, &computed, from, action);
            from = action;
        }

        assert_eq!(str_field(&computed, "default_version_id"), "v6");
        let ids: Vec<String> = backend
            .list_policy_versions(ARN)
            .unwrap()
            .into_iter()
            .map(|v| v.version_id)
            .collect();
        assert_eq!(ids, vec!["v2", "v3", "v4", "v5", "v6"]);
    }

    #[test]
    fn test_destroy_removes_versions_first() {
        let (backend, computed) = setup();
        let computed = publish(&backend, &computed, "s3:GetObject", "s3:ListBucket");
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        PolicyLifecycle
            .destroy(&remote, &readers("s3:ListBucket"), &computed)
            .unwrap();
        assert_eq!(
            backend.calls(),
            vec!["ListPolicyVersions", "DeletePolicyVersion", "DeletePolicy"]
        );
    }

    #[test]
    fn test_attached_policy_cannot_be_destroyed() {
        let (backend, computed) = setup();
        backend.create_group("devs", None).unwrap();
        backend.attach_policy(Principal::Group, "devs", ARN).unwrap();

        let remote = Remote::new(&backend, CancelToken::new());
        let err = PolicyLifecycle
            .destroy(&remote, &readers("s3:GetObject"), &computed)
            .unwrap_err();
        assert!(err.to_string().contains("delete_policy failed"));
        assert!(backend.get_policy(ARN).is_ok());
    }

    #[test]
    fn test_observed_document_is_canonical() {
        let (backend, computed) = setup();
        let remote = Remote::new(&backend, CancelToken::new());
        let observed = PolicyLifecycle
            .external_state(&remote, &readers("s3:GetObject"), &computed)
            .unwrap();
        assert!(canonical_eq(
            observed.get("document").unwrap(),
            &doc("s3:GetObject")
        ));
    }

    #[test]
    fn test_create_retry_adopts_untagged_policy() {
        let backend = backend();
        backend.fail_on("TagPolicy", "ServiceFailure", "boom");
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = readers("s3:GetObject");
        assert!(
            PolicyLifecycle
                .create(&remote, &desired, &ChangeSet::all(&desired))
                .is_err()
        );

        backend.clear_failures();
        backend.clear_calls();
        let computed = PolicyLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(str_field(&computed, "arn"), ARN);
        assert_eq!(str_field(&computed, "default_version_id"), "v1");
        assert_eq!(mutations(&backend), vec!["TagPolicy"]);
    }
}
