//! iam_access_key controller
//!
//! The secret is returned once, at creation. The key's user is recorded as
//! a computed field so later calls never depend on the desired configuration.
//! Key ids are generated by the remote, so a create that failed partway
//! cannot be adopted on retry; a retry issues a fresh key.

use super::{
    Computed, Lifecycle, collect, execute, execute_create, execute_update, previous_str, rebase,
    seed,
};
use crate::ops::{changed, prepared};
use crate::remote::Remote;
use anyhow::{Result, bail};
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext};
use iamkit::AccessKeyStatus;
use iamkit::arn::{kind, resolve_name};

const COMPUTED: &[&str] = &["access_key_id", "secret_access_key", "user_name"];

#[derive(Debug, Default)]
pub struct AccessKeyLifecycle;

fn status(node: Option<&ConfigNode>) -> Result<AccessKeyStatus> {
    let Some(text) = node.and_then(ConfigNode::as_str) else {
        return Ok(AccessKeyStatus::Active);
    };
    match AccessKeyStatus::parse(text) {
        Some(status) => Ok(status),
        None => bail!("status must be Active or Inactive, got '{text}'"),
    }
}

#[derive(Debug, Default)]
struct CreateAccessKey {
    user: Option<String>,
}

impl<'r> Operation<Remote<'r>> for CreateAccessKey {
    fn name(&self) -> &'static str {
        "create_access_key"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        status(desired.get("status"))?;
        self.user = Some(resolve_name(desired.required_str("user")?, kind::USER)?);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let user = prepared(&mut self.user, "create_access_key")?;
        let key = remote.call("CreateAccessKey", |b| b.create_access_key(&user))?;
        shared.upstream_id = Some(key.access_key_id.clone());
        shared.insert_str("access_key_id", key.access_key_id);
        shared.insert_str("user_name", key.user_name);
        if let Some(secret) = key.secret_access_key {
            shared.insert_str("secret_access_key", secret);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SetKeyStatus {
    status: Option<AccessKeyStatus>,
}

impl<'r> Operation<Remote<'r>> for SetKeyStatus {
    fn name(&self) -> &'static str {
        "update_access_key"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, wanted)) = changed(changes, desired, "status") else {
            return Ok(false);
        };
        let wanted = status(wanted)?;
        if wanted == status(previous)? {
            return Ok(false);
        }
        self.status = Some(wanted);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let status = prepared(&mut self.status, "update_access_key")?;
        let id = shared.require_upstream()?;
        let user = shared.require_str("user_name")?;
        remote.call("UpdateAccessKey", |b| b.update_access_key(user, id, status))
    }
}

#[derive(Debug, Default)]
struct DeleteAccessKey;

impl<'r> Operation<Remote<'r>> for DeleteAccessKey {
    fn name(&self) -> &'static str {
        "delete_access_key"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let id = shared.require_upstream()?;
        let user = shared.require_str("user_name")?;
        remote.call("DeleteAccessKey", |b| b.delete_access_key(user, id))
    }
}

impl Lifecycle for AccessKeyLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_access_key"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["user"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        let plan = Plan::new()
            .then(CreateAccessKey::default())
            .then(SetKeyStatus::default());
        execute_create(remote, plan, desired, changes, COMPUTED)
    }

    fn update(
        &self,
        remote: &Remote<'_>,
        desired: &ConfigNode,
        changes: &ChangeSet,
        previous: &Computed,
    ) -> Result<Computed> {
        let id = previous_str(previous, "access_key_id")?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new().then(SetKeyStatus::default());
        execute_update(remote, seed(id, previous), plan, desired, &changes, previous, |shared| {
            Ok(collect(shared, COMPUTED))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let id = previous_str(previous, "access_key_id")?;
        let plan = Plan::new().then(DeleteAccessKey);
        execute(remote, seed(id, previous), plan, &ConfigNode::empty(), &ChangeSet::new())?;
        Ok(())
    }

    fn external_state(
        &self,
        remote: &Remote<'_>,
        _desired: &ConfigNode,
        previous: &Computed,
    ) -> Result<ConfigNode> {
        let id = previous_str(previous, "access_key_id")?;
        let user = previous_str(previous, "user_name")?;
        let keys = remote
            .call_tolerant("ListAccessKeys", |b| b.list_access_keys(user))?
            .unwrap_or_default();
        let Some(key) = keys.into_iter().find(|k| k.access_key_id == id) else {
            return Ok(ConfigNode::empty());
        };
        Ok(ConfigNode::empty()
            .with("user", ConfigNode::str(key.user_name))
            .with("status", ConfigNode::str(key.status.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, mutations, str_field};
    use declarative::CancelToken;
    use iamkit::{Backend, MemoryBackend, NewUser};
    use pretty_assertions::assert_eq;

    fn key(status: &str) -> ConfigNode {
        ConfigNode::empty()
            .with("user", ConfigNode::str("arn:aws:iam::123456789012:user/ci"))
            .with("status", ConfigNode::str(status))
    }

    fn setup(status: &str) -> (MemoryBackend, Computed) {
        let backend = backend();
        backend
            .create_user(&NewUser {
                name: "ci".into(),
                ..NewUser::default()
            })
            .unwrap();
        backend.clear_calls();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = key(status);
        let computed = AccessKeyLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        (backend, computed)
    }

    #[test]
    fn test_create_returns_secret_once() {
        let (backend, computed) = setup("Active");
        assert!(str_field(&computed, "access_key_id").starts_with("AKIA"));
        assert_eq!(str_field(&computed, "secret_access_key").len(), 40);
        assert_eq!(str_field(&computed, "user_name"), "ci");
        assert_eq!(backend.calls(), vec!["CreateAccessKey"]);

        let listed = backend.list_access_keys("ci").unwrap();
        assert!(listed[0].secret_access_key.is_none());
    }

    #[test]
    fn test_inactive_key_is_disabled_after_create() {
        let (backend, _) = setup("Inactive");
        assert_eq!(backend.calls(), vec!["CreateAccessKey", "UpdateAccessKey"]);
        assert_eq!(
            backend.list_access_keys("ci").unwrap()[0].status,
            AccessKeyStatus::Inactive
        );
    }

    #[test]
    fn test_status_flip_keeps_secret() {
        let (backend, computed) = setup("Active");
        let remote = Remote::new(&backend, CancelToken::new());
        let updated = AccessKeyLifecycle
            .update(
                &remote,
                &key("Inactive"),
                &changes(&key("Active"), &key("Inactive")),
                &computed,
            )
            .unwrap();
        assert_eq!(updated, computed);

        let observed = AccessKeyLifecycle
            .external_state(&remote, &key("Inactive"), &computed)
            .unwrap();
        assert_eq!(observed.get("status"), Some(&ConfigNode::str("Inactive")));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = key("Disabled");
        let err = AccessKeyLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Active or Inactive"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_destroyed_key_is_not_observed() {
        let (backend, computed) = setup("Active");
        let remote = Remote::new(&backend, CancelToken::new());
        AccessKeyLifecycle.destroy(&remote, &key("Active"), &computed).unwrap();
        let observed = AccessKeyLifecycle
            .external_state(&remote, &key("Active"), &computed)
            .unwrap();
        assert!(observed.is_empty());
    }

    #[test]
    fn test_status_follows_remote_not_record() {
        let (backend, computed) = setup("Active");
        let id = str_field(&computed, "access_key_id");
        backend
            .update_access_key("ci", id, AccessKeyStatus::Inactive)
            .unwrap();
        backend.clear_calls();

        // Recorded Active -> Inactive, but the key is already Inactive.
        let remote = Remote::new(&backend, CancelToken::new());
        AccessKeyLifecycle
            .update(
                &remote,
                &key("Inactive"),
                &changes(&key("Active"), &key("Inactive")),
                &computed,
            )
            .unwrap();
        assert!(mutations(&backend).is_empty());
    }
}
