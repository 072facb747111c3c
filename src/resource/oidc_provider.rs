//! iam_oidc_provider controller
//!
//! Client IDs are added and removed one by one; the thumbprint list can only
//! be replaced as a whole.

use super::{
    Computed, Lifecycle, adopt, arn_in_account, execute, execute_create, execute_update,
    previous_str, rebase, seed,
};
use crate::ops::{self, changed, prepared, str_list};
use crate::remote::Remote;
use anyhow::Result;
use declarative::normalize::sort_dedup;
use declarative::{
    ChangeSet, ConfigNode, DiffResult, KeyedItem, Operation, Plan, SharedContext, diff_keys,
};
use iamkit::{NewOidcProvider, TagTarget};

const COMPUTED: &[&str] = &["arn"];

#[derive(Debug, Default)]
pub struct OidcProviderLifecycle;

/// Host part of an `https://` provider URL
fn host(url: &str) -> Option<&str> {
    url.strip_prefix("https://")
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|host| !host.is_empty())
}

fn sorted(node: Option<&ConfigNode>, path: &str) -> Result<Vec<String>> {
    let mut items: Vec<KeyedItem> = str_list(node, path)?
        .into_iter()
        .map(KeyedItem::key_only)
        .collect();
    sort_dedup(&mut items);
    Ok(items.into_iter().map(|item| item.key).collect())
}

#[derive(Debug, Default)]
struct CreateOidcProvider {
    request: Option<NewOidcProvider>,
}

impl<'r> Operation<Remote<'r>> for CreateOidcProvider {
    fn name(&self) -> &'static str {
        "create_oidc_provider"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewOidcProvider {
            url: desired.required_str("url")?.to_string(),
            client_ids: sorted(desired.get("client_ids"), "client_ids")?,
            thumbprints: sorted(desired.get("thumbprints"), "thumbprints")?,
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_oidc_provider")?;
        let provider = remote.call("CreateOpenIDConnectProvider", |b| {
            b.create_oidc_provider(&request)
        })?;
        shared.upstream_id = Some(provider.arn.clone());
        shared.insert_str("arn", provider.arn);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReconcileClientIds {
    diff: Option<DiffResult>,
}

impl<'r> Operation<Remote<'r>> for ReconcileClientIds {
    fn name(&self) -> &'static str {
        "reconcile_client_ids"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, wanted)) = changed(changes, desired, "client_ids") else {
            return Ok(false);
        };
        let result = diff_keys(
            &sorted(previous, "client_ids")?,
            &sorted(wanted, "client_ids")?,
        );
        if !result.has_changes() {
            return Ok(false);
        }
        self.diff = Some(result);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let diff = prepared(&mut self.diff, "reconcile_client_ids")?;
        let arn = shared.require_upstream()?;
        for client_id in &diff.to_remove {
            remote.call("RemoveClientIDFromOpenIDConnectProvider", |b| {
                b.remove_client_id(arn, client_id)
            })?;
        }
        for item in &diff.to_add {
            remote.call("AddClientIDToOpenIDConnectProvider", |b| {
                b.add_client_id(arn, &item.key)
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReplaceThumbprints {
    thumbprints: Option<Vec<String>>,
}

impl<'r> Operation<Remote<'r>> for ReplaceThumbprints {
    fn name(&self) -> &'static str {
        "update_thumbprints"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, wanted)) = changed(changes, desired, "thumbprints") else {
            return Ok(false);
        };
        let wanted = sorted(wanted, "thumbprints")?;
        if sorted(previous, "thumbprints")? == wanted {
            return Ok(false);
        }
        self.thumbprints = Some(wanted);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let thumbprints = prepared(&mut self.thumbprints, "update_thumbprints")?;
        let arn = shared.require_upstream()?;
        remote.call("UpdateOpenIDConnectProviderThumbprint", |b| {
            b.update_thumbprints(arn, &thumbprints)
        })
    }
}

#[derive(Debug, Default)]
struct DeleteOidcProvider;

impl<'r> Operation<Remote<'r>> for DeleteOidcProvider {
    fn name(&self) -> &'static str {
        "delete_oidc_provider"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let arn = shared.require_upstream()?;
        remote.call("DeleteOpenIDConnectProvider", |b| b.delete_oidc_provider(arn))
    }
}

impl Lifecycle for OidcProviderLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_oidc_provider"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["url"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty()
            && let Some(host) = host(desired.required_str("url")?)
        {
            let arn = arn_in_account(remote, iamkit::arn::kind::OIDC_PROVIDER, "/", host)?;
            if let Some(provider) =
                remote.call_tolerant("GetOpenIDConnectProvider", |b| b.get_oidc_provider(&arn))?
            {
                let existing = Computed::from([("arn".to_string(), ConfigNode::str(provider.arn))]);
                return adopt(self, remote, desired, existing);
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateOidcProvider::default());
        plan.push_if(
            desired.declares("tags"),
            ops::ReconcileTags::by_arn(TagTarget::OidcProvider),
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
        let arn = previous_str(previous, "arn")?;
        let changes = rebase(changes, desired, || self.external_state(remote, desired, previous))?;
        let plan = Plan::new()
            .then(ReconcileClientIds::default())
            .then(ReplaceThumbprints::default())
            .then(ops::ReconcileTags::by_arn(TagTarget::OidcProvider));
        // The ARN is derived from the immutable URL; nothing to refresh.
        execute_update(remote, seed(arn, previous), plan, desired, &changes, previous, |_| {
            Ok(Computed::new())
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let arn = previous_str(previous, "arn")?;
        let plan = Plan::new().then(DeleteOidcProvider);
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
        let Some(provider) =
            remote.call_tolerant("GetOpenIDConnectProvider", |b| b.get_oidc_provider(arn))?
        else {
            return Ok(ConfigNode::empty());
        };
        Ok(ConfigNode::empty()
            .with("url", ConfigNode::str(format!("https://{}", provider.url)))
            .with("client_ids", ConfigNode::str_list(provider.client_ids))
            .with("thumbprints", ConfigNode::str_list(provider.thumbprints))
            .with("tags", ops::tags::to_node(&provider.tags)))
    }
}
