//! iam_saml_provider controller

use super::{
    Computed, Lifecycle, adopt, arn_in_account, collect, execute, execute_create, execute_update,
    previous_str, rebase, seed,
};
use crate::ops::{self, changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::{ChangeSet, ConfigNode, Operation, Plan, SharedContext};
use iamkit::arn::kind;
use iamkit::{NewSamlProvider, SamlProvider, TagTarget};

const COMPUTED: &[&str] = &["arn", "valid_until"];
const METADATA: &str = "metadata_document";

#[derive(Debug, Default)]
pub struct SamlProviderLifecycle;

fn identity(provider: SamlProvider) -> Computed {
    Computed::from([
        ("arn".to_string(), ConfigNode::str(provider.arn)),
        ("valid_until".to_string(), ConfigNode::str(provider.valid_until)),
    ])
}

#[derive(Debug, Default)]
struct CreateSamlProvider {
    request: Option<NewSamlProvider>,
}

impl<'r> Operation<Remote<'r>> for CreateSamlProvider {
    fn name(&self) -> &'static str {
        "create_saml_provider"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }
        self.request = Some(NewSamlProvider {
            name: desired.required_str("name")?.to_string(),
            metadata_document: desired.required_str(METADATA)?.to_string(),
            tags: Vec::new(),
        });
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let request = prepared(&mut self.request, "create_saml_provider")?;
        let provider = remote.call("CreateSAMLProvider", |b| b.create_saml_provider(&request))?;
        shared.upstream_id = Some(provider.arn.clone());
        shared.insert_str("arn", provider.arn);
        shared.insert_str("valid_until", provider.valid_until);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UpdateMetadata {
    metadata: Option<String>,
}

impl<'r> Operation<Remote<'r>> for UpdateMetadata {
    fn name(&self) -> &'static str {
        "update_saml_provider"
    }

    fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, changes: &ChangeSet) -> Result<bool> {
        let Some((previous, _)) = changed(changes, desired, METADATA) else {
            return Ok(false);
        };
        let wanted = desired.required_str(METADATA)?;
        if previous.and_then(ConfigNode::as_str) == Some(wanted) {
            return Ok(false);
        }
        self.metadata = Some(wanted.to_string());
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let metadata = prepared(&mut self.metadata, "update_saml_provider")?;
        let arn = shared.require_upstream()?;
        let provider = remote.call("UpdateSAMLProvider", |b| {
            b.update_saml_provider(arn, &metadata)
        })?;
        shared.insert_str("valid_until", provider.valid_until);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DeleteSamlProvider;

impl<'r> Operation<Remote<'r>> for DeleteSamlProvider {
    fn name(&self) -> &'static str {
        "delete_saml_provider"
    }

    fn prepare(&mut self, _: &mut SharedContext, _: &ConfigNode, _: &ChangeSet) -> Result<bool> {
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let arn = shared.require_upstream()?;
        remote.call("DeleteSAMLProvider", |b| b.delete_saml_provider(arn))
    }
}

impl Lifecycle for SamlProviderLifecycle {
    fn resource_type(&self) -> &'static str {
        "iam_saml_provider"
    }

    fn create_only(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn create(&self, remote: &Remote<'_>, desired: &ConfigNode, changes: &ChangeSet) -> Result<Computed> {
        if !changes.is_empty() {
            let name = desired.required_str("name")?;
            let arn = arn_in_account(remote, kind::SAML_PROVIDER, "/", name)?;
            if let Some(provider) =
                remote.call_tolerant("GetSAMLProvider", |b| b.get_saml_provider(&arn))?
            {
                return adopt(self, remote, desired, identity(provider));
            }
        }

        let mut plan = Plan::new();
        plan.push(CreateSamlProvider::default());
        plan.push_if(
            desired.declares("tags"),
            ops::ReconcileTags::by_arn(TagTarget::SamlProvider),
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
            .then(UpdateMetadata::default())
            .then(ops::ReconcileTags::by_arn(TagTarget::SamlProvider));
        execute_update(remote, seed(arn, previous), plan, desired, &changes, previous, |shared| {
            Ok(collect(shared, COMPUTED))
        })
    }

    fn destroy(&self, remote: &Remote<'_>, _desired: &ConfigNode, previous: &Computed) -> Result<()> {
        let arn = previous_str(previous, "arn")?;
        let plan = Plan::new().then(DeleteSamlProvider);
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
        let Some(provider) = remote.call_tolerant("GetSAMLProvider", |b| b.get_saml_provider(arn))?
        else {
            return Ok(ConfigNode::empty());
        };
        Ok(ConfigNode::empty()
            .with("name", ConfigNode::str(provider.name))
            .with(METADATA, ConfigNode::str(provider.metadata_document))
            .with("tags", ops::tags::to_node(&provider.tags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{backend, changes, mutations, str_field};
    use declarative::CancelToken;
    use iamkit::Tag;
    use pretty_assertions::assert_eq;

    fn idp(metadata: &str) -> ConfigNode {
        ConfigNode::empty()
            .with("name", ConfigNode::str("okta"))
            .with(METADATA, ConfigNode::str(metadata))
            .with("tags", ops::tags::to_node(&[Tag::new("vendor", "okta")]))
    }

    #[test]
    fn test_lifecycle() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = idp("<EntityDescriptor/>");
        let computed = SamlProviderLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:saml-provider/okta"
        );
        assert!(computed.contains_key("valid_until"));
        assert_eq!(mutations(&backend), vec!["CreateSAMLProvider", "TagSAMLProvider"]);

        backend.clear_calls();
        let updated_desired = idp("<EntityDescriptor entityID=\"x\"/>");
        let updated = SamlProviderLifecycle
            .update(&remote, &updated_desired, &changes(&desired, &updated_desired), &computed)
            .unwrap();
        assert_eq!(mutations(&backend), vec!["UpdateSAMLProvider"]);
        assert_eq!(updated["arn"], computed["arn"]);

        let observed = SamlProviderLifecycle
            .external_state(&remote, &updated_desired, &updated)
            .unwrap();
        assert_eq!(observed, updated_desired);

        SamlProviderLifecycle
            .destroy(&remote, &updated_desired, &updated)
            .unwrap();
        assert!(
            SamlProviderLifecycle
                .external_state(&remote, &updated_desired, &updated)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_metadata_must_be_xml() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = idp("not xml");
        let err = SamlProviderLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap_err();
        assert!(err.to_string().contains("create_saml_provider failed"));
    }

    #[test]
    fn test_create_retry_adopts_untagged_provider() {
        let backend = backend();
        let remote = Remote::new(&backend, CancelToken::new());
        let desired = idp("<EntityDescriptor/>");
        backend.fail_on("TagSAMLProvider", "ServiceFailure", "boom");
        assert!(
            SamlProviderLifecycle
                .create(&remote, &desired, &ChangeSet::all(&desired))
                .is_err()
        );

        backend.clear_failures();
        backend.clear_calls();
        let computed = SamlProviderLifecycle
            .create(&remote, &desired, &ChangeSet::all(&desired))
            .unwrap();
        assert_eq!(mutations(&backend), vec!["TagSAMLProvider"]);
        assert_eq!(
            str_field(&computed, "arn"),
            "arn:aws:iam::123456789012:saml-provider/okta"
        );
        let observed = SamlProviderLifecycle
            .external_state(&remote, &desired, &computed)
            .unwrap();
        assert_eq!(observed, desired);
    }
}
