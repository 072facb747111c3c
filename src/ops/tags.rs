//! Tags of any taggable resource

use super::{changed, prepared};
use crate::remote::Remote;
use anyhow::Result;
use declarative::normalize::{self, tags_node};
use declarative::{
    ChangeSet, ConfigNode, DiffResult, KeyedItem, Operation, SharedContext, diff, scalar_eq,
};
use iamkit::{Tag, TagTarget};

const FIELD: &str = "tags";

/// How the tagging calls address the resource
#[derive(Debug, Clone, Copy)]
enum Addressing {
    /// By the upstream name in the shared context
    Name(fn(String) -> TagTarget),
    /// By the `arn` value in the shared context
    Arn(fn(String) -> TagTarget),
}

/// Converge `tags`: one untag call for dropped keys, one tag call for the rest
#[derive(Debug)]
pub struct ReconcileTags {
    addressing: Addressing,
    diff: Option<DiffResult>,
}

impl ReconcileTags {
    /// Tag a resource addressed by name (`TagTarget::User`)
    pub fn by_name(target: fn(String) -> TagTarget) -> Self {
        Self {
            addressing: Addressing::Name(target),
            diff: None,
        }
    }

    /// Tag a resource addressed by ARN (`TagTarget::Policy`)
    pub fn by_arn(target: fn(String) -> TagTarget) -> Self {
        Self {
            addressing: Addressing::Arn(target),
            diff: None,
        }
    }

    fn target(&self, shared: &SharedContext) -> Result<TagTarget> {
        Ok(match self.addressing {
            Addressing::Name(make) => make(shared.require_upstream()?.to_string()),
            Addressing::Arn(make) => make(shared.require_str("arn")?.to_string()),
        })
    }
}

impl<'r> Operation<Remote<'r>> for ReconcileTags {
    fn name(&self) -> &'static str {
        "reconcile_tags"
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
        let current = normalize::tags(previous, FIELD)?;
        let wanted = normalize::tags(wanted, FIELD)?;
        let result = diff(&current, &wanted, scalar_eq);
        if !result.has_changes() {
            return Ok(false);
        }
        self.diff = Some(result);
        Ok(true)
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let diff = prepared(&mut self.diff, "reconcile_tags")?;
        let target = self.target(shared)?;

        if !diff.to_remove.is_empty() {
            remote.call("Untag", |b| b.untag_resource(&target, &diff.to_remove))?;
        }
        let upserts: Vec<Tag> = diff.upserts().into_iter().map(to_tag).collect();
        if !upserts.is_empty() {
            remote.call("Tag", |b| b.tag_resource(&target, &upserts))?;
        }
        Ok(())
    }
}

fn to_tag(item: &KeyedItem) -> Tag {
    let value = item
        .value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| item.value.to_string());
    Tag::new(item.key.clone(), value)
}

/// Tags in the desired list-of-maps shape, sorted by key
pub fn to_node(tags: &[Tag]) -> ConfigNode {
    let items: Vec<KeyedItem> = tags
        .iter()
        .map(|t| KeyedItem::new(t.key.clone(), ConfigNode::str(t.value.clone())))
        .collect();
    tags_node(&items)
}

/// Tags as creation-time request parameters
pub fn from_desired(desired: &ConfigNode) -> declarative::Result<Vec<Tag>> {
    Ok(normalize::tags(desired.get(FIELD), FIELD)?
        .iter()
        .map(to_tag)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{CancelToken, FieldChange, Plan, run};
    use iamkit::{Backend, MemoryBackend, NewUser};

    fn tags(pairs: &[(&str, &str)]) -> ConfigNode {
        to_node(
            &pairs
                .iter()
                .map(|(k, v)| Tag::new(*k, *v))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_changed_value_is_one_tag_call() {
        let backend = MemoryBackend::new("123456789012", "aws");
        backend
            .create_user(&NewUser {
                name: "alice".into(),
                tags: vec![Tag::new("env", "dev"), Tag::new("team", "x")],
                ..NewUser::default()
            })
            .unwrap();
        backend.clear_calls();

        let remote = Remote::new(&backend, CancelToken::new());
        let desired = ConfigNode::empty().with(FIELD, tags(&[("env", "prod"), ("team", "x")]));
        let changes: ChangeSet = [FieldChange::new(
            FIELD,
            Some(tags(&[("env", "dev"), ("team", "x")])),
            desired.get(FIELD).cloned(),
        )]
        .into_iter()
        .collect();
        let plan: Plan<'_, Remote<'_>> = Plan::new().then(ReconcileTags::by_name(TagTarget::User));

        run(
            remote.cancel_token(),
            SharedContext::for_upstream("alice"),
            plan,
            &desired,
            &changes,
            &remote,
        )
        .unwrap();

        assert_eq!(backend.calls(), vec!["TagUser"]);
        assert_eq!(
            backend.get_user("alice").unwrap().tags,
            vec![Tag::new("env", "prod"), Tag::new("team", "x")]
        );
    }

    #[test]
    fn test_map_form_accepted() {
        let desired = ConfigNode::empty().with(
            FIELD,
            ConfigNode::map([("team", ConfigNode::str("x")), ("env", ConfigNode::str("dev"))]),
        );
        assert_eq!(
            from_desired(&desired).unwrap(),
            vec![Tag::new("env", "dev"), Tag::new("team", "x")]
        );
    }

    #[test]
    fn test_arn_addressing_reads_context() {
        let mut shared = SharedContext::new();
        shared.insert_str("arn", "arn:aws:iam::123456789012:policy/ro");
        let op = ReconcileTags::by_arn(TagTarget::Policy);
        assert_eq!(
            op.target(&shared).unwrap(),
            TagTarget::Policy("arn:aws:iam::123456789012:policy/ro".into())
        );
        assert!(ReconcileTags::by_name(TagTarget::Role).target(&shared).is_err());
    }
}
