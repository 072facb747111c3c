//! `iamsync apply` - converge the account with a manifest
//!
//! Manifests are TOML:
//!
//! ```toml
//! [[resource]]
//! id = "deployers"
//! type = "iam_group"
//!
//! [resource.properties]
//! name = "deployers"
//! managed_policy_arns = ["arn:aws:iam::aws:policy/ReadOnlyAccess"]
//! ```

use super::{Session, lifecycle};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::remote::Remote;
use crate::resource;
use crate::state::{IamState, ResourceRecord};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{CancelToken, ChangeSet, ConfigNode, normalize};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default = "ConfigNode::empty")]
    pub properties: ConfigNode,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.resources {
            if !seen.insert(entry.id.as_str()) {
                bail!("duplicate resource id '{}'", entry.id);
            }
            lifecycle(&entry.resource_type).with_context(|| format!("resource '{}'", entry.id))?;
            if entry.properties.as_map().is_none() {
                bail!("resource '{}': properties must be a table", entry.id);
            }
        }
        Ok(())
    }
}

/// What one resource needs
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create,
    Update(ChangeSet),
    /// A create-only field changed: destroy, then create
    Replace(ChangeSet),
    Destroy,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub resource_type: String,
    pub desired: ConfigNode,
    pub action: Action,
}

impl Step {
    fn symbol(&self) -> colored::ColoredString {
        match self.action {
            Action::Create => "+".green().bold(),
            Action::Update(_) => "~".yellow().bold(),
            Action::Replace(_) => "-/+".red().bold(),
            Action::Destroy => "-".red().bold(),
            Action::Unchanged => "=".dimmed(),
        }
    }
}

/// Compare the manifest with recorded state and the live account
///
/// Creates and updates follow manifest order; resources dropped from the
/// manifest are destroyed afterwards, newest first. Fields changed outside
/// iamsync are planned as updates, and a recorded resource that no longer
/// exists is created again.
pub fn plan(remote: &Remote<'_>, state: &IamState, manifest: &Manifest) -> Result<Vec<Step>> {
    let mut steps = Vec::new();

    for entry in &manifest.resources {
        let action = match state.get(&entry.id) {
            None => Action::Create,
            Some(record) if record.resource_type != entry.resource_type => {
                Action::Replace(ChangeSet::all(&entry.properties))
            }
            Some(record) => reconcile(remote, record, entry)?,
        };
        steps.push(Step {
            id: entry.id.clone(),
            resource_type: entry.resource_type.clone(),
            desired: entry.properties.clone(),
            action,
        });
    }

    let wanted: BTreeSet<&str> = manifest.resources.iter().map(|e| e.id.as_str()).collect();
    for record in state.resources.iter().rev() {
        if !wanted.contains(record.id.as_str()) {
            steps.push(Step {
                id: record.id.clone(),
                resource_type: record.resource_type.clone(),
                desired: record.desired.clone(),
                action: Action::Destroy,
            });
        }
    }

    Ok(steps)
}

fn reconcile(remote: &Remote<'_>, record: &ResourceRecord, entry: &ManifestEntry) -> Result<Action> {
    let controller = lifecycle(&entry.resource_type)?;
    let mut changes = ChangeSet::between(&record.desired, &entry.properties);
    if controller.requires_replacement(&changes) {
        return Ok(Action::Replace(changes));
    }

    let observed = controller
        .external_state(remote, &entry.properties, &record.computed)
        .with_context(|| format!("read {} ({})", entry.id, entry.resource_type))?;
    if observed.is_empty() {
        log::warn!("{} no longer exists, creating it again", entry.id);
        return Ok(Action::Create);
    }

    for change in resource::drift(controller, &entry.properties, &observed).iter() {
        if !changes.touches(&change.path) {
            log::info!("{}: {} changed outside iamsync", entry.id, change.path);
            changes.push(change.clone());
        }
    }
    Ok(if changes.is_empty() {
        Action::Unchanged
    } else {
        Action::Update(changes)
    })
}

/// Run steps in order, recording each result in `state` as it lands
///
/// Stops at the first failure; earlier steps stay recorded.
pub fn execute(remote: &Remote<'_>, state: &mut IamState, steps: &[Step]) -> Result<usize> {
    let mut applied = 0;
    for step in steps {
        match &step.action {
            Action::Unchanged => continue,
            Action::Create => create(remote, state, step)?,
            Action::Update(changes) => {
                let record = state
                    .get(&step.id)
                    .with_context(|| format!("no recorded state for '{}'", step.id))?;
                let computed = lifecycle(&step.resource_type)?
                    .update(remote, &step.desired, changes, &record.computed)
                    .with_context(|| format!("update {} ({})", step.id, step.resource_type))?;
                state.upsert(ResourceRecord::new(
                    &step.id,
                    &step.resource_type,
                    step.desired.clone(),
                    computed,
                ));
            }
            Action::Replace(_) => {
                destroy(remote, state, &step.id)?;
                create(remote, state, step)?;
            }
            Action::Destroy => destroy(remote, state, &step.id)?,
        }
        applied += 1;
    }
    Ok(applied)
}

fn create(remote: &Remote<'_>, state: &mut IamState, step: &Step) -> Result<()> {
    let controller = lifecycle(&step.resource_type)?;
    let computed = controller
        .create(remote, &step.desired, &ChangeSet::all(&step.desired))
        .with_context(|| format!("create {} ({})", step.id, step.resource_type))?;
    if !controller.stabilised(remote, &computed)? {
        log::warn!("{} is not stable yet", step.id);
    }
    state.upsert(ResourceRecord::new(
        &step.id,
        &step.resource_type,
        step.desired.clone(),
        computed,
    ));
    Ok(())
}

pub(crate) fn destroy(remote: &Remote<'_>, state: &mut IamState, id: &str) -> Result<()> {
    let record = state
        .get(id)
        .with_context(|| format!("no recorded state for '{id}'"))?;
    lifecycle(&record.resource_type)?
        .destroy(remote, &record.desired, &record.computed)
        .with_context(|| format!("destroy {id} ({})", record.resource_type))?;
    state.remove(id);
    Ok(())
}

/// Print the plan; field-level diffs when verbose
pub fn print_plan(ctx: &Context, state: &IamState, steps: &[Step]) {
    for step in steps {
        let detail = match &step.action {
            Action::Update(changes) | Action::Replace(changes) => {
                format!(" ({})", changes.paths().join(", "))
            }
            _ => String::new(),
        };
        println!(
            "  {} {} {}{}",
            step.symbol(),
            step.id.bold(),
            step.resource_type.dimmed(),
            detail.dimmed()
        );

        if ctx.verbose > 0
            && matches!(step.action, Action::Update(_) | Action::Replace(_))
            && let Some(record) = state.get(&step.id)
        {
            ui::diff(&pretty(&record.desired), &pretty(&step.desired));
        }
    }
}

fn pretty(node: &ConfigNode) -> String {
    let value = normalize::document(node).to_json();
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| node.to_string())
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let mut session = Session::open(ctx)?;
    let remote = Remote::new(&session.backend, CancelToken::new());
    let steps = plan(&remote, &session.state, &manifest)?;

    let pending = steps
        .iter()
        .filter(|s| s.action != Action::Unchanged)
        .count();

    if !ctx.quiet {
        ui::header(&format!("Plan: {}", args.manifest.display()));
        print_plan(ctx, &session.state, &steps);
        println!();
    }

    if pending == 0 {
        ui::success("Account matches the manifest");
        return Ok(());
    }

    if args.dry_run {
        ui::info(&format!("{pending} change(s) pending (dry run)"));
        return Ok(());
    }

    let result = execute(&remote, &mut session.state, &steps);
    session.save()?;

    let applied = result?;
    ui::success(&format!("Applied {applied} change(s)"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::session;
    use crate::resource::testing::mutations;
    use iamkit::{Tag, TagTarget};
    use iamkit::Backend;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"
[[resource]]
id = "ops"
type = "iam_group"

[resource.properties]
name = "ops"
path = "/"

[[resource]]
id = "alice"
type = "iam_user"

[resource.properties]
name = "alice"
groups = ["ops"]

[[resource.properties.tags]]
key = "team"
value = "platform"
"#;

    fn actions(steps: &[Step]) -> Vec<(&str, &Action)> {
        steps.iter().map(|s| (s.id.as_str(), &s.action)).collect()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[1].resource_type, "iam_user");
        assert_eq!(
            manifest.resources[1].properties.get("groups"),
            Some(&ConfigNode::str_list(["ops"]))
        );
    }

    #[test]
    fn test_manifest_rejects_duplicates_and_unknown_types() {
        let duplicate = "[[resource]]\nid = \"a\"\ntype = \"iam_group\"\n\
                         [[resource]]\nid = \"a\"\ntype = \"iam_group\"\n";
        assert!(
            Manifest::parse(duplicate)
                .unwrap_err()
                .to_string()
                .contains("duplicate")
        );

        let unknown = "[[resource]]\nid = \"a\"\ntype = \"iam_widget\"\n";
        assert!(format!("{:#}", Manifest::parse(unknown).unwrap_err()).contains("iam_widget"));
    }

    #[test]
    fn test_apply_then_reapply_is_noop() {
        let (_dir, mut session) = session();
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let remote = Remote::new(&session.backend, CancelToken::new());

        let steps = plan(&remote, &session.state, &manifest).unwrap();
        assert_eq!(
            actions(&steps),
            vec![("ops", &Action::Create), ("alice", &Action::Create)]
        );
        assert_eq!(execute(&remote, &mut session.state, &steps).unwrap(), 2);
        let groups = session.backend.list_groups_for_user("alice").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "ops");

        let again = plan(&remote, &session.state, &manifest).unwrap();
        assert!(again.iter().all(|s| s.action == Action::Unchanged));
    }

    #[test]
    fn test_changed_field_updates_in_place() {
        let (_dir, mut session) = session();
        let remote = Remote::new(&session.backend, CancelToken::new());
        let steps = plan(&remote, &session.state, &Manifest::parse(MANIFEST).unwrap()).unwrap();
        execute(&remote, &mut session.state, &steps).unwrap();
        session.backend.clear_calls();

        let edited = Manifest::parse(&MANIFEST.replace("platform", "security")).unwrap();
        let steps = plan(&remote, &session.state, &edited).unwrap();
        assert!(matches!(steps[1].action, Action::Update(ref c) if c.paths() == vec!["tags"]));

        execute(&remote, &mut session.state, &steps).unwrap();
        assert_eq!(mutations(&session.backend), vec!["TagUser"]);
    }

    #[test]
    fn test_renamed_group_is_replaced() {
        let (_dir, mut session) = session();
        let remote = Remote::new(&session.backend, CancelToken::new());
        let original = "[[resource]]\nid = \"g\"\ntype = \"iam_group\"\n\
                        [resource.properties]\nname = \"old\"\n";
        let steps = plan(&remote, &session.state, &Manifest::parse(original).unwrap()).unwrap();
        execute(&remote, &mut session.state, &steps).unwrap();

        let renamed = Manifest::parse(&original.replace("old", "new")).unwrap();
        let steps = plan(&remote, &session.state, &renamed).unwrap();
        assert!(matches!(steps[0].action, Action::Replace(_)));

        execute(&remote, &mut session.state, &steps).unwrap();
        assert!(session.backend.get_group("old").is_err());
        assert!(session.backend.get_group("new").is_ok());
        assert_eq!(
            session.state.get("g").unwrap().computed["arn"],
            ConfigNode::str("arn:aws:iam::123456789012:group/new")
        );
    }

    #[test]
    fn test_dropped_resources_destroyed_newest_first() {
        let (_dir, mut session) = session();
        let remote = Remote::new(&session.backend, CancelToken::new());
        let steps = plan(&remote, &session.state, &Manifest::parse(MANIFEST).unwrap()).unwrap();
        execute(&remote, &mut session.state, &steps).unwrap();

        let empty = Manifest::parse("").unwrap();
        let steps = plan(&remote, &session.state, &empty).unwrap();
        assert_eq!(
            actions(&steps),
            vec![("alice", &Action::Destroy), ("ops", &Action::Destroy)]
        );

        execute(&remote, &mut session.state, &steps).unwrap();
        assert!(session.state.resources.is_empty());
        assert!(session.backend.get_group("ops").is_err());
    }

    #[test]
    fn test_failure_keeps_earlier_results() {
        let (_dir, mut session) = session();
        session.backend.fail_on("CreateUser", "LimitExceeded", "too many users");
        let remote = Remote::new(&session.backend, CancelToken::new());
        let steps = plan(&remote, &session.state, &Manifest::parse(MANIFEST).unwrap()).unwrap();

        let err = execute(&remote, &mut session.state, &steps).unwrap_err();
        assert!(err.to_string().contains("create alice (iam_user)"));
        assert!(session.state.get("ops").is_some());
        assert!(session.state.get("alice").is_none());
    }

    #[test]
    fn test_changes_made_outside_are_planned_and_reverted() {
        let (_dir, mut session) = session();
        let remote = Remote::new(&session.backend, CancelToken::new());
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let steps = plan(&remote, &session.state, &manifest).unwrap();
        execute(&remote, &mut session.state, &steps).unwrap();

        session.backend.remove_user_from_group("ops", "alice").unwrap();
        session
            .backend
            .tag_resource(&TagTarget::User("alice".into()), &[Tag::new("owner", "mallory")])
            .unwrap();

        let steps = plan(&remote, &session.state, &manifest).unwrap();
        assert_eq!(steps[0].action, Action::Unchanged);
        assert!(matches!(
            steps[1].action,
            Action::Update(ref c) if c.paths() == vec!["groups", "tags"]
        ));

        execute(&remote, &mut session.state, &steps).unwrap();
        let groups = session.backend.list_groups_for_user("alice").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            session.backend.list_tags(&TagTarget::User("alice".into())).unwrap(),
            vec![Tag::new("team", "platform")]
        );
        let again = plan(&remote, &session.state, &manifest).unwrap();
        assert!(again.iter().all(|s| s.action == Action::Unchanged));
    }

    #[test]
    fn test_resource_deleted_outside_is_created_again() {
        let (_dir, mut session) = session();
        let remote = Remote::new(&session.backend, CancelToken::new());
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let steps = plan(&remote, &session.state, &manifest).unwrap();
        execute(&remote, &mut session.state, &steps).unwrap();

        session.backend.remove_user_from_group("ops", "alice").unwrap();
        session.backend.delete_user("alice").unwrap();

        let steps = plan(&remote, &session.state, &manifest).unwrap();
        assert_eq!(
            actions(&steps),
            vec![("ops", &Action::Unchanged), ("alice", &Action::Create)]
        );
        execute(&remote, &mut session.state, &steps).unwrap();
        assert!(session.backend.get_user("alice").is_ok());
        assert_eq!(session.backend.list_groups_for_user("alice").unwrap().len(), 1);
    }
}
