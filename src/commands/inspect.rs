//! Read-only commands: `read`, `list`, `types`

use super::{Session, lifecycle};
use crate::Context;
use crate::remote::Remote;
use crate::resource::{self, computed_node};
use crate::state::ResourceRecord;
use crate::ui;
use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{CancelToken, ConfigNode};
use iamkit::MemoryBackend;

/// Observe a managed resource through its controller
pub fn observe(backend: &MemoryBackend, record: &ResourceRecord) -> Result<ConfigNode> {
    let remote = Remote::new(backend, CancelToken::new());
    lifecycle(&record.resource_type)?
        .external_state(&remote, &record.desired, &record.computed)
        .with_context(|| format!("read {} ({})", record.id, record.resource_type))
}

pub fn read(ctx: &Context, id: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let record = session
        .state
        .get(id)
        .with_context(|| format!("'{id}' is not managed"))?;
    let observed = observe(&session.backend, record)?;

    ui::header(&format!("{} ({})", record.id, record.resource_type));
    if observed.is_empty() {
        ui::warn("Resource no longer exists in the account");
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&observed.to_json())?);
    if !record.computed.is_empty() {
        println!();
        println!("{}", "Computed".cyan().bold());
        println!(
            "{}",
            serde_json::to_string_pretty(&computed_node(&record.computed).to_json())?
        );
    }
    if ctx.verbose > 0 && observed != record.desired {
        println!();
        println!("{}", "Drift (desired → observed)".cyan().bold());
        ui::diff(
            &serde_json::to_string_pretty(&record.desired.to_json())?,
            &serde_json::to_string_pretty(&observed.to_json())?,
        );
    }
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    if session.state.resources.is_empty() {
        ui::info("No managed resources");
        return Ok(());
    }

    ui::header(&format!("Managed resources ({})", session.state.resources.len()));
    for record in &session.state.resources {
        let identity = record
            .computed
            .get("arn")
            .or_else(|| record.computed.get("access_key_id"))
            .and_then(ConfigNode::as_str)
            .unwrap_or("-");
        println!(
            "  {:<24} {:<24} {}",
            record.id.bold(),
            record.resource_type,
            ui::truncate(identity, 60).dimmed()
        );
        if ctx.verbose > 0 {
            ui::kv("updated", &record.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

pub fn types() {
    for type_name in resource::RESOURCE_TYPES {
        println!("{type_name}");
    }
}
