//! `iamsync destroy` - tear down managed resources

use super::Session;
use super::apply::{Action, Step, execute, print_plan};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::remote::Remote;
use crate::state::IamState;
use crate::ui;
use anyhow::{Result, bail};
use declarative::CancelToken;

/// Destroy steps for one resource, or every resource newest first
pub fn plan(state: &IamState, id: Option<&str>) -> Result<Vec<Step>> {
    let records: Vec<_> = match id {
        Some(id) => match state.get(id) {
            Some(record) => vec![record],
            None => bail!("'{id}' is not managed"),
        },
        None => state.resources.iter().rev().collect(),
    };
    Ok(records
        .into_iter()
        .map(|record| Step {
            id: record.id.clone(),
            resource_type: record.resource_type.clone(),
            desired: record.desired.clone(),
            action: Action::Destroy,
        })
        .collect())
}

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    let steps = plan(&session.state, args.id.as_deref())?;

    if steps.is_empty() {
        ui::info("Nothing to destroy");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Destroy");
        print_plan(ctx, &session.state, &steps);
        println!();
    }

    if args.dry_run {
        ui::info(&format!("{} resource(s) would be destroyed (dry run)", steps.len()));
        return Ok(());
    }

    let remote = Remote::new(&session.backend, CancelToken::new());
    let result = execute(&remote, &mut session.state, &steps);
    session.save()?;

    let destroyed = result?;
    ui::success(&format!("Destroyed {destroyed} resource(s)"));
    Ok(())
}
