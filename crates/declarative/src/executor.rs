//! Pipeline runner - drives Prepare→Execute over an ordered plan

use crate::context::{CancelToken, SharedContext};
use crate::error::Error;
use crate::planner::Plan;
use crate::types::{ChangeSet, ConfigNode};
use anyhow::{Context, Result};

/// What a pipeline run did
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// True iff at least one operation was applicable and executed
    pub has_changes: bool,
    /// The shared context after the last step
    pub context: SharedContext,
    /// Steps that executed, in order
    pub executed: Vec<&'static str>,
    /// Steps whose prepare reported "not applicable"
    pub skipped: Vec<&'static str>,
}

impl PipelineOutcome {
    /// Turn a change-free run into [`Error::NoChanges`]
    pub fn require_changes(self) -> std::result::Result<Self, Error> {
        if self.has_changes {
            Ok(self)
        } else {
            Err(Error::NoChanges)
        }
    }
}

/// Run a plan against a remote service
///
/// Operations run strictly in plan order. The first error from either phase
/// aborts the run: later operations are neither prepared nor executed, and
/// nothing that already executed is undone. The error carries the failing
/// step name as context.
pub fn run<S: ?Sized>(
    cancel: &CancelToken,
    seed: SharedContext,
    plan: Plan<'_, S>,
    desired: &ConfigNode,
    changes: &ChangeSet,
    service: &S,
) -> Result<PipelineOutcome> {
    let mut outcome = PipelineOutcome {
        context: seed,
        ..PipelineOutcome::default()
    };

    for mut op in plan.into_ops() {
        let name = op.name();
        cancel.check(name)?;

        let applicable = op
            .prepare(&mut outcome.context, desired, changes)
            .with_context(|| format!("{name}: prepare failed"))?;

        if !applicable {
            log::debug!("{name}: not applicable, skipping");
            outcome.skipped.push(name);
            continue;
        }

        cancel.check(name)?;
        log::info!("{name}: executing");
        op.execute(&mut outcome.context, service)
            .with_context(|| format!("{name} failed"))?;

        outcome.executed.push(name);
        outcome.has_changes = true;
    }

    log::debug!(
        "pipeline finished: {} executed, {} skipped",
        outcome.executed.len(),
        outcome.skipped.len()
    );
    Ok(outcome)
}
