//! Two-phase operations
//!
//! An Operation is one staged unit of work: `prepare` inspects desired and
//! current state, decides whether it applies and builds its call payload;
//! `execute` performs the remote calls and may extend the shared context.

use crate::context::SharedContext;
use crate::types::{ChangeSet, ConfigNode};
use anyhow::Result;
use std::fmt;

/// Core trait for staged operations
///
/// `S` is the remote service handle the operation talks to. Operations are
/// built fresh for every lifecycle call and hold no state across calls; the
/// payload computed by `prepare` lives on the operation itself until
/// `execute` consumes it.
///
/// # Example
///
/// ```ignore
/// use declarative::{ChangeSet, ConfigNode, Operation, SharedContext};
///
/// fn prepared<T>(slot: &mut Option<T>, step: &str) -> anyhow::Result<T> {
///     slot.take()
///         .ok_or_else(|| anyhow::anyhow!("{step}: execute called before prepare"))
/// }
///
/// #[derive(Debug)]
/// struct CreateGroup { name: Option<String> }
///
/// impl Operation<Remote<'_>> for CreateGroup {
///     fn name(&self) -> &'static str { "create_group" }
///
///     fn prepare(&mut self, _: &mut SharedContext, desired: &ConfigNode, _: &ChangeSet)
///         -> anyhow::Result<bool>
///     {
///         self.name = Some(desired.required_str("name")?.to_string());
///         Ok(true)
///     }
///
///     fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'_>)
///         -> anyhow::Result<()>
///     {
///         let name = prepared(&mut self.name, "create_group")?;
///         let group = remote.call("CreateGroup", |b| b.create_group(&name, None))?;
///         shared.insert_str("arn", group.arn);
///         Ok(())
///     }
/// }
/// ```
pub trait Operation<S: ?Sized>: fmt::Debug {
    /// Stable step name, used in logs and error context
    fn name(&self) -> &'static str;

    /// Decide applicability and build the payload
    ///
    /// Must not perform remote calls. Returning `Ok(false)` skips `execute`.
    fn prepare(
        &mut self,
        shared: &mut SharedContext,
        desired: &ConfigNode,
        changes: &ChangeSet,
    ) -> Result<bool>;

    /// Perform the remote side effects
    fn execute(&mut self, shared: &mut SharedContext, service: &S) -> Result<()>;
}

/// A boxed operation for type-erased storage
pub type BoxedOperation<'a, S> = Box<dyn Operation<S> + 'a>;
