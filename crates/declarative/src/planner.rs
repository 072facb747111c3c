//! Plan assembly - the ordered operation list for one lifecycle call

use crate::operation::{BoxedOperation, Operation};

/// An ordered list of operations
///
/// Order is significant: an operation whose `prepare` reads a value from the
/// shared context must come after the operation that produces it. The
/// runner never reorders.
pub struct Plan<'a, S: ?Sized> {
    ops: Vec<BoxedOperation<'a, S>>,
}

impl<'a, S: ?Sized> Plan<'a, S> {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append an operation
    pub fn push<O>(&mut self, op: O)
    where
        O: Operation<S> + 'a,
    {
        self.ops.push(Box::new(op));
    }

    /// Append an operation only when `include` holds
    ///
    /// Used for sub-resource kinds that are only planned when declared.
    pub fn push_if<O>(&mut self, include: bool, op: O)
    where
        O: Operation<S> + 'a,
    {
        if include {
            self.push(op);
        }
    }

    /// Builder form of [`Plan::push`]
    pub fn then<O>(mut self, op: O) -> Self
    where
        O: Operation<S> + 'a,
    {
        self.push(op);
        self
    }

    /// Step names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.ops.iter().map(|op| op.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BoxedOperation<'a, S>> {
        self.ops
    }
}

impl<S: ?Sized> Default for Plan<'_, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::types::{ChangeSet, ConfigNode};

    #[derive(Debug)]
    struct Named(&'static str);

    impl Operation<()> for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn prepare(
            &mut self,
            _shared: &mut SharedContext,
            _desired: &ConfigNode,
            _changes: &ChangeSet,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn execute(&mut self, _shared: &mut SharedContext, _service: &()) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_order_preserved() {
        let mut plan: Plan<'_, ()> = Plan::new();
        plan.push(Named("create_role"));
        plan.push_if(false, Named("put_permissions_boundary"));
        plan.push_if(true, Named("attach_policies"));
        let plan = plan.then(Named("tag_role"));

        assert_eq!(plan.names(), vec!["create_role", "attach_policies", "tag_role"]);
        assert_eq!(plan.len(), 3);
        assert!(!plan.is_empty());
    }
}
