//! # Declarative
//!
//! Declarative reconciliation: converge a declared configuration with the
//! observed state of a remote system through a minimal set of calls.
//!
//! ## Core Concepts
//!
//! - **ConfigNode**: the scalar/list/map tree used for desired and observed state
//! - **ChangeSet**: the changed field paths that drive which operations apply
//! - **Diff**: keyed add/update/remove partitions for list-valued sub-resources
//! - **Operation**: a two-phase Prepare/Execute unit of work
//! - **Plan**: the ordered operation list for one lifecycle call
//! - **run**: the pipeline runner threading a [`SharedContext`] through a plan
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{run, CancelToken, ChangeSet, ConfigNode, Plan, SharedContext};
//!
//! let mut plan = Plan::new();
//! plan.push(CreateRole::default());
//! plan.push_if(desired.declares("managed_policy_arns"), AttachPolicies::default());
//!
//! let outcome = run(
//!     &CancelToken::new(),
//!     SharedContext::new(),
//!     plan,
//!     &desired,
//!     &ChangeSet::all(&desired),
//!     &remote,
//! )?;
//! let arn = outcome.context.require_str("arn")?;
//! ```
//!
//! The runner is strictly sequential and does not retry or roll back: the
//! first failing step aborts the run and earlier side effects stay in place.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod operation;
pub mod planner;
pub mod types;

// Re-export main types at crate root
pub use context::{CancelToken, SharedContext};
pub use diff::{DiffResult, KeyedItem, diff, diff_keys};
pub use error::{Error, Result};
pub use executor::{PipelineOutcome, run};
pub use normalize::{canonical_eq, canonical_json, converged, scalar_eq};
pub use operation::{BoxedOperation, Operation};
pub use planner::Plan;
pub use types::{ChangeSet, ConfigNode, FieldChange, Scalar};
