//! Reusable sub-resource operations
//!
//! Every controller plans its primary create/update/delete step itself and
//! reuses these for the list-valued sub-resources it shares with other
//! types. Reconcile operations diff the previous value carried by the
//! ChangeSet against the desired value in `prepare` and emit removals
//! before additions in `execute`. Controllers rebase that previous value on
//! the observed remote state before planning, so the diff is against what
//! the remote holds.

pub mod boundary;
pub mod inline;
pub mod login_profile;
pub mod managed;
pub mod membership;
pub mod tags;
pub mod teardown;

pub use boundary::ReconcileBoundary;
pub use inline::{DeleteInlinePolicies, ReconcileInlinePolicies};
pub use login_profile::ReconcileLoginProfile;
pub use managed::{DetachManagedPolicies, ReconcileManagedPolicies};
pub use membership::{LeaveAllGroups, ReconcileGroupMemberships, RemoveAllMembers};
pub use tags::ReconcileTags;
pub use teardown::{DeleteAccessKeys, DeleteLoginProfile, DeleteNonDefaultVersions, RemoveBoundary};

use anyhow::{Context, Result};
use declarative::{ChangeSet, ConfigNode};

/// Previous and desired value of a top-level field, if the field changed
pub(crate) fn changed<'c>(
    changes: &'c ChangeSet,
    desired: &'c ConfigNode,
    path: &str,
) -> Option<(Option<&'c ConfigNode>, Option<&'c ConfigNode>)> {
    if !changes.touches(path) {
        return None;
    }
    let previous = changes
        .get(path)
        .and_then(|c| c.previous.as_ref())
        .filter(|node| !node.is_null());
    Some((previous, desired.get(path)))
}

/// Take the payload `prepare` stored on an operation
pub(crate) fn prepared<T>(slot: &mut Option<T>, step: &str) -> Result<T> {
    slot.take()
        .with_context(|| format!("{step}: execute called before prepare"))
}

/// Read a list of strings from an optional node
pub(crate) fn str_list(node: Option<&ConfigNode>, path: &str) -> declarative::Result<Vec<String>> {
    let Some(node) = node else {
        return Ok(Vec::new());
    };
    let mismatch = || declarative::Error::TypeMismatch {
        path: path.to_string(),
        expected: "a list of strings",
    };
    node.as_list()
        .ok_or_else(mismatch)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
        .collect()
}
