//! Console login profile of a user

use super::{changed, prepared};
use crate::remote::Remote;
use anyhow::{Result, bail};
use chrono::Utc;
use declarative::{ChangeSet, ConfigNode, Operation, SharedContext};

const FIELD: &str = "login_profile";

/// Context key of the generated password
pub const PASSWORD_KEY: &str = "login_profile.password";

const DEFAULT_PASSWORD_LENGTH: i64 = 20;
const PASSWORD_CLASSES: [&str; 4] = [
    "ABCDEFGHJKLMNPQRSTUVWXYZ",
    "abcdefghijkmnopqrstuvwxyz",
    "23456789",
    "!@#$%^&*()_+-=[]{}|",
];

#[derive(Debug)]
enum Action {
    Create { reset_required: bool, length: usize },
    Update { reset_required: bool },
    Delete,
}

/// Create, update or delete the login profile declared in `login_profile`
///
/// A created profile gets a generated password, published to the shared
/// context under [`PASSWORD_KEY`]. Changing only `password_length` of an
/// existing profile does not rotate the password.
#[derive(Debug, Default)]
pub struct ReconcileLoginProfile {
    action: Option<Action>,
}

impl ReconcileLoginProfile {
    pub fn new() -> Self {
        Self::default()
    }
}

fn reset_required(node: &ConfigNode) -> Result<bool> {
    Ok(node
        .optional_bool("password_reset_required")?
        .unwrap_or(true))
}

impl<'r> Operation<Remote<'r>> for ReconcileLoginProfile {
    fn name(&self) -> &'static str {
        "reconcile_login_profile"
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

        // A change recorded only on a nested path means the profile existed.
        if changes.get(FIELD).is_none()
            && let Some(wanted) = wanted
        {
            self.action = Some(Action::Update {
                reset_required: reset_required(wanted)?,
            });
            return Ok(true);
        }

        self.action = match (previous, wanted) {
            (None, Some(wanted)) => {
                let length = wanted
                    .optional_i64("password_length")?
                    .unwrap_or(DEFAULT_PASSWORD_LENGTH);
                if !(8..=128).contains(&length) {
                    bail!("{FIELD}.password_length must be between 8 and 128, got {length}");
                }
                Some(Action::Create {
                    reset_required: reset_required(wanted)?,
                    length: length as usize,
                })
            }
            (Some(previous), Some(wanted)) => {
                let reset = reset_required(wanted)?;
                (reset != reset_required(previous)?).then_some(Action::Update {
                    reset_required: reset,
                })
            }
            (Some(_), None) => Some(Action::Delete),
            (None, None) => None,
        };
        Ok(self.action.is_some())
    }

    fn execute(&mut self, shared: &mut SharedContext, remote: &Remote<'r>) -> Result<()> {
        let action = prepared(&mut self.action, "reconcile_login_profile")?;
        let user = shared.require_upstream()?.to_string();

        match action {
            Action::Create {
                reset_required,
                length,
            } => {
                let password = generate_password(&user, length);
                remote.call("CreateLoginProfile", |b| {
                    b.create_login_profile(&user, &password, reset_required)
                })?;
                shared.insert_str(PASSWORD_KEY, password);
            }
            Action::Update { reset_required } => {
                remote.call("UpdateLoginProfile", |b| {
                    b.update_login_profile(&user, None, reset_required)
                })?;
            }
            Action::Delete => {
                remote.call_tolerant("DeleteLoginProfile", |b| b.delete_login_profile(&user))?;
            }
        }
        Ok(())
    }
}

/// Generate a console password with characters from every class
///
/// Derived from the user name and the current time through a BLAKE3 XOF.
pub fn generate_password(seed: &str, length: usize) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&nanos.to_le_bytes());

    let mut bytes = vec![0u8; length];
    hasher.finalize_xof().fill(&mut bytes);

    bytes
        .iter()
        .enumerate()
        .map(|(i, byte)| {
            let class = PASSWORD_CLASSES[i % PASSWORD_CLASSES.len()].as_bytes();
            char::from(class[usize::from(*byte) % class.len()])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::FieldChange;

    fn profile(reset: bool) -> ConfigNode {
        ConfigNode::empty().with("password_reset_required", ConfigNode::bool(reset))
    }

    fn prepare(desired: &ConfigNode, changes: &ChangeSet) -> ReconcileLoginProfile {
        let mut op = ReconcileLoginProfile::new();
        Operation::<Remote<'_>>::prepare(&mut op, &mut SharedContext::new(), desired, changes)
            .unwrap();
        op
    }

    #[test]
    fn test_generated_password_covers_all_classes() {
        let password = generate_password("alice", 20);
        assert_eq!(password.len(), 20);
        for class in PASSWORD_CLASSES {
            assert!(password.chars().any(|c| class.contains(c)), "{password}");
        }
    }

    #[test]
    fn test_new_profile_is_created() {
        let desired = ConfigNode::empty().with(FIELD, profile(false));
        let op = prepare(&desired, &ChangeSet::all(&desired));
        assert!(matches!(
            op.action,
            Some(Action::Create {
                reset_required: false,
                length: 20
            })
        ));
    }

    #[test]
    fn test_flag_flip_is_update() {
        let desired = ConfigNode::empty().with(FIELD, profile(true));
        let changes: ChangeSet = [FieldChange::new(
            FIELD,
            Some(profile(false)),
            Some(profile(true)),
        )]
        .into_iter()
        .collect();
        let op = prepare(&desired, &changes);
        assert!(matches!(
            op.action,
            Some(Action::Update {
                reset_required: true
            })
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        let desired = ConfigNode::empty().with(
            FIELD,
            ConfigNode::empty().with("password_length", ConfigNode::int(4)),
        );
        let mut op = ReconcileLoginProfile::new();
        assert!(
            Operation::<Remote<'_>>::prepare(
                &mut op,
                &mut SharedContext::new(),
                &desired,
                &ChangeSet::all(&desired)
            )
            .is_err()
        );
    }
}
