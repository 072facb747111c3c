//! In-memory IAM account.
//!
//! Emulates one account closely enough to drive lifecycle code end to end:
//! entities, attachments, memberships, policy versions and tags, plus the
//! referential checks the real service enforces on delete (a group with
//! attached policies cannot be deleted, a role in an instance profile
//! cannot be deleted, ...). Every RPC is recorded by name, and failures can
//! be injected per RPC.

use super::Backend;
use crate::arn::{Arn, kind, normalize_path};
use crate::error::{Error, Result};
use crate::types::{
    AccessKey, AccessKeyStatus, AttachedPolicy, CallerIdentity, Group, InstanceProfile, LoginProfile,
    ManagedPolicy, NewInstanceProfile, NewOidcProvider, NewPolicy, NewRole, NewSamlProvider,
    NewServerCertificate, NewUser, OidcProvider, PolicyVersion, Principal, Role, SamlProvider,
    ServerCertificate, Tag, TagTarget, User,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

const MAX_POLICY_VERSIONS: usize = 5;
const MAX_ACCESS_KEYS: usize = 2;
const MAX_TAGS: usize = 50;
const MAX_NAME_LEN: usize = 128;
const DEFAULT_SESSION_DURATION: i64 = 3600;

/// Inline policies and managed attachments of a principal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Policies {
    inline: BTreeMap<String, String>,
    attached: BTreeSet<String>,
}

impl Policies {
    fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.attached.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    user: User,
    policies: Policies,
    groups: BTreeSet<String>,
    login_profile: Option<LoginProfile>,
    access_keys: Vec<AccessKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupRecord {
    group: Group,
    policies: Policies,
    members: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRecord {
    role: Role,
    policies: Policies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyRecord {
    policy: ManagedPolicy,
    versions: Vec<PolicyVersion>,
    next_version: u64,
}

/// The persisted contents of an emulated account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Account ID used in ARNs
    pub account_id: String,
    /// Partition used in ARNs
    pub partition: String,
    seq: u64,
    users: BTreeMap<String, UserRecord>,
    groups: BTreeMap<String, GroupRecord>,
    roles: BTreeMap<String, RoleRecord>,
    policies: BTreeMap<String, PolicyRecord>,
    instance_profiles: BTreeMap<String, InstanceProfile>,
    oidc_providers: BTreeMap<String, OidcProvider>,
    saml_providers: BTreeMap<String, SamlProvider>,
    server_certificates: BTreeMap<String, ServerCertificate>,
}

impl Account {
    /// Create an empty account.
    pub fn new(account_id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            partition: partition.into(),
            ..Self::default()
        }
    }

    fn arn(&self, kind: &str, path: &str, name: &str) -> String {
        Arn::build(&self.partition, &self.account_id, kind, path, name)
    }

    /// Deterministic unique ID with an IAM-style prefix
    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        let digest = blake3::hash(format!("{}:{prefix}:{}", self.account_id, self.seq).as_bytes());
        format!("{prefix}{}", digest.to_hex()[..16].to_uppercase())
    }

    fn secret(&mut self) -> String {
        self.seq += 1;
        let digest = blake3::hash(format!("secret:{}:{}", self.account_id, self.seq).as_bytes());
        digest.to_hex()[..40].to_string()
    }

    fn user(&mut self, name: &str) -> Result<&mut UserRecord> {
        self.users
            .get_mut(name)
            .ok_or_else(|| Error::not_found(kind::USER, name))
    }

    fn group(&mut self, name: &str) -> Result<&mut GroupRecord> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| Error::not_found(kind::GROUP, name))
    }

    fn role(&mut self, name: &str) -> Result<&mut RoleRecord> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| Error::not_found(kind::ROLE, name))
    }

    fn policy(&mut self, arn: &str) -> Result<&mut PolicyRecord> {
        self.policies
            .get_mut(arn)
            .ok_or_else(|| Error::not_found(kind::POLICY, arn))
    }

    fn policies_of(&mut self, principal: Principal, name: &str) -> Result<&mut Policies> {
        Ok(match principal {
            Principal::User => &mut self.user(name)?.policies,
            Principal::Group => &mut self.group(name)?.policies,
            Principal::Role => &mut self.role(name)?.policies,
        })
    }

    fn boundary_of(&mut self, principal: Principal, name: &str) -> Result<&mut Option<String>> {
        match principal {
            Principal::User => Ok(&mut self.user(name)?.user.permissions_boundary),
            Principal::Role => Ok(&mut self.role(name)?.role.permissions_boundary),
            Principal::Group => Err(Error::InvalidInput {
                message: "groups do not support permissions boundaries".to_string(),
            }),
        }
    }

    fn tags_of(&mut self, target: &TagTarget) -> Result<&mut Vec<Tag>> {
        let id = target.id();
        let missing = || Error::not_found(target.kind(), id);
        Ok(match target {
            TagTarget::User(_) => &mut self.users.get_mut(id).ok_or_else(missing)?.user.tags,
            TagTarget::Role(_) => &mut self.roles.get_mut(id).ok_or_else(missing)?.role.tags,
            TagTarget::Policy(_) => &mut self.policies.get_mut(id).ok_or_else(missing)?.policy.tags,
            TagTarget::InstanceProfile(_) => {
                &mut self.instance_profiles.get_mut(id).ok_or_else(missing)?.tags
            }
            TagTarget::OidcProvider(_) => {
                &mut self.oidc_providers.get_mut(id).ok_or_else(missing)?.tags
            }
            TagTarget::SamlProvider(_) => {
                &mut self.saml_providers.get_mut(id).ok_or_else(missing)?.tags
            }
            TagTarget::ServerCertificate(_) => {
                &mut self.server_certificates.get_mut(id).ok_or_else(missing)?.tags
            }
        })
    }

    /// Number of principals a managed policy is attached to
    fn attachment_count(&self, policy_arn: &str) -> usize {
        let users = self.users.values().map(|r| &r.policies);
        let groups = self.groups.values().map(|r| &r.policies);
        let roles = self.roles.values().map(|r| &r.policies);
        users
            .chain(groups)
            .chain(roles)
            .filter(|p| p.attached.contains(policy_arn))
            .count()
    }

    fn check_policy_exists(&self, policy_arn: &str) -> Result<()> {
        let parsed = Arn::parse(policy_arn)?;
        if parsed.kind != kind::POLICY {
            return Err(Error::KindMismatch {
                arn: policy_arn.to_string(),
                expected: kind::POLICY.to_string(),
                found: parsed.kind,
            });
        }
        // AWS-managed policies always exist.
        if parsed.account == "aws" || self.policies.contains_key(policy_arn) {
            Ok(())
        } else {
            Err(Error::not_found(kind::POLICY, policy_arn))
        }
    }
}

/// In-memory [`Backend`] implementation.
pub struct MemoryBackend {
    account: Mutex<Account>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<BTreeMap<String, (String, String)>>,
}

impl MemoryBackend {
    /// Create an empty account.
    pub fn new(account_id: &str, partition: &str) -> Self {
        Self::from_account(Account::new(account_id, partition))
    }

    /// Resume from a persisted account.
    pub fn from_account(account: Account) -> Self {
        Self {
            account: Mutex::new(account),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(BTreeMap::new()),
        }
    }

    /// Copy of the current account contents, for persistence.
    pub fn snapshot(&self) -> Account {
        lock(&self.account).clone()
    }

    /// RPC names issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every later call of `rpc` fail with the given service error code.
    pub fn fail_on(&self, rpc: &str, code: &str, message: &str) {
        lock(&self.failures).insert(rpc.to_string(), (code.to_string(), message.to_string()));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    fn call<T>(&self, rpc: &str, f: impl FnOnce(&mut Account) -> Result<T>) -> Result<T> {
        lock(&self.calls).push(rpc.to_string());
        log::trace!("memory backend: {rpc}");
        if let Some((code, message)) = lock(&self.failures).get(rpc) {
            return Err(Error::from_code(code, message));
        }
        let mut account = lock(&self.account);
        f(&mut account)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn principal_rpc(template: &str, principal: Principal) -> String {
    template.replace("{}", principal.noun())
}

fn tag_rpc(verb: &str, target: &TagTarget) -> String {
    let noun = match target {
        TagTarget::User(_) => "User",
        TagTarget::Role(_) => "Role",
        TagTarget::Policy(_) => "Policy",
        TagTarget::InstanceProfile(_) => "InstanceProfile",
        TagTarget::OidcProvider(_) => "OpenIDConnectProvider",
        TagTarget::SamlProvider(_) => "SAMLProvider",
        TagTarget::ServerCertificate(_) => "ServerCertificate",
    };
    match verb {
        "List" => format!("List{noun}Tags"),
        _ => format!("{verb}{noun}"),
    }
}

fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));
    if name.is_empty() || name.len() > MAX_NAME_LEN || !valid_chars {
        return Err(Error::InvalidInput {
            message: format!("invalid {kind} name '{name}'"),
        });
    }
    Ok(())
}

fn validate_document(document: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(document)
        .map(|_| ())
        .map_err(|e| Error::MalformedPolicyDocument {
            message: e.to_string(),
        })
}

fn validate_tags(tags: &[Tag]) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(Error::LimitExceeded {
            message: format!("at most {MAX_TAGS} tags per resource"),
        });
    }
    if tags.iter().any(|t| t.key.is_empty()) {
        return Err(Error::InvalidInput {
            message: "tag keys must not be empty".to_string(),
        });
    }
    Ok(())
}

fn sorted_tags(tags: &[Tag]) -> Vec<Tag> {
    let mut by_key: BTreeMap<&str, &Tag> = BTreeMap::new();
    for tag in tags {
        by_key.insert(&tag.key, tag);
    }
    by_key.into_values().cloned().collect()
}

fn conflict(message: String) -> Error {
    Error::DeleteConflict { message }
}

impl Backend for MemoryBackend {
    fn get_caller_identity(&self) -> Result<CallerIdentity> {
        self.call("GetCallerIdentity", |acct| {
            Ok(CallerIdentity {
                account_id: acct.account_id.clone(),
                partition: acct.partition.clone(),
            })
        })
    }

    fn create_user(&self, input: &NewUser) -> Result<User> {
        self.call("CreateUser", |acct| {
            validate_name(kind::USER, &input.name)?;
            validate_tags(&input.tags)?;
            if acct.users.contains_key(&input.name) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::USER,
                    name: input.name.clone(),
                });
            }
            let path = normalize_path(input.path.as_deref().unwrap_or("/"));
            let user = User {
                name: input.name.clone(),
                user_id: acct.next_id("AIDA"),
                arn: acct.arn(kind::USER, &path, &input.name),
                path,
                permissions_boundary: None,
                tags: sorted_tags(&input.tags),
            };
            acct.users.insert(
                input.name.clone(),
                UserRecord {
                    user: user.clone(),
                    policies: Policies::default(),
                    groups: BTreeSet::new(),
                    login_profile: None,
                    access_keys: Vec::new(),
                },
            );
            Ok(user)
        })
    }

    fn get_user(&self, name: &str) -> Result<User> {
        self.call("GetUser", |acct| Ok(acct.user(name)?.user.clone()))
    }

    fn update_user(&self, name: &str, new_path: &str) -> Result<()> {
        self.call("UpdateUser", |acct| {
            let path = normalize_path(new_path);
            let arn = acct.arn(kind::USER, &path, name);
            let record = acct.user(name)?;
            record.user.path = path;
            record.user.arn = arn;
            Ok(())
        })
    }

    fn delete_user(&self, name: &str) -> Result<()> {
        self.call("DeleteUser", |acct| {
            let record = acct.user(name)?;
            if !record.policies.is_empty() {
                return Err(conflict(format!("user {name} still has policies")));
            }
            if !record.groups.is_empty() {
                return Err(conflict(format!("user {name} is still in groups")));
            }
            if record.login_profile.is_some() {
                return Err(conflict(format!("user {name} still has a login profile")));
            }
            if !record.access_keys.is_empty() {
                return Err(conflict(format!("user {name} still has access keys")));
            }
            acct.users.remove(name);
            Ok(())
        })
    }

    fn create_group(&self, name: &str, path: Option<&str>) -> Result<Group> {
        self.call("CreateGroup", |acct| {
            validate_name(kind::GROUP, name)?;
            if acct.groups.contains_key(name) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::GROUP,
                    name: name.to_string(),
                });
            }
            let path = normalize_path(path.unwrap_or("/"));
            let group = Group {
                name: name.to_string(),
                group_id: acct.next_id("AGPA"),
                arn: acct.arn(kind::GROUP, &path, name),
                path,
            };
            acct.groups.insert(
                name.to_string(),
                GroupRecord {
                    group: group.clone(),
                    policies: Policies::default(),
                    members: BTreeSet::new(),
                },
            );
            Ok(group)
        })
    }

    fn get_group(&self, name: &str) -> Result<Group> {
        self.call("GetGroup", |acct| Ok(acct.group(name)?.group.clone()))
    }

    fn update_group(&self, name: &str, new_path: &str) -> Result<()> {
        self.call("UpdateGroup", |acct| {
            let path = normalize_path(new_path);
            let arn = acct.arn(kind::GROUP, &path, name);
            let record = acct.group(name)?;
            record.group.path = path;
            record.group.arn = arn;
            Ok(())
        })
    }

    fn delete_group(&self, name: &str) -> Result<()> {
        self.call("DeleteGroup", |acct| {
            let record = acct.group(name)?;
            if !record.policies.is_empty() {
                return Err(conflict(format!("group {name} still has policies")));
            }
            if !record.members.is_empty() {
                return Err(conflict(format!("group {name} still has members")));
            }
            acct.groups.remove(name);
            Ok(())
        })
    }

    fn add_user_to_group(&self, group: &str, user: &str) -> Result<()> {
        self.call("AddUserToGroup", |acct| {
            acct.user(user)?;
            acct.group(group)?.members.insert(user.to_string());
            acct.user(user)?.groups.insert(group.to_string());
            Ok(())
        })
    }

    fn remove_user_from_group(&self, group: &str, user: &str) -> Result<()> {
        self.call("RemoveUserFromGroup", |acct| {
            acct.user(user)?;
            if !acct.group(group)?.members.remove(user) {
                return Err(Error::not_found("group membership", format!("{user} in {group}")));
            }
            acct.user(user)?.groups.remove(group);
            Ok(())
        })
    }

    fn list_group_members(&self, group: &str) -> Result<Vec<String>> {
        self.call("GetGroup", |acct| {
            Ok(acct.group(group)?.members.iter().cloned().collect())
        })
    }

    fn list_groups_for_user(&self, user: &str) -> Result<Vec<Group>> {
        self.call("ListGroupsForUser", |acct| {
            let names = acct.user(user)?.groups.clone();
            Ok(names
                .iter()
                .filter_map(|g| acct.groups.get(g).map(|r| r.group.clone()))
                .collect())
        })
    }

    fn create_role(&self, input: &NewRole) -> Result<Role> {
        self.call("CreateRole", |acct| {
            validate_name(kind::ROLE, &input.name)?;
            validate_document(&input.assume_role_policy_document)?;
            validate_tags(&input.tags)?;
            if acct.roles.contains_key(&input.name) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::ROLE,
                    name: input.name.clone(),
                });
            }
            let path = normalize_path(input.path.as_deref().unwrap_or("/"));
            let role = Role {
                name: input.name.clone(),
                role_id: acct.next_id("AROA"),
                arn: acct.arn(kind::ROLE, &path, &input.name),
                path,
                assume_role_policy_document: input.assume_role_policy_document.clone(),
                description: input.description.clone(),
                max_session_duration: input
                    .max_session_duration
                    .unwrap_or(DEFAULT_SESSION_DURATION),
                permissions_boundary: None,
                tags: sorted_tags(&input.tags),
            };
            acct.roles.insert(
                input.name.clone(),
                RoleRecord {
                    role: role.clone(),
                    policies: Policies::default(),
                },
            );
            Ok(role)
        })
    }

    fn get_role(&self, name: &str) -> Result<Role> {
        self.call("GetRole", |acct| Ok(acct.role(name)?.role.clone()))
    }

    fn update_role(
        &self,
        name: &str,
        description: Option<&str>,
        max_session_duration: Option<i64>,
    ) -> Result<()> {
        self.call("UpdateRole", |acct| {
            if let Some(duration) = max_session_duration
                && !(3600..=43200).contains(&duration)
            {
                return Err(Error::InvalidInput {
                    message: format!("max session duration {duration} outside 3600..=43200"),
                });
            }
            let role = &mut acct.role(name)?.role;
            role.description = description.map(str::to_string);
            if let Some(duration) = max_session_duration {
                role.max_session_duration = duration;
            }
            Ok(())
        })
    }

    fn update_assume_role_policy(&self, name: &str, document: &str) -> Result<()> {
        self.call("UpdateAssumeRolePolicy", |acct| {
            validate_document(document)?;
            acct.role(name)?.role.assume_role_policy_document = document.to_string();
            Ok(())
        })
    }

    fn delete_role(&self, name: &str) -> Result<()> {
        self.call("DeleteRole", |acct| {
            if !acct.role(name)?.policies.is_empty() {
                return Err(conflict(format!("role {name} still has policies")));
            }
            if acct
                .instance_profiles
                .values()
                .any(|p| p.roles.iter().any(|r| r == name))
            {
                return Err(conflict(format!("role {name} is still in an instance profile")));
            }
            acct.roles.remove(name);
            Ok(())
        })
    }

    fn put_inline_policy(
        &self,
        principal: Principal,
        name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()> {
        self.call(&principal_rpc("Put{}Policy", principal), |acct| {
            validate_name(kind::POLICY, policy_name)?;
            validate_document(document)?;
            acct.policies_of(principal, name)?
                .inline
                .insert(policy_name.to_string(), document.to_string());
            Ok(())
        })
    }

    fn get_inline_policy(
        &self,
        principal: Principal,
        name: &str,
        policy_name: &str,
    ) -> Result<String> {
        self.call(&principal_rpc("Get{}Policy", principal), |acct| {
            acct.policies_of(principal, name)?
                .inline
                .get(policy_name)
                .cloned()
                .ok_or_else(|| Error::not_found("inline policy", policy_name))
        })
    }

    fn list_inline_policies(&self, principal: Principal, name: &str) -> Result<Vec<String>> {
        self.call(&principal_rpc("List{}Policies", principal), |acct| {
            Ok(acct.policies_of(principal, name)?.inline.keys().cloned().collect())
        })
    }

    fn delete_inline_policy(
        &self,
        principal: Principal,
        name: &str,
        policy_name: &str,
    ) -> Result<()> {
        self.call(&principal_rpc("Delete{}Policy", principal), |acct| {
            acct.policies_of(principal, name)?
                .inline
                .remove(policy_name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found("inline policy", policy_name))
        })
    }

    fn attach_policy(&self, principal: Principal, name: &str, policy_arn: &str) -> Result<()> {
        self.call(&principal_rpc("Attach{}Policy", principal), |acct| {
            acct.check_policy_exists(policy_arn)?;
            acct.policies_of(principal, name)?
                .attached
                .insert(policy_arn.to_string());
            Ok(())
        })
    }

    fn detach_policy(&self, principal: Principal, name: &str, policy_arn: &str) -> Result<()> {
        self.call(&principal_rpc("Detach{}Policy", principal), |acct| {
            if acct.policies_of(principal, name)?.attached.remove(policy_arn) {
                Ok(())
            } else {
                Err(Error::not_found("policy attachment", policy_arn))
            }
        })
    }

    fn list_attached_policies(
        &self,
        principal: Principal,
        name: &str,
    ) -> Result<Vec<AttachedPolicy>> {
        self.call(&principal_rpc("ListAttached{}Policies", principal), |acct| {
            let attached = acct.policies_of(principal, name)?.attached.clone();
            Ok(attached
                .into_iter()
                .map(|policy_arn| AttachedPolicy {
                    policy_name: Arn::parse(&policy_arn)
                        .map(|a| a.name)
                        .unwrap_or_else(|_| policy_arn.clone()),
                    policy_arn,
                })
                .collect())
        })
    }

    fn put_permissions_boundary(
        &self,
        principal: Principal,
        name: &str,
        policy_arn: &str,
    ) -> Result<()> {
        self.call(&principal_rpc("Put{}PermissionsBoundary", principal), |acct| {
            acct.check_policy_exists(policy_arn)?;
            *acct.boundary_of(principal, name)? = Some(policy_arn.to_string());
            Ok(())
        })
    }

    fn delete_permissions_boundary(&self, principal: Principal, name: &str) -> Result<()> {
        self.call(&principal_rpc("Delete{}PermissionsBoundary", principal), |acct| {
            acct.boundary_of(principal, name)?
                .take()
                .map(|_| ())
                .ok_or_else(|| Error::not_found("permissions boundary", name))
        })
    }

    fn create_login_profile(
        &self,
        user: &str,
        password: &str,
        password_reset_required: bool,
    ) -> Result<LoginProfile> {
        self.call("CreateLoginProfile", |acct| {
            if password.len() < 8 {
                return Err(Error::InvalidInput {
                    message: "password does not meet the account password policy".to_string(),
                });
            }
            let record = acct.user(user)?;
            if record.login_profile.is_some() {
                return Err(Error::EntityAlreadyExists {
                    kind: "login profile",
                    name: user.to_string(),
                });
            }
            let profile = LoginProfile {
                user_name: user.to_string(),
                password_reset_required,
            };
            record.login_profile = Some(profile.clone());
            Ok(profile)
        })
    }

    fn get_login_profile(&self, user: &str) -> Result<LoginProfile> {
        self.call("GetLoginProfile", |acct| {
            acct.user(user)?
                .login_profile
                .clone()
                .ok_or_else(|| Error::not_found("login profile", user))
        })
    }

    fn update_login_profile(
        &self,
        user: &str,
        password: Option<&str>,
        password_reset_required: bool,
    ) -> Result<()> {
        self.call("UpdateLoginProfile", |acct| {
            if password.is_some_and(|p| p.len() < 8) {
                return Err(Error::InvalidInput {
                    message: "password does not meet the account password policy".to_string(),
                });
            }
            let profile = acct
                .user(user)?
                .login_profile
                .as_mut()
                .ok_or_else(|| Error::not_found("login profile", user))?;
            profile.password_reset_required = password_reset_required;
            Ok(())
        })
    }

    fn delete_login_profile(&self, user: &str) -> Result<()> {
        self.call("DeleteLoginProfile", |acct| {
            acct.user(user)?
                .login_profile
                .take()
                .map(|_| ())
                .ok_or_else(|| Error::not_found("login profile", user))
        })
    }

    fn create_policy(&self, input: &NewPolicy) -> Result<ManagedPolicy> {
        self.call("CreatePolicy", |acct| {
            validate_name(kind::POLICY, &input.name)?;
            validate_document(&input.document)?;
            validate_tags(&input.tags)?;
            let path = normalize_path(input.path.as_deref().unwrap_or("/"));
            let arn = acct.arn(kind::POLICY, &path, &input.name);
            if acct.policies.contains_key(&arn) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::POLICY,
                    name: input.name.clone(),
                });
            }
            let policy = ManagedPolicy {
                name: input.name.clone(),
                policy_id: acct.next_id("ANPA"),
                arn: arn.clone(),
                path,
                description: input.description.clone(),
                default_version_id: "v1".to_string(),
                attachment_count: 0,
                tags: sorted_tags(&input.tags),
            };
            acct.policies.insert(
                arn,
                PolicyRecord {
                    policy: policy.clone(),
                    versions: vec![PolicyVersion {
                        version_id: "v1".to_string(),
                        document: input.document.clone(),
                        is_default: true,
                    }],
                    next_version: 2,
                },
            );
            Ok(policy)
        })
    }

    fn get_policy(&self, arn: &str) -> Result<ManagedPolicy> {
        self.call("GetPolicy", |acct| {
            let count = acct.attachment_count(arn);
            let mut policy = acct.policy(arn)?.policy.clone();
            policy.attachment_count = count;
            Ok(policy)
        })
    }

    fn get_policy_version(&self, arn: &str, version_id: &str) -> Result<PolicyVersion> {
        self.call("GetPolicyVersion", |acct| {
            acct.policy(arn)?
                .versions
                .iter()
                .find(|v| v.version_id == version_id)
                .cloned()
                .ok_or_else(|| Error::not_found("policy version", version_id))
        })
    }

    fn list_policy_versions(&self, arn: &str) -> Result<Vec<PolicyVersion>> {
        self.call("ListPolicyVersions", |acct| Ok(acct.policy(arn)?.versions.clone()))
    }

    fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> Result<PolicyVersion> {
        self.call("CreatePolicyVersion", |acct| {
            validate_document(document)?;
            let record = acct.policy(arn)?;
            if record.versions.len() >= MAX_POLICY_VERSIONS {
                return Err(Error::LimitExceeded {
                    message: format!("policy {arn} already has {MAX_POLICY_VERSIONS} versions"),
                });
            }
            let version = PolicyVersion {
                version_id: format!("v{}", record.next_version),
                document: document.to_string(),
                is_default: set_as_default,
            };
            record.next_version += 1;
            if set_as_default {
                for v in &mut record.versions {
                    v.is_default = false;
                }
                record.policy.default_version_id = version.version_id.clone();
            }
            record.versions.push(version.clone());
            Ok(version)
        })
    }

    fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<()> {
        self.call("DeletePolicyVersion", |acct| {
            let record = acct.policy(arn)?;
            let index = record
                .versions
                .iter()
                .position(|v| v.version_id == version_id)
                .ok_or_else(|| Error::not_found("policy version", version_id))?;
            if record.versions[index].is_default {
                return Err(conflict(format!("{version_id} is the default version")));
            }
            record.versions.remove(index);
            Ok(())
        })
    }

    fn delete_policy(&self, arn: &str) -> Result<()> {
        self.call("DeletePolicy", |acct| {
            if acct.attachment_count(arn) > 0 {
                return Err(conflict(format!("policy {arn} is still attached")));
            }
            if acct.policy(arn)?.versions.len() > 1 {
                return Err(conflict(format!("policy {arn} still has non-default versions")));
            }
            acct.policies.remove(arn);
            Ok(())
        })
    }

    fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        self.call("CreateAccessKey", |acct| {
            if acct.user(user)?.access_keys.len() >= MAX_ACCESS_KEYS {
                return Err(Error::LimitExceeded {
                    message: format!("user {user} already has {MAX_ACCESS_KEYS} access keys"),
                });
            }
            let access_key_id = acct.next_id("AKIA");
            let secret = acct.secret();
            let key = AccessKey {
                access_key_id,
                user_name: user.to_string(),
                status: AccessKeyStatus::Active,
                secret_access_key: None,
            };
            acct.user(user)?.access_keys.push(key.clone());
            Ok(AccessKey {
                secret_access_key: Some(secret),
                ..key
            })
        })
    }

    fn list_access_keys(&self, user: &str) -> Result<Vec<AccessKey>> {
        self.call("ListAccessKeys", |acct| Ok(acct.user(user)?.access_keys.clone()))
    }

    fn update_access_key(
        &self,
        user: &str,
        access_key_id: &str,
        status: AccessKeyStatus,
    ) -> Result<()> {
        self.call("UpdateAccessKey", |acct| {
            let key = acct
                .user(user)?
                .access_keys
                .iter_mut()
                .find(|k| k.access_key_id == access_key_id)
                .ok_or_else(|| Error::not_found("access key", access_key_id))?;
            key.status = status;
            Ok(())
        })
    }

    fn delete_access_key(&self, user: &str, access_key_id: &str) -> Result<()> {
        self.call("DeleteAccessKey", |acct| {
            let keys = &mut acct.user(user)?.access_keys;
            let before = keys.len();
            keys.retain(|k| k.access_key_id != access_key_id);
            if keys.len() == before {
                return Err(Error::not_found("access key", access_key_id));
            }
            Ok(())
        })
    }

    fn create_instance_profile(&self, input: &NewInstanceProfile) -> Result<InstanceProfile> {
        self.call("CreateInstanceProfile", |acct| {
            validate_name(kind::INSTANCE_PROFILE, &input.name)?;
            validate_tags(&input.tags)?;
            if acct.instance_profiles.contains_key(&input.name) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::INSTANCE_PROFILE,
                    name: input.name.clone(),
                });
            }
            let path = normalize_path(input.path.as_deref().unwrap_or("/"));
            let profile = InstanceProfile {
                name: input.name.clone(),
                instance_profile_id: acct.next_id("AIPA"),
                arn: acct.arn(kind::INSTANCE_PROFILE, &path, &input.name),
                path,
                roles: Vec::new(),
                tags: sorted_tags(&input.tags),
            };
            acct.instance_profiles
                .insert(input.name.clone(), profile.clone());
            Ok(profile)
        })
    }

    fn get_instance_profile(&self, name: &str) -> Result<InstanceProfile> {
        self.call("GetInstanceProfile", |acct| {
            acct.instance_profiles
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found(kind::INSTANCE_PROFILE, name))
        })
    }

    fn add_role_to_instance_profile(&self, profile: &str, role: &str) -> Result<()> {
        self.call("AddRoleToInstanceProfile", |acct| {
            acct.role(role)?;
            let entry = acct
                .instance_profiles
                .get_mut(profile)
                .ok_or_else(|| Error::not_found(kind::INSTANCE_PROFILE, profile))?;
            if !entry.roles.is_empty() {
                return Err(Error::LimitExceeded {
                    message: format!("instance profile {profile} already has a role"),
                });
            }
            entry.roles.push(role.to_string());
            Ok(())
        })
    }

    fn remove_role_from_instance_profile(&self, profile: &str, role: &str) -> Result<()> {
        self.call("RemoveRoleFromInstanceProfile", |acct| {
            let entry = acct
                .instance_profiles
                .get_mut(profile)
                .ok_or_else(|| Error::not_found(kind::INSTANCE_PROFILE, profile))?;
            let before = entry.roles.len();
            entry.roles.retain(|r| r != role);
            if entry.roles.len() == before {
                return Err(Error::not_found(kind::ROLE, role));
            }
            Ok(())
        })
    }

    fn delete_instance_profile(&self, name: &str) -> Result<()> {
        self.call("DeleteInstanceProfile", |acct| {
            let entry = acct
                .instance_profiles
                .get(name)
                .ok_or_else(|| Error::not_found(kind::INSTANCE_PROFILE, name))?;
            if !entry.roles.is_empty() {
                return Err(conflict(format!("instance profile {name} still has a role")));
            }
            acct.instance_profiles.remove(name);
            Ok(())
        })
    }

    fn create_oidc_provider(&self, input: &NewOidcProvider) -> Result<OidcProvider> {
        self.call("CreateOpenIDConnectProvider", |acct| {
            validate_tags(&input.tags)?;
            let host = input
                .url
                .strip_prefix("https://")
                .ok_or_else(|| Error::InvalidInput {
                    message: format!("OIDC provider URL must use https: {}", input.url),
                })?
                .trim_end_matches('/');
            if host.is_empty() {
                return Err(Error::InvalidInput {
                    message: "OIDC provider URL has no host".to_string(),
                });
            }
            let arn = acct.arn(kind::OIDC_PROVIDER, "/", host);
            if acct.oidc_providers.contains_key(&arn) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::OIDC_PROVIDER,
                    name: host.to_string(),
                });
            }
            let mut client_ids = input.client_ids.clone();
            client_ids.sort();
            client_ids.dedup();
            let provider = OidcProvider {
                arn: arn.clone(),
                url: host.to_string(),
                client_ids,
                thumbprints: input.thumbprints.clone(),
                tags: sorted_tags(&input.tags),
            };
            acct.oidc_providers.insert(arn, provider.clone());
            Ok(provider)
        })
    }

    fn get_oidc_provider(&self, arn: &str) -> Result<OidcProvider> {
        self.call("GetOpenIDConnectProvider", |acct| {
            acct.oidc_providers
                .get(arn)
                .cloned()
                .ok_or_else(|| Error::not_found(kind::OIDC_PROVIDER, arn))
        })
    }

    fn add_client_id(&self, arn: &str, client_id: &str) -> Result<()> {
        self.call("AddClientIDToOpenIDConnectProvider", |acct| {
            let provider = acct
                .oidc_providers
                .get_mut(arn)
                .ok_or_else(|| Error::not_found(kind::OIDC_PROVIDER, arn))?;
            if !provider.client_ids.iter().any(|c| c == client_id) {
                provider.client_ids.push(client_id.to_string());
                provider.client_ids.sort();
            }
            Ok(())
        })
    }

    fn remove_client_id(&self, arn: &str, client_id: &str) -> Result<()> {
        self.call("RemoveClientIDFromOpenIDConnectProvider", |acct| {
            let provider = acct
                .oidc_providers
                .get_mut(arn)
                .ok_or_else(|| Error::not_found(kind::OIDC_PROVIDER, arn))?;
            provider.client_ids.retain(|c| c != client_id);
            Ok(())
        })
    }

    fn update_thumbprints(&self, arn: &str, thumbprints: &[String]) -> Result<()> {
        self.call("UpdateOpenIDConnectProviderThumbprint", |acct| {
            if thumbprints.iter().any(|t| t.len() != 40) {
                return Err(Error::InvalidInput {
                    message: "thumbprints must be 40 hex characters".to_string(),
                });
            }
            let provider = acct
                .oidc_providers
                .get_mut(arn)
                .ok_or_else(|| Error::not_found(kind::OIDC_PROVIDER, arn))?;
            provider.thumbprints = thumbprints.to_vec();
            Ok(())
        })
    }

    fn delete_oidc_provider(&self, arn: &str) -> Result<()> {
        self.call("DeleteOpenIDConnectProvider", |acct| {
            acct.oidc_providers
                .remove(arn)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(kind::OIDC_PROVIDER, arn))
        })
    }

    fn create_saml_provider(&self, input: &NewSamlProvider) -> Result<SamlProvider> {
        self.call("CreateSAMLProvider", |acct| {
            validate_name(kind::SAML_PROVIDER, &input.name)?;
            validate_tags(&input.tags)?;
            if !input.metadata_document.trim_start().starts_with('<') {
                return Err(Error::InvalidInput {
                    message: "SAML metadata document is not XML".to_string(),
                });
            }
            let arn = acct.arn(kind::SAML_PROVIDER, "/", &input.name);
            if acct.saml_providers.contains_key(&arn) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::SAML_PROVIDER,
                    name: input.name.clone(),
                });
            }
            let provider = SamlProvider {
                arn: arn.clone(),
                name: input.name.clone(),
                metadata_document: input.metadata_document.clone(),
                valid_until: (Utc::now() + Duration::days(365)).to_rfc3339(),
                tags: sorted_tags(&input.tags),
            };
            acct.saml_providers.insert(arn, provider.clone());
            Ok(provider)
        })
    }

    fn get_saml_provider(&self, arn: &str) -> Result<SamlProvider> {
        self.call("GetSAMLProvider", |acct| {
            acct.saml_providers
                .get(arn)
                .cloned()
                .ok_or_else(|| Error::not_found(kind::SAML_PROVIDER, arn))
        })
    }

    fn update_saml_provider(&self, arn: &str, metadata_document: &str) -> Result<SamlProvider> {
        self.call("UpdateSAMLProvider", |acct| {
            let provider = acct
                .saml_providers
                .get_mut(arn)
                .ok_or_else(|| Error::not_found(kind::SAML_PROVIDER, arn))?;
            provider.metadata_document = metadata_document.to_string();
            provider.valid_until = (Utc::now() + Duration::days(365)).to_rfc3339();
            Ok(provider.clone())
        })
    }

    fn delete_saml_provider(&self, arn: &str) -> Result<()> {
        self.call("DeleteSAMLProvider", |acct| {
            acct.saml_providers
                .remove(arn)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(kind::SAML_PROVIDER, arn))
        })
    }

    fn upload_server_certificate(
        &self,
        input: &NewServerCertificate,
    ) -> Result<ServerCertificate> {
        self.call("UploadServerCertificate", |acct| {
            validate_name(kind::SERVER_CERTIFICATE, &input.name)?;
            validate_tags(&input.tags)?;
            if !input.certificate_body.contains("BEGIN CERTIFICATE") {
                return Err(Error::InvalidInput {
                    message: "certificate body is not a PEM certificate".to_string(),
                });
            }
            if !input.private_key.contains("PRIVATE KEY") {
                return Err(Error::InvalidInput {
                    message: "private key is not a PEM key".to_string(),
                });
            }
            if acct.server_certificates.contains_key(&input.name) {
                return Err(Error::EntityAlreadyExists {
                    kind: kind::SERVER_CERTIFICATE,
                    name: input.name.clone(),
                });
            }
            let path = normalize_path(input.path.as_deref().unwrap_or("/"));
            let cert = ServerCertificate {
                name: input.name.clone(),
                server_certificate_id: acct.next_id("ASCA"),
                arn: acct.arn(kind::SERVER_CERTIFICATE, &path, &input.name),
                path,
                certificate_body: input.certificate_body.clone(),
                certificate_chain: input.certificate_chain.clone(),
                expiration: (Utc::now() + Duration::days(365)).to_rfc3339(),
                tags: sorted_tags(&input.tags),
            };
            acct.server_certificates
                .insert(input.name.clone(), cert.clone());
            Ok(cert)
        })
    }

    fn get_server_certificate(&self, name: &str) -> Result<ServerCertificate> {
        self.call("GetServerCertificate", |acct| {
            acct.server_certificates
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found(kind::SERVER_CERTIFICATE, name))
        })
    }

    fn delete_server_certificate(&self, name: &str) -> Result<()> {
        self.call("DeleteServerCertificate", |acct| {
            acct.server_certificates
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(kind::SERVER_CERTIFICATE, name))
        })
    }

    fn tag_resource(&self, target: &TagTarget, tags: &[Tag]) -> Result<()> {
        self.call(&tag_rpc("Tag", target), |acct| {
            validate_tags(tags)?;
            let existing = acct.tags_of(target)?;
            let mut merged = existing.clone();
            merged.extend(tags.iter().cloned());
            let merged = sorted_tags(&merged);
            validate_tags(&merged)?;
            *existing = merged;
            Ok(())
        })
    }

    fn untag_resource(&self, target: &TagTarget, keys: &[String]) -> Result<()> {
        self.call(&tag_rpc("Untag", target), |acct| {
            acct.tags_of(target)?.retain(|t| !keys.contains(&t.key));
            Ok(())
        })
    }

    fn list_tags(&self, target: &TagTarget) -> Result<Vec<Tag>> {
        self.call(&tag_rpc("List", target), |acct| Ok(acct.tags_of(target)?.clone()))
    }
}
