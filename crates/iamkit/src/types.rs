//! Core types for IAM entities and requests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value (may be empty)
    pub value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The account and partition the backend acts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Account ID used in ARNs
    pub account_id: String,
    /// Partition used in ARNs
    pub partition: String,
}

/// An identity that can hold inline and managed policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principal {
    /// IAM user
    User,
    /// IAM group
    Group,
    /// IAM role
    Role,
}

impl Principal {
    /// ARN kind discriminator for this principal.
    pub fn kind(&self) -> &'static str {
        match self {
            Principal::User => crate::arn::kind::USER,
            Principal::Group => crate::arn::kind::GROUP,
            Principal::Role => crate::arn::kind::ROLE,
        }
    }

    /// Capitalized form used in RPC names (`PutUserPolicy`).
    pub fn noun(&self) -> &'static str {
        match self {
            Principal::User => "User",
            Principal::Group => "Group",
            Principal::Role => "Role",
        }
    }

    /// Whether this principal supports a permissions boundary.
    pub fn supports_boundary(&self) -> bool {
        !matches!(self, Principal::Group)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// A taggable entity, addressed the way the tagging calls address it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagTarget {
    /// User by name
    User(String),
    /// Role by name
    Role(String),
    /// Managed policy by ARN
    Policy(String),
    /// Instance profile by name
    InstanceProfile(String),
    /// OIDC provider by ARN
    OidcProvider(String),
    /// SAML provider by ARN
    SamlProvider(String),
    /// Server certificate by name
    ServerCertificate(String),
}

impl TagTarget {
    /// The name or ARN that identifies the target.
    pub fn id(&self) -> &str {
        match self {
            TagTarget::User(id)
            | TagTarget::Role(id)
            | TagTarget::Policy(id)
            | TagTarget::InstanceProfile(id)
            | TagTarget::OidcProvider(id)
            | TagTarget::SamlProvider(id)
            | TagTarget::ServerCertificate(id) => id,
        }
    }

    /// ARN kind discriminator of the target.
    pub fn kind(&self) -> &'static str {
        use crate::arn::kind;
        match self {
            TagTarget::User(_) => kind::USER,
            TagTarget::Role(_) => kind::ROLE,
            TagTarget::Policy(_) => kind::POLICY,
            TagTarget::InstanceProfile(_) => kind::INSTANCE_PROFILE,
            TagTarget::OidcProvider(_) => kind::OIDC_PROVIDER,
            TagTarget::SamlProvider(_) => kind::SAML_PROVIDER,
            TagTarget::ServerCertificate(_) => kind::SERVER_CERTIFICATE,
        }
    }
}

impl fmt::Display for TagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// An IAM user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User name
    pub name: String,
    /// Stable unique ID
    pub user_id: String,
    /// User ARN
    pub arn: String,
    /// IAM path
    pub path: String,
    /// ARN of the permissions boundary policy
    pub permissions_boundary: Option<String>,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// User name
    pub name: String,
    /// IAM path (defaults to `/`)
    pub path: Option<String>,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// An IAM group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name
    pub name: String,
    /// Stable unique ID
    pub group_id: String,
    /// Group ARN
    pub arn: String,
    /// IAM path
    pub path: String,
}

/// An IAM role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name
    pub name: String,
    /// Stable unique ID
    pub role_id: String,
    /// Role ARN
    pub arn: String,
    /// IAM path
    pub path: String,
    /// Trust policy
    pub assume_role_policy_document: String,
    /// Free-form description
    pub description: Option<String>,
    /// Maximum session duration in seconds
    pub max_session_duration: i64,
    /// ARN of the permissions boundary policy
    pub permissions_boundary: Option<String>,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating a role.
#[derive(Debug, Clone, Default)]
pub struct NewRole {
    /// Role name
    pub name: String,
    /// IAM path (defaults to `/`)
    pub path: Option<String>,
    /// Trust policy
    pub assume_role_policy_document: String,
    /// Free-form description
    pub description: Option<String>,
    /// Maximum session duration in seconds (defaults to 3600)
    pub max_session_duration: Option<i64>,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// A customer-managed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedPolicy {
    /// Policy name
    pub name: String,
    /// Stable unique ID
    pub policy_id: String,
    /// Policy ARN
    pub arn: String,
    /// IAM path
    pub path: String,
    /// Description (immutable after creation)
    pub description: Option<String>,
    /// ID of the default version
    pub default_version_id: String,
    /// Number of principals the policy is attached to
    pub attachment_count: usize,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating a managed policy.
#[derive(Debug, Clone, Default)]
pub struct NewPolicy {
    /// Policy name
    pub name: String,
    /// IAM path (defaults to `/`)
    pub path: Option<String>,
    /// Policy document
    pub document: String,
    /// Description
    pub description: Option<String>,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// One version of a managed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// Version ID (`v1`, `v2`, ...)
    pub version_id: String,
    /// Policy document
    pub document: String,
    /// Whether this is the default version
    pub is_default: bool,
}

impl PolicyVersion {
    /// Numeric part of the version ID, used to find the oldest version.
    pub fn ordinal(&self) -> u64 {
        self.version_id
            .trim_start_matches('v')
            .parse()
            .unwrap_or(u64::MAX)
    }
}

/// A managed policy attached to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedPolicy {
    /// Policy name
    pub policy_name: String,
    /// Policy ARN
    pub policy_arn: String,
}

/// Console password settings of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginProfile {
    /// User name
    pub user_name: String,
    /// Whether the user must reset the password at next sign-in
    pub password_reset_required: bool,
}

/// Status of an access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessKeyStatus {
    /// Usable
    #[default]
    Active,
    /// Disabled
    Inactive,
}

impl AccessKeyStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKeyStatus::Active => "Active",
            AccessKeyStatus::Inactive => "Inactive",
        }
    }

    /// Parse a status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(AccessKeyStatus::Active),
            "Inactive" => Some(AccessKeyStatus::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for AccessKeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An access key of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    /// Access key ID
    pub access_key_id: String,
    /// Owning user
    pub user_name: String,
    /// Status
    pub status: AccessKeyStatus,
    /// Secret, only returned by the create call
    pub secret_access_key: Option<String>,
}

/// An instance profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProfile {
    /// Profile name
    pub name: String,
    /// Stable unique ID
    pub instance_profile_id: String,
    /// Profile ARN
    pub arn: String,
    /// IAM path
    pub path: String,
    /// Names of the roles in the profile (at most one)
    pub roles: Vec<String>,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating an instance profile.
#[derive(Debug, Clone, Default)]
pub struct NewInstanceProfile {
    /// Profile name
    pub name: String,
    /// IAM path (defaults to `/`)
    pub path: Option<String>,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// An OpenID Connect identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcProvider {
    /// Provider ARN
    pub arn: String,
    /// Issuer URL
    pub url: String,
    /// Audiences
    pub client_ids: Vec<String>,
    /// Server certificate thumbprints
    pub thumbprints: Vec<String>,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating an OIDC provider.
#[derive(Debug, Clone, Default)]
pub struct NewOidcProvider {
    /// Issuer URL
    pub url: String,
    /// Audiences
    pub client_ids: Vec<String>,
    /// Server certificate thumbprints
    pub thumbprints: Vec<String>,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// A SAML identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlProvider {
    /// Provider ARN
    pub arn: String,
    /// Provider name
    pub name: String,
    /// SAML metadata XML
    pub metadata_document: String,
    /// RFC 3339 validity end
    pub valid_until: String,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for creating a SAML provider.
#[derive(Debug, Clone, Default)]
pub struct NewSamlProvider {
    /// Provider name
    pub name: String,
    /// SAML metadata XML
    pub metadata_document: String,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}

/// A server certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCertificate {
    /// Certificate name
    pub name: String,
    /// Stable unique ID
    pub server_certificate_id: String,
    /// Certificate ARN
    pub arn: String,
    /// IAM path
    pub path: String,
    /// PEM body
    pub certificate_body: String,
    /// PEM chain
    pub certificate_chain: Option<String>,
    /// RFC 3339 expiry
    pub expiration: String,
    /// Tags
    pub tags: Vec<Tag>,
}

/// Parameters for uploading a server certificate.
#[derive(Debug, Clone, Default)]
pub struct NewServerCertificate {
    /// Certificate name
    pub name: String,
    /// IAM path (defaults to `/`)
    pub path: Option<String>,
    /// PEM body
    pub certificate_body: String,
    /// PEM chain
    pub certificate_chain: Option<String>,
    /// PEM private key (never returned)
    pub private_key: String,
    /// Tags applied at creation
    pub tags: Vec<Tag>,
}
