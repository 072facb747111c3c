//! Backend abstraction for IAM operations.
//!
//! The [`Backend`] trait is the remote-service boundary: one method per
//! named RPC. Implementations:
//! - [`memory::MemoryBackend`], an in-process account emulator with the
//!   same referential constraints as the real service
//! - an HTTP client for the real service (not part of this crate)
//!
//! Every call is a single request/response. No retries, no pagination
//! beyond a single page, no caching.

pub mod memory;

use crate::error::Result;
use crate::types::{
    AccessKey, AccessKeyStatus, AttachedPolicy, CallerIdentity, Group, InstanceProfile, LoginProfile,
    ManagedPolicy, NewInstanceProfile, NewOidcProvider, NewPolicy, NewRole, NewSamlProvider,
    NewServerCertificate, NewUser, OidcProvider, PolicyVersion, Principal, Role, SamlProvider,
    ServerCertificate, Tag, TagTarget, User,
};

/// Backend trait for IAM operations.
pub trait Backend: Send + Sync {
    /// GetCallerIdentity
    fn get_caller_identity(&self) -> Result<CallerIdentity>;

    // =========================================================================
    // Users
    // =========================================================================

    /// CreateUser
    fn create_user(&self, input: &NewUser) -> Result<User>;

    /// GetUser
    fn get_user(&self, name: &str) -> Result<User>;

    /// UpdateUser (path only; renames are recreates)
    fn update_user(&self, name: &str, new_path: &str) -> Result<()>;

    /// DeleteUser
    fn delete_user(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Groups and memberships
    // =========================================================================

    /// CreateGroup
    fn create_group(&self, name: &str, path: Option<&str>) -> Result<Group>;

    /// GetGroup
    fn get_group(&self, name: &str) -> Result<Group>;

    /// UpdateGroup (path only)
    fn update_group(&self, name: &str, new_path: &str) -> Result<()>;

    /// DeleteGroup
    fn delete_group(&self, name: &str) -> Result<()>;

    /// AddUserToGroup
    fn add_user_to_group(&self, group: &str, user: &str) -> Result<()>;

    /// RemoveUserFromGroup
    fn remove_user_from_group(&self, group: &str, user: &str) -> Result<()>;

    /// GetGroup (member user names)
    fn list_group_members(&self, group: &str) -> Result<Vec<String>>;

    /// ListGroupsForUser
    fn list_groups_for_user(&self, user: &str) -> Result<Vec<Group>>;

    // =========================================================================
    // Roles
    // =========================================================================

    /// CreateRole
    fn create_role(&self, input: &NewRole) -> Result<Role>;

    /// GetRole
    fn get_role(&self, name: &str) -> Result<Role>;

    /// UpdateRole (description and max session duration)
    fn update_role(
        &self,
        name: &str,
        description: Option<&str>,
        max_session_duration: Option<i64>,
    ) -> Result<()>;

    /// UpdateAssumeRolePolicy
    fn update_assume_role_policy(&self, name: &str, document: &str) -> Result<()>;

    /// DeleteRole
    fn delete_role(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Inline policies (Put/Get/List/Delete{User,Group,Role}Policy)
    // =========================================================================

    /// Put{Principal}Policy
    fn put_inline_policy(
        &self,
        principal: Principal,
        name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()>;

    /// Get{Principal}Policy
    fn get_inline_policy(&self, principal: Principal, name: &str, policy_name: &str)
    -> Result<String>;

    /// List{Principal}Policies
    fn list_inline_policies(&self, principal: Principal, name: &str) -> Result<Vec<String>>;

    /// Delete{Principal}Policy
    fn delete_inline_policy(&self, principal: Principal, name: &str, policy_name: &str)
    -> Result<()>;

    // =========================================================================
    // Managed-policy attachments and permissions boundaries
    // =========================================================================

    /// Attach{Principal}Policy
    fn attach_policy(&self, principal: Principal, name: &str, policy_arn: &str) -> Result<()>;

    /// Detach{Principal}Policy
    fn detach_policy(&self, principal: Principal, name: &str, policy_arn: &str) -> Result<()>;

    /// ListAttached{Principal}Policies
    fn list_attached_policies(&self, principal: Principal, name: &str)
    -> Result<Vec<AttachedPolicy>>;

    /// Put{User,Role}PermissionsBoundary
    fn put_permissions_boundary(
        &self,
        principal: Principal,
        name: &str,
        policy_arn: &str,
    ) -> Result<()>;

    /// Delete{User,Role}PermissionsBoundary
    fn delete_permissions_boundary(&self, principal: Principal, name: &str) -> Result<()>;

    // =========================================================================
    // Login profiles
    // =========================================================================

    /// CreateLoginProfile
    fn create_login_profile(
        &self,
        user: &str,
        password: &str,
        password_reset_required: bool,
    ) -> Result<LoginProfile>;

    /// GetLoginProfile
    fn get_login_profile(&self, user: &str) -> Result<LoginProfile>;

    /// UpdateLoginProfile
    fn update_login_profile(
        &self,
        user: &str,
        password: Option<&str>,
        password_reset_required: bool,
    ) -> Result<()>;

    /// DeleteLoginProfile
    fn delete_login_profile(&self, user: &str) -> Result<()>;

    // =========================================================================
    // Managed policies
    // =========================================================================

    /// CreatePolicy
    fn create_policy(&self, input: &NewPolicy) -> Result<ManagedPolicy>;

    /// GetPolicy
    fn get_policy(&self, arn: &str) -> Result<ManagedPolicy>;

    /// GetPolicyVersion
    fn get_policy_version(&self, arn: &str, version_id: &str) -> Result<PolicyVersion>;

    /// ListPolicyVersions
    fn list_policy_versions(&self, arn: &str) -> Result<Vec<PolicyVersion>>;

    /// CreatePolicyVersion
    fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> Result<PolicyVersion>;

    /// DeletePolicyVersion (never the default version)
    fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<()>;

    /// DeletePolicy
    fn delete_policy(&self, arn: &str) -> Result<()>;

    // =========================================================================
    // Access keys
    // =========================================================================

    /// CreateAccessKey
    fn create_access_key(&self, user: &str) -> Result<AccessKey>;

    /// ListAccessKeys
    fn list_access_keys(&self, user: &str) -> Result<Vec<AccessKey>>;

    /// UpdateAccessKey
    fn update_access_key(&self, user: &str, access_key_id: &str, status: AccessKeyStatus)
    -> Result<()>;

    /// DeleteAccessKey
    fn delete_access_key(&self, user: &str, access_key_id: &str) -> Result<()>;

    // =========================================================================
    // Instance profiles
    // =========================================================================

    /// CreateInstanceProfile
    fn create_instance_profile(&self, input: &NewInstanceProfile) -> Result<InstanceProfile>;

    /// GetInstanceProfile
    fn get_instance_profile(&self, name: &str) -> Result<InstanceProfile>;

    /// AddRoleToInstanceProfile
    fn add_role_to_instance_profile(&self, profile: &str, role: &str) -> Result<()>;

    /// RemoveRoleFromInstanceProfile
    fn remove_role_from_instance_profile(&self, profile: &str, role: &str) -> Result<()>;

    /// DeleteInstanceProfile
    fn delete_instance_profile(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Federation providers
    // =========================================================================

    /// CreateOpenIDConnectProvider
    fn create_oidc_provider(&self, input: &NewOidcProvider) -> Result<OidcProvider>;

    /// GetOpenIDConnectProvider
    fn get_oidc_provider(&self, arn: &str) -> Result<OidcProvider>;

    /// AddClientIDToOpenIDConnectProvider
    fn add_client_id(&self, arn: &str, client_id: &str) -> Result<()>;

    /// RemoveClientIDFromOpenIDConnectProvider
    fn remove_client_id(&self, arn: &str, client_id: &str) -> Result<()>;

    /// UpdateOpenIDConnectProviderThumbprint (replaces the whole list)
    fn update_thumbprints(&self, arn: &str, thumbprints: &[String]) -> Result<()>;

    /// DeleteOpenIDConnectProvider
    fn delete_oidc_provider(&self, arn: &str) -> Result<()>;

    /// CreateSAMLProvider
    fn create_saml_provider(&self, input: &NewSamlProvider) -> Result<SamlProvider>;

    /// GetSAMLProvider
    fn get_saml_provider(&self, arn: &str) -> Result<SamlProvider>;

    /// UpdateSAMLProvider
    fn update_saml_provider(&self, arn: &str, metadata_document: &str) -> Result<SamlProvider>;

    /// DeleteSAMLProvider
    fn delete_saml_provider(&self, arn: &str) -> Result<()>;

    // =========================================================================
    // Server certificates
    // =========================================================================

    /// UploadServerCertificate
    fn upload_server_certificate(&self, input: &NewServerCertificate)
    -> Result<ServerCertificate>;

    /// GetServerCertificate
    fn get_server_certificate(&self, name: &str) -> Result<ServerCertificate>;

    /// DeleteServerCertificate
    fn delete_server_certificate(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Tags (Tag/Untag/List{Kind}Tags)
    // =========================================================================

    /// Tag{Kind}
    fn tag_resource(&self, target: &TagTarget, tags: &[Tag]) -> Result<()>;

    /// Untag{Kind}
    fn untag_resource(&self, target: &TagTarget, keys: &[String]) -> Result<()>;

    /// List{Kind}Tags
    fn list_tags(&self, target: &TagTarget) -> Result<Vec<Tag>>;
}
