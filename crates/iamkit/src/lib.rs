//! # iamkit
//!
//! Typed boundary to an IAM service.
//!
//! This crate provides:
//! - The [`Backend`] trait, one method per named RPC
//! - ARN parsing, building and identity extraction
//! - Categorized errors so teardown code can tolerate "already gone"
//! - [`MemoryBackend`], an in-process account with the same referential
//!   constraints as the real service
//!
//! ## Example
//!
//! ```
//! use iamkit::{Backend, MemoryBackend, Principal};
//!
//! let backend = MemoryBackend::new("123456789012", "aws");
//! let group = backend.create_group("admins", None).unwrap();
//! assert_eq!(group.arn, "arn:aws:iam::123456789012:group/admins");
//!
//! let name = iamkit::arn::extract_name(&group.arn, iamkit::arn::kind::GROUP).unwrap();
//! assert!(backend.list_inline_policies(Principal::Group, &name).unwrap().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arn;
pub mod backend;
pub mod error;
pub mod types;

// Re-export main types at crate root
pub use arn::Arn;
pub use backend::Backend;
pub use backend::memory::{Account, MemoryBackend};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    AccessKey, AccessKeyStatus, AttachedPolicy, CallerIdentity, Group, InstanceProfile, LoginProfile,
    ManagedPolicy, NewInstanceProfile, NewOidcProvider, NewPolicy, NewRole, NewSamlProvider,
    NewServerCertificate, NewUser, OidcProvider, PolicyVersion, Principal, Role, SamlProvider,
    ServerCertificate, Tag, TagTarget, User,
};
