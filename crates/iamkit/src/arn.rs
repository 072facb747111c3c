//! ARN parsing and identity extraction.
//!
//! IAM ARNs look like `arn:aws:iam::123456789012:group/division/team-a`.
//! The resource segment starts with a kind discriminator, followed by an
//! optional path and the entity name. Federation providers are the
//! exception: everything after the discriminator is the name
//! (`oidc-provider/token.actions.githubusercontent.com`).

use crate::error::{Error, Result};
use std::fmt;

/// Resource kind discriminators used in IAM ARNs.
pub mod kind {
    /// IAM user
    pub const USER: &str = "user";
    /// IAM group
    pub const GROUP: &str = "group";
    /// IAM role
    pub const ROLE: &str = "role";
    /// Managed policy
    pub const POLICY: &str = "policy";
    /// Instance profile
    pub const INSTANCE_PROFILE: &str = "instance-profile";
    /// OIDC identity provider
    pub const OIDC_PROVIDER: &str = "oidc-provider";
    /// SAML identity provider
    pub const SAML_PROVIDER: &str = "saml-provider";
    /// Server certificate
    pub const SERVER_CERTIFICATE: &str = "server-certificate";
}

/// A parsed IAM ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    /// Partition (`aws`, `aws-cn`, `aws-us-gov`)
    pub partition: String,
    /// Account ID (`aws` for AWS-managed policies)
    pub account: String,
    /// Kind discriminator (see [`kind`])
    pub kind: String,
    /// Path, always starting and ending with `/`
    pub path: String,
    /// Entity name
    pub name: String,
}

impl Arn {
    /// Parse an IAM ARN, rejecting anything malformed.
    pub fn parse(locator: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidArn {
            arn: locator.to_string(),
            reason,
        };

        if locator.trim().is_empty() {
            return Err(invalid("empty locator"));
        }

        let segments: Vec<&str> = locator.splitn(6, ':').collect();
        if segments.len() != 6 {
            return Err(invalid("expected 6 ':'-separated segments"));
        }
        if segments[0] != "arn" {
            return Err(invalid("missing 'arn' prefix"));
        }
        if segments[1].is_empty() {
            return Err(invalid("missing partition"));
        }
        if segments[2] != "iam" {
            return Err(invalid("not an IAM ARN"));
        }
        if segments[4].is_empty() {
            return Err(invalid("missing account"));
        }

        let resource = segments[5];
        let (kind, rest) = resource
            .split_once('/')
            .ok_or_else(|| invalid("resource segment has no name"))?;
        if kind.is_empty() {
            return Err(invalid("missing resource kind"));
        }

        let (path, name) = if is_federation(kind) {
            ("/".to_string(), rest.to_string())
        } else {
            match rest.rsplit_once('/') {
                Some((path, name)) => (format!("/{path}/"), name.to_string()),
                None => ("/".to_string(), rest.to_string()),
            }
        };
        if name.is_empty() {
            return Err(invalid("empty resource name"));
        }

        Ok(Self {
            partition: segments[1].to_string(),
            account: segments[4].to_string(),
            kind: kind.to_string(),
            path,
            name,
        })
    }

    /// Build an ARN from its parts. `path` defaults to `/`.
    pub fn build(partition: &str, account: &str, kind: &str, path: &str, name: &str) -> String {
        if is_federation(kind) {
            return format!("arn:{partition}:iam::{account}:{kind}/{name}");
        }
        let path = normalize_path(path);
        format!("arn:{partition}:iam::{account}:{kind}{path}{name}")
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            Arn::build(&self.partition, &self.account, &self.kind, &self.path, &self.name)
        )
    }
}

fn is_federation(kind: &str) -> bool {
    kind == kind::OIDC_PROVIDER || kind == kind::SAML_PROVIDER
}

/// Normalize an IAM path to start and end with `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Extract the entity name from an ARN of the expected kind.
///
/// Fails rather than guessing: a malformed ARN, an empty name or an ARN of
/// another kind (a user ARN where a group is required) are all errors.
pub fn extract_name(locator: &str, expected_kind: &str) -> Result<String> {
    let arn = Arn::parse(locator)?;
    if arn.kind != expected_kind {
        return Err(Error::KindMismatch {
            arn: locator.to_string(),
            expected: expected_kind.to_string(),
            found: arn.kind,
        });
    }
    Ok(arn.name)
}

/// Accept either a bare name or a full ARN and return the bare name.
///
/// Used for fields that reference other resources, e.g. the role of an
/// instance profile or the groups of a user.
pub fn resolve_name(reference: &str, expected_kind: &str) -> Result<String> {
    let reference = reference.trim();
    if reference.starts_with("arn:") {
        return extract_name(reference, expected_kind);
    }
    if reference.is_empty() {
        return Err(Error::InvalidArn {
            arn: reference.to_string(),
            reason: "empty reference",
        });
    }
    if reference.contains('/') || reference.contains(':') {
        return Err(Error::InvalidArn {
            arn: reference.to_string(),
            reason: "neither a bare name nor an ARN",
        });
    }
    Ok(reference.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_group_name() {
        let arn = "arn:aws:iam::123456789012:group/team-a";
        assert_eq!(extract_name(arn, kind::GROUP).unwrap(), "team-a");
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let arn = "arn:aws:iam::123456789012:group/team-a";
        let err = extract_name(arn, kind::USER).unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch { ref expected, ref found, .. } if expected == "user" && found == "group"
        ));
    }

    #[test]
    fn test_path_is_not_part_of_name() {
        let arn = Arn::parse("arn:aws:iam::123456789012:role/service/ci/deployer").unwrap();
        assert_eq!(arn.kind, "role");
        assert_eq!(arn.path, "/service/ci/");
        assert_eq!(arn.name, "deployer");
        assert_eq!(arn.to_string(), "arn:aws:iam::123456789012:role/service/ci/deployer");
    }

    #[test]
    fn test_federation_name_keeps_slashes() {
        let locator = "arn:aws:iam::123456789012:oidc-provider/example.com/auth/v2";
        assert_eq!(
            extract_name(locator, kind::OIDC_PROVIDER).unwrap(),
            "example.com/auth/v2"
        );
    }

    #[test]
    fn test_aws_managed_policy() {
        let arn = Arn::parse("arn:aws:iam::aws:policy/AdministratorAccess").unwrap();
        assert_eq!(arn.account, "aws");
        assert_eq!(arn.name, "AdministratorAccess");
    }

    #[test]
    fn test_malformed_locators() {
        for bad in [
            "",
            "team-a",
            "arn:aws:iam:123456789012:group/team-a",
            "arn:aws:s3:::bucket/key",
            "arn:aws:iam::123456789012:group",
            "arn:aws:iam::123456789012:group/",
            "arn:aws:iam::123456789012:group/path/",
            "arn::iam::123456789012:group/team-a",
            "urn:aws:iam::123456789012:group/team-a",
            "arn:aws:iam:::group/team-a",
        ] {
            let err = extract_name(bad, kind::GROUP).unwrap_err();
            assert!(matches!(err, Error::InvalidArn { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn test_resolve_name_accepts_both_forms() {
        assert_eq!(resolve_name("deployer", kind::ROLE).unwrap(), "deployer");
        assert_eq!(
            resolve_name("arn:aws:iam::123456789012:role/ci/deployer", kind::ROLE).unwrap(),
            "deployer"
        );
        assert!(resolve_name("arn:aws:iam::123456789012:user/deployer", kind::ROLE).is_err());
        assert!(resolve_name("ci/deployer", kind::ROLE).is_err());
        assert!(resolve_name("  ", kind::ROLE).is_err());
    }

    #[test]
    fn test_build_normalizes_path() {
        assert_eq!(
            Arn::build("aws", "123456789012", kind::USER, "eng", "alice"),
            "arn:aws:iam::123456789012:user/eng/alice"
        );
        assert_eq!(
            Arn::build("aws", "123456789012", kind::USER, "", "alice"),
            "arn:aws:iam::123456789012:user/alice"
        );
        assert_eq!(
            Arn::build("aws", "123456789012", kind::SAML_PROVIDER, "/ignored/", "okta"),
            "arn:aws:iam::123456789012:saml-provider/okta"
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a/b"), "/a/b/");
        assert_eq!(normalize_path("/a/"), "/a/");
    }
}
