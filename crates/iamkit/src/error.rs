//! Error types for IAM operations.
//!
//! Errors are categorized so callers can tell a benign "already gone" from
//! a real failure. Teardown steps that tolerate absence match on
//! [`Error::is_not_found`]; everything else propagates.

use thiserror::Error;

/// Categories of IAM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The entity does not exist
    NotFound,
    /// An entity with the same name already exists
    AlreadyExists,
    /// The entity is still referenced (attached policies, members, roles)
    Conflict,
    /// Request rejected as malformed (bad ARN, bad document, bad name)
    Validation,
    /// Account quota reached (policy versions, keys per user)
    LimitExceeded,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error can be safely ignored during teardown.
    pub fn is_ignorable_on_delete(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Entity not found",
            Self::AlreadyExists => "Entity already exists",
            Self::Conflict => "Entity still in use",
            Self::Validation => "Invalid request",
            Self::LimitExceeded => "Limit exceeded",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "The entity was removed outside this tool; re-read its state",
            Self::AlreadyExists => "Import the existing entity or choose another name",
            Self::Conflict => "Detach or remove the dependent entities first",
            Self::Validation => "Check names, ARNs and policy documents in the configuration",
            Self::LimitExceeded => "Delete unused versions or keys and try again",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during IAM operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced entity does not exist
    #[error("NoSuchEntity: {kind} {name} does not exist")]
    NoSuchEntity {
        /// Entity kind (user, group, role, ...)
        kind: &'static str,
        /// Name or ARN that was looked up
        name: String,
    },

    /// An entity with this name already exists
    #[error("EntityAlreadyExists: {kind} {name} already exists")]
    EntityAlreadyExists {
        /// Entity kind
        kind: &'static str,
        /// Conflicting name
        name: String,
    },

    /// The entity cannot be deleted while it is referenced
    #[error("DeleteConflict: {message}")]
    DeleteConflict {
        /// What still references the entity
        message: String,
    },

    /// An account quota was reached
    #[error("LimitExceeded: {message}")]
    LimitExceeded {
        /// Which limit was hit
        message: String,
    },

    /// Malformed request parameter
    #[error("InvalidInput: {message}")]
    InvalidInput {
        /// Description of the problem
        message: String,
    },

    /// Policy document is not valid JSON
    #[error("MalformedPolicyDocument: {message}")]
    MalformedPolicyDocument {
        /// Parser message
        message: String,
    },

    /// A locator could not be parsed as an IAM ARN
    #[error("invalid ARN '{arn}': {reason}")]
    InvalidArn {
        /// The rejected locator
        arn: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// An ARN names a different resource kind than required
    #[error("ARN '{arn}' is a {found} ARN, expected {expected}")]
    KindMismatch {
        /// The rejected locator
        arn: String,
        /// Kind the caller required
        expected: String,
        /// Kind found in the ARN
        found: String,
    },

    /// Remote-side failure
    #[error("ServiceFailure: {message}")]
    ServiceFailure {
        /// Error message reported by the service
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NoSuchEntity { .. } => ErrorCategory::NotFound,
            Error::EntityAlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Error::DeleteConflict { .. } => ErrorCategory::Conflict,
            Error::LimitExceeded { .. } => ErrorCategory::LimitExceeded,
            Error::InvalidInput { .. }
            | Error::MalformedPolicyDocument { .. }
            | Error::InvalidArn { .. }
            | Error::KindMismatch { .. } => ErrorCategory::Validation,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether the remote reported the entity as absent.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Shorthand for a [`Error::NoSuchEntity`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NoSuchEntity {
            kind,
            name: name.into(),
        }
    }

    /// Create an error from a remote error code and message.
    ///
    /// Codes are the service's error identifiers (`NoSuchEntity`,
    /// `DeleteConflict`, ...); unknown codes become [`Error::ServiceFailure`].
    pub fn from_code(code: &str, message: &str) -> Self {
        let message = message.trim().to_string();
        match code {
            "NoSuchEntity" | "NoSuchEntityException" => Error::NoSuchEntity {
                kind: "entity",
                name: message,
            },
            "EntityAlreadyExists" | "EntityAlreadyExistsException" => Error::EntityAlreadyExists {
                kind: "entity",
                name: message,
            },
            "DeleteConflict" | "DeleteConflictException" => Error::DeleteConflict { message },
            "LimitExceeded" | "LimitExceededException" => Error::LimitExceeded { message },
            "MalformedPolicyDocument" | "MalformedPolicyDocumentException" => {
                Error::MalformedPolicyDocument { message }
            }
            "InvalidInput" | "ValidationError" | "InvalidInputException" => {
                Error::InvalidInput { message }
            }
            _ => Error::ServiceFailure {
                message: format!("{code}: {message}"),
            },
        }
    }
}

/// Result type for IAM operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_not_found() {
        let err = Error::not_found("user", "alice");
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.is_not_found());
        assert!(err.category().is_ignorable_on_delete());
        assert_eq!(err.to_string(), "NoSuchEntity: user alice does not exist");
    }

    #[test]
    fn test_identity_errors_are_validation() {
        let err = Error::KindMismatch {
            arn: "arn:aws:iam::123456789012:user/alice".into(),
            expected: "group".into(),
            found: "user".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_from_code() {
        assert!(Error::from_code("NoSuchEntity", "user bob").is_not_found());
        assert_eq!(
            Error::from_code("DeleteConflict", "must detach policies").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            Error::from_code("LimitExceededException", "5 versions").category(),
            ErrorCategory::LimitExceeded
        );
        assert_eq!(
            Error::from_code("MalformedPolicyDocument", "bad").category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_from_code_unknown() {
        let err = Error::from_code("Throttling", " Rate exceeded ");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "ServiceFailure: Throttling: Rate exceeded");
    }

    #[test]
    fn test_category_advice() {
        assert_eq!(ErrorCategory::Conflict.description(), "Entity still in use");
        assert!(ErrorCategory::NotFound.advice().contains("re-read"));
    }
}
