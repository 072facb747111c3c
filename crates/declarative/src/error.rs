//! Error types for declarative reconciliation.

use thiserror::Error;

/// Errors raised by the config tree, shared context and pipeline runner.
///
/// Field errors are validation errors: they are raised before any remote
/// call is made and are always fatal to the current lifecycle invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is absent from the configuration tree
    #[error("required field '{0}' is missing")]
    MissingField(String),

    /// A field holds a value of the wrong shape
    #[error("field '{path}' must be {expected}")]
    TypeMismatch {
        /// Dotted path of the offending field
        path: String,
        /// Human-readable description of the expected shape
        expected: &'static str,
    },

    /// A pipeline step needed a value an earlier step never produced
    #[error("shared context has no value for '{0}'")]
    MissingContext(String),

    /// The caller cancelled the run before the named step
    #[error("cancelled before '{0}'")]
    Cancelled(String),

    /// A pipeline ran but no operation was applicable
    #[error("no updates were made")]
    NoChanges,
}

impl Error {
    /// Whether this error was raised by the validation layer.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::TypeMismatch { .. })
    }
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
