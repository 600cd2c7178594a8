//! Error types for the policy compiler and evaluator

use thiserror::Error;

use crate::hierarchy::HierarchyError;

/// Policy compilation and evaluation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    /// Malformed hierarchy or schema (cycles, duplicate bit assignment, dangling references)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Expression does not type-check against the declared concepts
    #[error("Type inference failed for `{expression}` ({field}): {message}")]
    TypeInference {
        /// Rendering of the offending expression
        expression: String,
        /// The property/receiver/operand that failed
        field: String,
        /// What went wrong
        message: String,
    },

    /// Evaluator called with an identifier the compiled schema does not know
    #[error("Usage error: {0}")]
    Usage(String),
}

impl PolicyError {
    pub(crate) fn type_inference(
        expression: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeInference {
            expression: expression.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<HierarchyError> for PolicyError {
    fn from(err: HierarchyError) -> Self {
        PolicyError::Configuration(err.to_string())
    }
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
