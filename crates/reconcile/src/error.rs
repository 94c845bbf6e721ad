//! Error types for reconciliation operations.
//!
//! Errors are categorized so callers can tell apart mistakes in the request
//! (fixable by correcting input), missing referenced entities, conflicting
//! edits, and failures reported by the external system. Validation and
//! conflict errors are always raised before any mutation is attempted.

use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or contradictory input, detected before any mutation
    Validation,
    /// A referenced entity does not exist
    NotFound,
    /// An edit that cannot be applied to the current state
    Conflict,
    /// The external administrative system rejected or failed a call
    Backend,
}

impl ErrorCategory {
    /// Whether correcting the request is enough to resolve this error.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Validation | Self::Conflict)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid request options",
            Self::NotFound => "Referenced entity not found",
            Self::Conflict => "Edit conflicts with current state",
            Self::Backend => "External system failure",
        }
    }
}

/// Errors that can occur while reconciling an entity.
///
/// Each variant includes enough context to name the offending option
/// combination or entity.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or contradictory request options
    #[error("invalid options: {message}")]
    Validation {
        /// Description of the offending field combination
        message: String,
    },

    /// A referenced entity does not exist
    #[error("{kind} not found: {identifier}")]
    NotFound {
        /// Entity kind that was looked up
        kind: String,
        /// The GUID or name that failed to resolve
        identifier: String,
    },

    /// An edit that cannot be applied to the current state
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting edit
        message: String,
    },

    /// The external administrative system rejected or failed a call
    #[error("backend error: {message}")]
    Backend {
        /// Whatever context the failed call produced
        message: String,
    },
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for an entity kind and identifier.
    pub fn not_found(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Backend { .. } => ErrorCategory::Backend,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_input_errors() {
        assert!(ErrorCategory::Validation.is_input_error());
        assert!(ErrorCategory::Conflict.is_input_error());
        assert!(!ErrorCategory::NotFound.is_input_error());
        assert!(!ErrorCategory::Backend.is_input_error());
    }

    #[test]
    fn test_error_display_names_fields() {
        let err = Error::validation("type is required when state is present");
        assert!(err.to_string().contains("type is required"));

        let err = Error::not_found("operating system", "Windows 11 Enterprise");
        assert_eq!(
            err.to_string(),
            "operating system not found: Windows 11 Enterprise"
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }
}
