//! Error Module - IGC Error Types
//!
//! Defines all error types surfaced by the collector and the handle API.

use thiserror::Error;

/// Main error type for all IGC operations
#[derive(Debug, Error)]
pub enum GcError {
    #[error("Allocation failure: allocator returned nothing for {requested} bytes")]
    AllocFailure { requested: usize },

    #[error("Constructor failure while building element {index} of {count}")]
    ConstructorFailure { index: usize, count: usize },

    #[error("Null dereference through a managed handle")]
    NullDeref,

    #[error("No managed header covers address {address:#x}")]
    MissingHeader { address: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GcError {
    /// Check if this error is recoverable by the mutator
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GcError::AllocFailure { .. } | GcError::NullDeref | GcError::MissingHeader { .. }
        )
    }

    /// Check if this error indicates a bug in the embedding code
    pub fn is_bug(&self) -> bool {
        matches!(self, GcError::Internal(_))
    }
}

/// Result type alias for IGC operations
pub type Result<T> = std::result::Result<T, GcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(GcError::NullDeref.is_recoverable());
        assert!(GcError::AllocFailure { requested: 64 }.is_recoverable());
        assert!(GcError::Internal("x".into()).is_bug());
        assert!(!GcError::Configuration("x".into()).is_bug());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = GcError::MissingHeader { address: 0x1000 };
        assert!(err.to_string().contains("0x1000"));
    }
}
