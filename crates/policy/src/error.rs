//! Error types for policy model operations.

use crate::assertion::AssertionId;
use thiserror::Error;

/// Errors raised while assembling or validating a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Assertion id was not issued by this registry
    #[error("Unknown assertion: {0}")]
    UnknownAssertion(AssertionId),

    /// Assertion exists but has an unexpected kind
    #[error("Assertion {id} is not a {expected}")]
    UnexpectedKind { id: AssertionId, expected: String },

    /// Structurally invalid policy
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
