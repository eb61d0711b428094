//! Error taxonomy of the binding pass.
//!
//! None of these abort a pass. Each one is attributed to the assertion it
//! violates and recorded in [`crate::builder::BuildOutput::diagnostics`].

use crate::credentials::CredentialPurpose;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wsbind_core::{CoreError, DocumentError};
use wsbind_crypto::ProviderError;
use wsbind_policy::{AssertionId, Layout, PolicyError};

/// Credential and key material resolution failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Neither configuration nor callback produced a value
    #[error("No {purpose} credential available for '{identity}'")]
    NoCredentialAvailable {
        identity: String,
        purpose: CredentialPurpose,
    },

    /// The credential callback failed
    #[error("Credential callback failed: {0}")]
    Callback(String),

    /// Crypto configuration could not be resolved into a key store
    #[error("{0}")]
    CryptoMaterial(String),

    /// A lookup needed inbound security results and there were none
    #[error("No security results in incoming message")]
    NoSecurityResultsAvailable,
}

/// Binding pass failures.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Token kind cannot be built in this role
    #[error("{0} not yet supported")]
    UnsupportedTokenKind(String),

    /// Layout needs a timestamp the message does not carry
    #[error("{0} requires a timestamp")]
    MissingRequiredTimestamp(Layout),

    /// The crypto provider failed
    #[error(transparent)]
    PrimitiveProviderFailure(#[from] ProviderError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Config(#[from] CoreError),
}

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// A recorded, non-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Assertion the failure was attributed to
    pub assertion: Option<AssertionId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(assertion: Option<AssertionId>, message: impl Into<String>) -> Self {
        Self {
            assertion,
            message: message.into(),
        }
    }
}
