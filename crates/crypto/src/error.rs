//! Error types for crypto primitive providers.

use thiserror::Error;
use wsbind_core::DocumentError;

/// Failures reported by a [`crate::CryptoProvider`] or key material source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// No certificate stored under the alias
    #[error("No certificate found for alias '{0}'")]
    UnknownAlias(String),

    /// Wrong password for a private key entry
    #[error("Cannot access private key of '{0}'")]
    KeyAccess(String),

    /// Alias only carries a certificate
    #[error("No private key available for '{0}'")]
    NoPrivateKey(String),

    /// A reference names an id not present in the document
    #[error("Unresolved reference '{0}'")]
    UnresolvedReference(String),

    /// Signature value already computed for this artifact
    #[error("Signature {0} has already been computed")]
    AlreadyComputed(String),

    /// Crypto properties could not be turned into key material
    #[error("Invalid crypto material: {0}")]
    CryptoMaterial(String),

    /// Requested operation or option not supported by the provider
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Underlying primitive failed
    #[error("Crypto operation failed: {0}")]
    Crypto(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
