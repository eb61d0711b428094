//! Crypto primitive provider for the wsbind binding pass.
//!
//! The binding core never signs, wraps or hashes anything itself. It asks a
//! [`CryptoProvider`] to build security artifacts as detached elements of the
//! message document and decides where they go.
//!
//! # Provided pieces
//!
//! - [`CryptoProvider`] / [`CryptoMaterialSource`]: the contracts
//! - [`KeyStore`]: certificates and Ed25519 keys by alias
//! - [`SoftwareProvider`]: in-process implementation of both contracts
//!
//! # Security Principles
//!
//! - Secrets are wrapped in `Password` / `Zeroizing` and never logged
//! - Provider failures are values; callers attribute them to an assertion

pub mod artifact;
pub mod error;
pub mod keystore;
pub mod provider;
pub mod software;

pub use artifact::{
    BinarySecurityToken, BuiltArtifact, ConfirmationArtifact, EncryptedKeyArtifact,
    KeyIdentifierKind, PartModifier, PartReference, PartType, PasswordType, SignatureArtifact,
    TimestampArtifact, UsernameArtifact,
};
pub use error::{ProviderError, ProviderResult};
pub use keystore::{Certificate, KeyEntry, KeyStore};
pub use provider::{
    CryptoMaterialSource, CryptoProvider, EncryptedKeyRequest, Recipient, SignatureRequest,
    UsernameTokenRequest,
};
pub use software::SoftwareProvider;
