//! Crypto primitive provider contract.

use crate::artifact::{
    ConfirmationArtifact, EncryptedKeyArtifact, KeyIdentifierKind, PartReference, PasswordType,
    SignatureArtifact, TimestampArtifact, UsernameArtifact,
};
use crate::error::ProviderResult;
use crate::keystore::{Certificate, KeyStore};
use std::sync::Arc;
use wsbind_core::{CryptoProperties, Document, Password};

/// Username token to build.
#[derive(Debug, Clone)]
pub struct UsernameTokenRequest {
    pub username: String,
    pub password: Option<Password>,
    pub password_type: PasswordType,
}

/// Signature to prepare.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    /// Key store alias
    pub user: String,
    pub password: Password,
    pub key_identifier: KeyIdentifierKind,
    pub signature_algorithm: String,
    pub c14n_algorithm: String,
    pub digest_algorithm: String,
    /// Embed only the signing certificate rather than the whole path
    pub single_certificate: bool,
}

/// Whose key wraps the session key.
#[derive(Debug, Clone)]
pub enum Recipient {
    /// Certificate stored under an alias
    Alias(String),
    /// Certificate taken from an inbound signature
    Certificate(Certificate),
}

/// Encrypted key to prepare.
#[derive(Debug, Clone)]
pub struct EncryptedKeyRequest {
    pub recipient: Recipient,
    pub key_identifier: KeyIdentifierKind,
    /// Bits
    pub key_size: u32,
    pub key_wrap_algorithm: String,
}

/// Primitive operations the binding pass delegates.
///
/// Implementations create detached elements in `doc`; callers insert them.
/// Errors are converted to policy outcomes by the caller, never propagated
/// past the owning assertion.
pub trait CryptoProvider: Send + Sync {
    /// `wsu:Timestamp` valid for `ttl_secs`.
    fn create_timestamp(
        &self,
        doc: &mut dyn Document,
        ttl_secs: u64,
    ) -> ProviderResult<TimestampArtifact>;

    /// `wsse:UsernameToken`.
    fn create_username_token(
        &self,
        doc: &mut dyn Document,
        request: &UsernameTokenRequest,
    ) -> ProviderResult<UsernameArtifact>;

    /// Unlock the signing key and create the signature skeleton, including
    /// the embedded certificate when the key identifier asks for one.
    fn prepare_signature(
        &self,
        doc: &mut dyn Document,
        request: &SignatureRequest,
        keystore: Arc<KeyStore>,
    ) -> ProviderResult<SignatureArtifact>;

    /// Digest `parts` and sign. Every part must resolve in `doc`.
    fn compute_signature(
        &self,
        doc: &mut dyn Document,
        signature: &mut SignatureArtifact,
        parts: &[PartReference],
    ) -> ProviderResult<()>;

    /// Generate a session key and wrap it for the recipient.
    fn prepare_encrypted_key(
        &self,
        doc: &mut dyn Document,
        request: &EncryptedKeyRequest,
        keystore: &KeyStore,
    ) -> ProviderResult<EncryptedKeyArtifact>;

    /// `wsse11:SignatureConfirmation`, with or without a value.
    fn create_signature_confirmation(
        &self,
        doc: &mut dyn Document,
        value: Option<&[u8]>,
    ) -> ProviderResult<ConfirmationArtifact>;
}

/// Turns crypto configuration properties into a key store.
pub trait CryptoMaterialSource: Send + Sync {
    fn load(&self, properties: &CryptoProperties) -> ProviderResult<Arc<KeyStore>>;
}
