//! Security artifacts produced by a crypto provider.
//!
//! Every artifact owns a detached element created in the target document. The
//! caller decides where it goes in the security header.

use crate::keystore::{Certificate, KeyStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use wsbind_core::{NodeId, Password, QName};
use zeroize::Zeroizing;

/// Whether a reference covers the element itself or only its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartModifier {
    Element,
    Content,
}

/// Origin of a part reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    Body,
    Header,
    Element,
    /// Reference to a security artifact by id
    Reference,
}

/// A signable or encryptable unit of the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReference {
    /// Stable identifier written on the element
    pub id: String,
    pub name: Option<QName>,
    pub modifier: PartModifier,
    pub part_type: PartType,
    /// Element this reference was resolved from
    pub node: Option<NodeId>,
}

impl PartReference {
    /// Plain reference to an already identified element.
    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            modifier: PartModifier::Element,
            part_type: PartType::Reference,
            node: None,
        }
    }
}

/// How a signature or encrypted key points at its key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyIdentifierKind {
    /// Reference to a binary security token embedded in the header
    BstDirectReference,
    IssuerSerial,
    SubjectKeyIdentifier,
    Thumbprint,
    /// Certificate embedded inside the key info
    EmbeddedCertificate,
}

impl fmt::Display for KeyIdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyIdentifierKind::BstDirectReference => "BSTDirectReference",
            KeyIdentifierKind::IssuerSerial => "IssuerSerial",
            KeyIdentifierKind::SubjectKeyIdentifier => "SKIKeyIdentifier",
            KeyIdentifierKind::Thumbprint => "ThumbprintSHA1",
            KeyIdentifierKind::EmbeddedCertificate => "EmbeddedKeyName",
        };
        f.write_str(name)
    }
}

/// Embedded certificate element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySecurityToken {
    pub id: String,
    pub element: NodeId,
    pub value_type: String,
}

/// A signature prepared against a document, finalized by
/// [`crate::CryptoProvider::compute_signature`].
#[derive(Debug, Clone)]
pub struct SignatureArtifact {
    pub id: String,
    /// `ds:Signature` element
    pub element: NodeId,
    pub key_identifier: KeyIdentifierKind,
    /// Key store alias that signs
    pub user: String,
    pub signature_algorithm: String,
    pub c14n_algorithm: String,
    pub digest_algorithm: String,
    pub certificate: Certificate,
    pub bst: Option<BinarySecurityToken>,
    /// Ids covered by the signature, in reference order
    pub references: Vec<String>,
    pub value: Option<Vec<u8>>,
    pub(crate) keystore: Arc<KeyStore>,
    pub(crate) password: Password,
}

impl SignatureArtifact {
    pub fn bst_id(&self) -> Option<&str> {
        self.bst.as_ref().map(|bst| bst.id.as_str())
    }

    pub fn is_computed(&self) -> bool {
        self.value.is_some()
    }

    /// Whether `id` is among the signed references.
    pub fn covers(&self, id: &str) -> bool {
        self.references.iter().any(|r| r == id)
    }
}

/// Password representation of a username token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasswordType {
    Text,
    Digest,
    /// No password element at all
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameArtifact {
    pub id: String,
    pub element: NodeId,
    pub username: String,
    pub password_type: PasswordType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampArtifact {
    pub id: String,
    pub element: NodeId,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// A wrapped symmetric key for a recipient.
#[derive(Debug, Clone)]
pub struct EncryptedKeyArtifact {
    pub id: String,
    pub element: NodeId,
    pub key_identifier: KeyIdentifierKind,
    pub recipient: Certificate,
    pub key_wrap_algorithm: String,
    /// Unwrapped key
    pub key: Zeroizing<Vec<u8>>,
    pub wrapped_key: Vec<u8>,
    pub bst: Option<BinarySecurityToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationArtifact {
    pub id: String,
    pub element: NodeId,
    pub value: Option<Vec<u8>>,
}

/// Output of building one supporting token.
#[derive(Debug, Clone)]
pub enum BuiltArtifact {
    Username(UsernameArtifact),
    Signature(SignatureArtifact),
}

impl BuiltArtifact {
    pub fn id(&self) -> &str {
        match self {
            BuiltArtifact::Username(token) => &token.id,
            BuiltArtifact::Signature(signature) => &signature.id,
        }
    }

    pub fn element(&self) -> NodeId {
        match self {
            BuiltArtifact::Username(token) => token.element,
            BuiltArtifact::Signature(signature) => signature.element,
        }
    }

    /// Id of the embedded certificate, if any.
    pub fn bst_id(&self) -> Option<&str> {
        match self {
            BuiltArtifact::Username(_) => None,
            BuiltArtifact::Signature(signature) => signature.bst_id(),
        }
    }

    pub fn signature_value(&self) -> Option<&[u8]> {
        match self {
            BuiltArtifact::Username(_) => None,
            BuiltArtifact::Signature(signature) => signature.value.as_deref(),
        }
    }

    pub fn as_signature(&self) -> Option<&SignatureArtifact> {
        match self {
            BuiltArtifact::Signature(signature) => Some(signature),
            BuiltArtifact::Username(_) => None,
        }
    }

    pub fn as_signature_mut(&mut self) -> Option<&mut SignatureArtifact> {
        match self {
            BuiltArtifact::Signature(signature) => Some(signature),
            BuiltArtifact::Username(_) => None,
        }
    }
}
