//! Security binding and algorithm suite.
//!
//! A [`Binding`] is read-only for the whole life of a service endpoint and may
//! be shared between concurrent exchanges.

use crate::token::WrappedToken;
use serde::{Deserialize, Serialize};

pub mod uri {
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const HMAC_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#hmac-sha1";
    pub const HMAC_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha256";
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const AES128: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";
    pub const AES256: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";
    pub const KW_AES128: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes128";
    pub const KW_AES256: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes256";
    pub const KW_RSA_OAEP: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
    pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

/// Algorithm choices of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmSuite {
    pub name: String,
    pub asymmetric_signature: String,
    pub symmetric_signature: String,
    pub digest: String,
    pub encryption: String,
    pub symmetric_key_wrap: String,
    pub asymmetric_key_wrap: String,
    /// Canonicalization used for signatures
    pub c14n: String,
    /// Inclusive canonicalization URI, used when the suite requests it
    pub inclusive_c14n: String,
    /// Bits
    pub maximum_symmetric_key_length: u32,
    /// Bits
    pub minimum_symmetric_key_length: u32,
}

impl AlgorithmSuite {
    fn suite(name: &str, digest: &str, encryption: &str, key_wrap: &str, bits: u32, sha256: bool) -> Self {
        Self {
            name: name.to_string(),
            asymmetric_signature: (if sha256 { uri::RSA_SHA256 } else { uri::RSA_SHA1 }).to_string(),
            symmetric_signature: (if sha256 { uri::HMAC_SHA256 } else { uri::HMAC_SHA1 }).to_string(),
            digest: digest.to_string(),
            encryption: encryption.to_string(),
            symmetric_key_wrap: key_wrap.to_string(),
            asymmetric_key_wrap: uri::KW_RSA_OAEP.to_string(),
            c14n: uri::EXC_C14N.to_string(),
            inclusive_c14n: uri::C14N.to_string(),
            maximum_symmetric_key_length: bits,
            minimum_symmetric_key_length: bits,
        }
    }

    /// `Basic256`
    pub fn basic256() -> Self {
        Self::suite("Basic256", uri::SHA1, uri::AES256, uri::KW_AES256, 256, false)
    }

    /// `Basic128`
    pub fn basic128() -> Self {
        Self::suite("Basic128", uri::SHA1, uri::AES128, uri::KW_AES128, 128, false)
    }

    /// `Basic256Sha256`
    pub fn basic256_sha256() -> Self {
        Self::suite("Basic256Sha256", uri::SHA256, uri::AES256, uri::KW_AES256, 256, true)
    }
}

impl Default for AlgorithmSuite {
    fn default() -> Self {
        Self::basic256()
    }
}

/// Binding flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    #[default]
    Asymmetric,
    Symmetric,
    Transport,
}

/// The security contract for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Binding {
    #[serde(default)]
    pub kind: BindingKind,
    #[serde(default)]
    pub algorithm_suite: AlgorithmSuite,
    /// Endorsing signatures also sign their own token
    #[serde(default)]
    pub token_protection: bool,
    /// Token whose key produces the primary message signature
    #[serde(default)]
    pub signature_token: Option<WrappedToken>,
    /// Token whose key wraps the message encryption key
    #[serde(default)]
    pub encryption_token: Option<WrappedToken>,
}

impl Binding {
    pub fn new(kind: BindingKind, algorithm_suite: AlgorithmSuite) -> Self {
        Self {
            kind,
            algorithm_suite,
            ..Default::default()
        }
    }

    pub fn with_token_protection(mut self, token_protection: bool) -> Self {
        self.token_protection = token_protection;
        self
    }

    pub fn with_signature_token(mut self, token: WrappedToken) -> Self {
        self.signature_token = Some(token);
        self
    }

    pub fn with_encryption_token(mut self, token: WrappedToken) -> Self {
        self.encryption_token = Some(token);
        self
    }

    /// Token protection only applies to message-level bindings.
    pub fn is_token_protection(&self) -> bool {
        self.token_protection && self.kind != BindingKind::Transport
    }
}
