//! Policy assertions and their evaluation outcomes.

use crate::token::{SupportingTokenCategory, SupportingTokens, Token, TokenKind, WrapperRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use wsbind_core::Namespaces;

/// Registry-issued assertion identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionId(pub usize);

impl fmt::Display for AssertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Evaluation state of one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pending,
    Asserted,
    NotAsserted(String),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn is_asserted(&self) -> bool {
        matches!(self, Outcome::Asserted)
    }

    /// Failure reason, if not asserted.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::NotAsserted(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Security header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    Strict,
    Lax,
    LaxTimestampFirst,
    LaxTimestampLast,
}

impl Layout {
    /// Whether the layout places the timestamp at a fixed end of the header.
    pub fn requires_timestamp(self) -> bool {
        matches!(self, Layout::LaxTimestampFirst | Layout::LaxTimestampLast)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::Strict => "Strict",
            Layout::Lax => "Lax",
            Layout::LaxTimestampFirst => "LaxTsFirst",
            Layout::LaxTimestampLast => "LaxTsLast",
        };
        f.write_str(name)
    }
}

/// Negotiated WS-Security version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WssVersion {
    #[default]
    Wss10,
    Wss11,
}

/// WS-Security capability assertion (`Wss10` / `Wss11`).
///
/// The 1.1-only flags are ignored when `version` is [`WssVersion::Wss10`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WssCapabilities {
    #[serde(default)]
    pub version: WssVersion,
    #[serde(default)]
    pub must_support_ref_key_identifier: bool,
    #[serde(default)]
    pub must_support_ref_issuer_serial: bool,
    #[serde(default)]
    pub must_support_ref_external_uri: bool,
    #[serde(default)]
    pub must_support_ref_embedded_token: bool,
    #[serde(default)]
    pub must_support_ref_thumbprint: bool,
    #[serde(default)]
    pub must_support_ref_encrypted_key: bool,
    #[serde(default)]
    pub require_signature_confirmation: bool,
}

impl WssCapabilities {
    pub fn supports_thumbprint(&self) -> bool {
        self.version == WssVersion::Wss11 && self.must_support_ref_thumbprint
    }

    pub fn requires_signature_confirmation(&self) -> bool {
        self.version == WssVersion::Wss11 && self.require_signature_confirmation
    }
}

/// A header named by a parts assertion. An absent name selects every header
/// in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderPart {
    #[serde(default)]
    pub name: Option<String>,
    pub namespace: String,
}

impl HeaderPart {
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            name: None,
            namespace: namespace.into(),
        }
    }
}

/// `SignedParts` / `EncryptedParts` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parts {
    #[serde(default)]
    pub body: bool,
    #[serde(default)]
    pub headers: Vec<HeaderPart>,
}

/// `SignedElements` / `EncryptedElements` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub xpaths: Vec<String>,
    #[serde(default)]
    pub namespaces: Namespaces,
}

/// Closed set of assertions the binding pass understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "assertion", content = "value", rename_all = "snake_case")]
pub enum Assertion {
    IncludeTimestamp,
    Layout(Layout),
    Wss(WssCapabilities),
    SignedParts(Parts),
    SignedElements(Elements),
    EncryptedParts(Parts),
    EncryptedElements(Elements),
    SupportingTokens(SupportingTokens),
    Token(Token),
    TokenWrapper { role: WrapperRole, token: AssertionId },
}

/// Lookup key for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionKind {
    IncludeTimestamp,
    Layout,
    Wss10,
    Wss11,
    SignedParts,
    SignedElements,
    EncryptedParts,
    EncryptedElements,
    SupportingTokens(SupportingTokenCategory),
    UsernameToken,
    X509Token,
    IssuedToken,
    TokenWrapper(WrapperRole),
}

impl Assertion {
    /// Lookup key of this assertion.
    pub fn kind(&self) -> AssertionKind {
        match self {
            Assertion::IncludeTimestamp => AssertionKind::IncludeTimestamp,
            Assertion::Layout(_) => AssertionKind::Layout,
            Assertion::Wss(caps) => match caps.version {
                WssVersion::Wss10 => AssertionKind::Wss10,
                WssVersion::Wss11 => AssertionKind::Wss11,
            },
            Assertion::SignedParts(_) => AssertionKind::SignedParts,
            Assertion::SignedElements(_) => AssertionKind::SignedElements,
            Assertion::EncryptedParts(_) => AssertionKind::EncryptedParts,
            Assertion::EncryptedElements(_) => AssertionKind::EncryptedElements,
            Assertion::SupportingTokens(st) => AssertionKind::SupportingTokens(st.category),
            Assertion::Token(token) => match token.kind {
                TokenKind::Username(_) => AssertionKind::UsernameToken,
                TokenKind::X509(_) => AssertionKind::X509Token,
                TokenKind::Issued(_) => AssertionKind::IssuedToken,
            },
            Assertion::TokenWrapper { role, .. } => AssertionKind::TokenWrapper(*role),
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionKind::IncludeTimestamp => f.write_str("IncludeTimestamp"),
            AssertionKind::Layout => f.write_str("Layout"),
            AssertionKind::Wss10 => f.write_str("Wss10"),
            AssertionKind::Wss11 => f.write_str("Wss11"),
            AssertionKind::SignedParts => f.write_str("SignedParts"),
            AssertionKind::SignedElements => f.write_str("SignedElements"),
            AssertionKind::EncryptedParts => f.write_str("EncryptedParts"),
            AssertionKind::EncryptedElements => f.write_str("EncryptedElements"),
            AssertionKind::SupportingTokens(category) => fmt::Display::fmt(category, f),
            AssertionKind::UsernameToken => f.write_str("UsernameToken"),
            AssertionKind::X509Token => f.write_str("X509Token"),
            AssertionKind::IssuedToken => f.write_str("IssuedToken"),
            AssertionKind::TokenWrapper(role) => f.write_str(role.assertion_name()),
        }
    }
}
