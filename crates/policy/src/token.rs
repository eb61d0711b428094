//! Token requirements and supporting-token categories.

use crate::assertion::AssertionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether, and towards whom, a token is embedded in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeToken {
    /// Never embedded; referenced by key identifier only
    Never,
    /// Embedded in the first message only
    Once,
    /// Embedded in messages sent to the recipient
    AlwaysToRecipient,
    /// Embedded in messages sent to the initiator
    AlwaysToInitiator,
    /// Always embedded
    #[default]
    Always,
}

/// X.509 token profile flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum X509TokenType {
    #[default]
    X509V3Token10,
    X509V3Token11,
    X509V1Token11,
    PkiPathV1Token10,
    PkiPathV1Token11,
}

impl X509TokenType {
    /// Whether the whole certificate path is embedded instead of one certificate.
    pub fn is_pki_path(self) -> bool {
        matches!(self, X509TokenType::PkiPathV1Token10 | X509TokenType::PkiPathV1Token11)
    }
}

/// Username token requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UsernameTokenPolicy {
    /// Token carries no password at all
    #[serde(default)]
    pub no_password: bool,
    /// Password is sent as a digest rather than plaintext
    #[serde(default)]
    pub hash_password: bool,
}

/// X.509 token requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct X509TokenPolicy {
    #[serde(default)]
    pub token_type: X509TokenType,
    #[serde(default)]
    pub require_issuer_serial_reference: bool,
    #[serde(default)]
    pub require_key_identifier_reference: bool,
    #[serde(default)]
    pub require_thumbprint_reference: bool,
}

/// Issued (trust-negotiated) token requirements. Never built locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IssuedTokenPolicy {
    /// Security token service address
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Closed set of token variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    Username(UsernameTokenPolicy),
    X509(X509TokenPolicy),
    Issued(IssuedTokenPolicy),
}

impl TokenKind {
    /// Human-readable name used in log lines and reports.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Username(_) => "UsernameToken",
            TokenKind::X509(_) => "X509Token",
            TokenKind::Issued(_) => "IssuedToken",
        }
    }
}

/// A registered token requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Registry id of the token assertion
    pub id: AssertionId,
    pub inclusion: IncludeToken,
    pub kind: TokenKind,
}

impl Token {
    /// X.509 requirements, if this is an X.509 token.
    pub fn x509(&self) -> Option<&X509TokenPolicy> {
        match &self.kind {
            TokenKind::X509(policy) => Some(policy),
            _ => None,
        }
    }
}

/// Supporting-token categories, in the order a binding pass visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportingTokenCategory {
    Signed,
    Endorsing,
    SignedEndorsing,
    SignedEncrypted,
    EndorsingEncrypted,
    SignedEndorsingEncrypted,
    Plain,
    PlainEncrypted,
}

impl SupportingTokenCategory {
    /// Every category.
    pub const ALL: [SupportingTokenCategory; 8] = [
        SupportingTokenCategory::Signed,
        SupportingTokenCategory::Endorsing,
        SupportingTokenCategory::SignedEndorsing,
        SupportingTokenCategory::SignedEncrypted,
        SupportingTokenCategory::EndorsingEncrypted,
        SupportingTokenCategory::SignedEndorsingEncrypted,
        SupportingTokenCategory::Plain,
        SupportingTokenCategory::PlainEncrypted,
    ];

    /// Token must be covered by the primary signature.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            SupportingTokenCategory::Signed
                | SupportingTokenCategory::SignedEndorsing
                | SupportingTokenCategory::SignedEncrypted
                | SupportingTokenCategory::SignedEndorsingEncrypted
        )
    }

    /// Token's key must sign the primary signature.
    pub fn is_endorsing(self) -> bool {
        matches!(
            self,
            SupportingTokenCategory::Endorsing
                | SupportingTokenCategory::SignedEndorsing
                | SupportingTokenCategory::EndorsingEncrypted
                | SupportingTokenCategory::SignedEndorsingEncrypted
        )
    }

    /// Token's wire form must be encrypted.
    pub fn is_encrypted(self) -> bool {
        matches!(
            self,
            SupportingTokenCategory::SignedEncrypted
                | SupportingTokenCategory::EndorsingEncrypted
                | SupportingTokenCategory::SignedEndorsingEncrypted
                | SupportingTokenCategory::PlainEncrypted
        )
    }

    /// Policy assertion name.
    pub fn assertion_name(self) -> &'static str {
        match self {
            SupportingTokenCategory::Signed => "SignedSupportingTokens",
            SupportingTokenCategory::Endorsing => "EndorsingSupportingTokens",
            SupportingTokenCategory::SignedEndorsing => "SignedEndorsingSupportingTokens",
            SupportingTokenCategory::SignedEncrypted => "SignedEncryptedSupportingTokens",
            SupportingTokenCategory::EndorsingEncrypted => "EndorsingEncryptedSupportingTokens",
            SupportingTokenCategory::SignedEndorsingEncrypted => {
                "SignedEndorsingEncryptedSupportingTokens"
            }
            SupportingTokenCategory::Plain => "SupportingTokens",
            SupportingTokenCategory::PlainEncrypted => "EncryptedSupportingTokens",
        }
    }
}

impl fmt::Display for SupportingTokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.assertion_name())
    }
}

/// A supporting-token assertion: a category and its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingTokens {
    pub category: SupportingTokenCategory,
    pub tokens: Vec<Token>,
}

/// Role of a binding-level token wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperRole {
    Initiator,
    Recipient,
    Protection,
    Signature,
    Encryption,
}

impl WrapperRole {
    /// Policy assertion name.
    pub fn assertion_name(self) -> &'static str {
        match self {
            WrapperRole::Initiator => "InitiatorToken",
            WrapperRole::Recipient => "RecipientToken",
            WrapperRole::Protection => "ProtectionToken",
            WrapperRole::Signature => "SignatureToken",
            WrapperRole::Encryption => "EncryptionToken",
        }
    }
}

/// A binding-level token together with the wrapper assertion that names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedToken {
    /// Registry id of the wrapper assertion
    pub wrapper: AssertionId,
    pub role: WrapperRole,
    pub token: Token,
}
