//! How an outbound signature or encrypted key points at its key.

use tracing::debug;
use wsbind_crypto::KeyIdentifierKind;
use wsbind_policy::{AssertionId, AssertionRegistry, IncludeToken, Token, WssVersion};

/// Pick the key identifier for `token`, recording the assertions the choice
/// satisfies.
///
/// Embedded tokens are referenced directly. A token that is never embedded
/// uses the reference its X.509 requirements name, falling back to what the
/// WS-Security assertion says the recipient supports. `wrapper` is the
/// binding wrapper or, for supporting tokens, the category assertion.
pub fn choose_key_identifier(
    registry: &mut AssertionRegistry,
    token: &Token,
    wrapper: AssertionId,
) -> KeyIdentifierKind {
    if token.inclusion != IncludeToken::Never {
        registry.mark_asserted(token.id);
        registry.mark_asserted(wrapper);
        return KeyIdentifierKind::BstDirectReference;
    }

    if let Some(x509) = token.x509() {
        let required = if x509.require_issuer_serial_reference {
            Some(KeyIdentifierKind::IssuerSerial)
        } else if x509.require_key_identifier_reference {
            Some(KeyIdentifierKind::SubjectKeyIdentifier)
        } else if x509.require_thumbprint_reference {
            Some(KeyIdentifierKind::Thumbprint)
        } else {
            None
        };
        if let Some(kind) = required {
            debug!(token = %token.id, key_identifier = %kind, "Key identifier required by token");
            return kind;
        }
    }

    registry.mark_asserted(token.id);
    registry.mark_asserted(wrapper);
    let kind = match registry.find_wss() {
        Some((wss, caps)) => {
            registry.mark_asserted(wss);
            if caps.must_support_ref_key_identifier {
                KeyIdentifierKind::SubjectKeyIdentifier
            } else if caps.must_support_ref_issuer_serial {
                KeyIdentifierKind::IssuerSerial
            } else if caps.version == WssVersion::Wss11 && caps.must_support_ref_thumbprint {
                KeyIdentifierKind::Thumbprint
            } else {
                KeyIdentifierKind::IssuerSerial
            }
        }
        None => KeyIdentifierKind::IssuerSerial,
    };
    debug!(token = %token.id, key_identifier = %kind, "Key identifier from WS-Security capabilities");
    kind
}
