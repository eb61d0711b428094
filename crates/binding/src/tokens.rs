//! Supporting-token construction.
//!
//! Each category is handled as a whole: every token it lists is built, or
//! skipped with its own failure recorded, and the category assertion sums
//! up the result.

use crate::builder::BindingBuilder;
use crate::credentials::{CredentialPurpose, EncryptionUser};
use crate::error::{BindingError, BindingResult, CredentialError};
use crate::key_identifier::choose_key_identifier;
use std::sync::Arc;
use tracing::{debug, warn};
use wsbind_crypto::{
    BuiltArtifact, EncryptedKeyArtifact, EncryptedKeyRequest, KeyStore, PartReference,
    PasswordType, Recipient, SignatureArtifact, SignatureRequest, UsernameArtifact,
    UsernameTokenRequest,
};
use wsbind_policy::{
    Assertion, AssertionId, AssertionKind, SupportingTokenCategory, Token, TokenKind,
    UsernameTokenPolicy,
};

/// A supporting token that was built, with the category assertion that
/// listed it.
#[derive(Debug, Clone)]
pub struct TokenArtifact {
    pub category: AssertionId,
    pub token: Token,
    pub artifact: BuiltArtifact,
}

/// Artifacts built for one category, in token order. Tokens that could not
/// be built are absent.
pub type TokenArtifacts = Vec<TokenArtifact>;

enum Built<T> {
    Done(T),
    /// Not this side's job
    Skipped,
    Failed,
}

impl BindingBuilder<'_> {
    /// Build every token of every `category` assertion.
    pub fn handle_supporting_tokens(
        &mut self,
        category: SupportingTokenCategory,
    ) -> BindingResult<TokenArtifacts> {
        let assertions: Vec<(AssertionId, Vec<Token>)> = self
            .registry
            .find_all(AssertionKind::SupportingTokens(category))
            .into_iter()
            .filter_map(|(id, assertion)| match assertion {
                Assertion::SupportingTokens(st) => Some((id, st.tokens.clone())),
                _ => None,
            })
            .collect();

        let mut artifacts = TokenArtifacts::new();
        for (id, tokens) in assertions {
            let total = tokens.len();
            let mut failed = 0usize;
            for token in tokens {
                match self.build_supporting_token(id, category, &token)? {
                    Built::Done(artifact) => artifacts.push(TokenArtifact {
                        category: id,
                        token,
                        artifact,
                    }),
                    Built::Skipped => {}
                    Built::Failed => failed += 1,
                }
            }
            if failed == 0 {
                self.registry.mark_asserted(id);
            } else {
                self.not_asserted(
                    id,
                    format!("{} of {} {} could not be built", failed, total, category),
                );
            }
        }
        Ok(artifacts)
    }

    fn build_supporting_token(
        &mut self,
        category_id: AssertionId,
        category: SupportingTokenCategory,
        token: &Token,
    ) -> BindingResult<Built<BuiltArtifact>> {
        match &token.kind {
            TokenKind::Username(policy) => match self.username_token(token, *policy)? {
                Built::Done(artifact) => {
                    if category.is_encrypted() {
                        self.encrypted_token_ids.push(artifact.id.clone());
                    }
                    Ok(Built::Done(BuiltArtifact::Username(artifact)))
                }
                Built::Skipped => Ok(Built::Skipped),
                Built::Failed => Ok(Built::Failed),
            },
            TokenKind::X509(_) => {
                let Some(signature) = self.signature_builder(category_id, token)? else {
                    return Ok(Built::Failed);
                };
                self.registry.mark_asserted(token.id);
                if let Some(bst) = &signature.bst {
                    self.header.append(&mut *self.doc, bst.element)?;
                }
                if category.is_encrypted() {
                    let id = signature.bst_id().unwrap_or(&signature.id).to_string();
                    self.encrypted_token_ids.push(id);
                }
                Ok(Built::Done(BuiltArtifact::Signature(signature)))
            }
            TokenKind::Issued(_) if self.exchange.is_requestor() => {
                let err = BindingError::UnsupportedTokenKind("Issued token".to_string());
                self.not_asserted(token.id, err.to_string());
                Ok(Built::Failed)
            }
            TokenKind::Issued(_) => {
                // Inbound processing validated it; nothing to add on the way out.
                self.registry.mark_asserted(token.id);
                Ok(Built::Skipped)
            }
        }
    }

    fn username_token(
        &mut self,
        token: &Token,
        policy: UsernameTokenPolicy,
    ) -> BindingResult<Built<UsernameArtifact>> {
        if !self.exchange.is_requestor() {
            self.registry.mark_asserted(token.id);
            return Ok(Built::Skipped);
        }
        let Some(username) = self
            .exchange
            .credentials()
            .resolve_username(CredentialPurpose::UsernameToken)
        else {
            self.not_asserted(token.id, "No username available");
            return Ok(Built::Failed);
        };

        let (password, password_type) = if policy.no_password {
            (None, PasswordType::None)
        } else {
            let resolved = self
                .exchange
                .credentials()
                .resolve_password(&username, CredentialPurpose::UsernameToken);
            match resolved {
                Ok(password) if policy.hash_password => (Some(password), PasswordType::Digest),
                Ok(password) => (Some(password), PasswordType::Text),
                Err(e) => {
                    debug!(username = %username, error = %e, "Username token password unavailable");
                    self.not_asserted(token.id, "No password available");
                    return Ok(Built::Failed);
                }
            }
        };

        let request = UsernameTokenRequest {
            username,
            password,
            password_type,
        };
        match self.provider.create_username_token(&mut *self.doc, &request) {
            Ok(artifact) => {
                self.header.append(&mut *self.doc, artifact.element)?;
                self.registry.mark_asserted(token.id);
                Ok(Built::Done(artifact))
            }
            Err(e) => {
                self.not_asserted(token.id, BindingError::from(e).to_string());
                Ok(Built::Failed)
            }
        }
    }

    /// Prepare a signature with `token`'s key. `wrapper` is the binding
    /// wrapper, or the category assertion for supporting tokens.
    ///
    /// Returns `None` after recording why the signature cannot be made.
    pub(crate) fn signature_builder(
        &mut self,
        wrapper: AssertionId,
        token: &Token,
    ) -> BindingResult<Option<SignatureArtifact>> {
        let single_certificate = !token
            .x509()
            .map_or(false, |policy| policy.token_type.is_pki_path());
        let key_identifier = choose_key_identifier(&mut *self.registry, token, wrapper);

        let Some(user) = self
            .exchange
            .credentials()
            .resolve_username(CredentialPurpose::Signature)
        else {
            self.not_asserted(token.id, "No signature username found.");
            return Ok(None);
        };
        let password = match self
            .exchange
            .credentials()
            .resolve_password(&user, CredentialPurpose::Signature)
        {
            Ok(password) => password,
            Err(e) => {
                debug!(user = %user, error = %e, "Signature password unavailable");
                self.not_asserted(token.id, "No password found.");
                return Ok(None);
            }
        };
        let keystore = match self.exchange.credentials().resolve_crypto(CredentialPurpose::Signature) {
            Ok(keystore) => keystore,
            Err(e) => {
                warn!(error = %e, "No signature crypto");
                self.not_asserted(wrapper, e.to_string());
                self.not_asserted(token.id, e.to_string());
                return Ok(None);
            }
        };

        let suite = &self.binding.algorithm_suite;
        let request = SignatureRequest {
            user,
            password,
            key_identifier,
            signature_algorithm: suite.asymmetric_signature.clone(),
            c14n_algorithm: suite.inclusive_c14n.clone(),
            digest_algorithm: suite.digest.clone(),
            single_certificate,
        };
        match self.provider.prepare_signature(&mut *self.doc, &request, keystore) {
            Ok(signature) => Ok(Some(signature)),
            Err(e) => {
                let err = BindingError::from(e);
                warn!(token = %token.id, error = %err, "Could not prepare signature");
                self.not_asserted(token.id, err.to_string());
                Ok(None)
            }
        }
    }

    /// Add a reference to the embedded certificate of every signature
    /// artifact in `artifacts`. Other artifacts are covered by the document
    /// selection already.
    pub fn add_signature_parts(&self, artifacts: &TokenArtifacts, parts: &mut Vec<PartReference>) {
        for built in artifacts {
            if let BuiltArtifact::Signature(signature) = &built.artifact {
                if let Some(bst) = signature.bst_id() {
                    parts.push(PartReference::reference(bst));
                }
            }
        }
    }

    /// Wrap a fresh session key for the encryption recipient.
    ///
    /// Returns `None` after recording why no key could be wrapped.
    pub fn encrypted_key_builder(
        &mut self,
        wrapper: AssertionId,
        token: &Token,
    ) -> BindingResult<Option<EncryptedKeyArtifact>> {
        let key_identifier = choose_key_identifier(&mut *self.registry, token, wrapper);

        let user = match self.exchange.credentials().resolve_encryption_user() {
            Ok(user) => user,
            Err(CredentialError::NoCredentialAvailable { .. }) => {
                self.not_asserted(token.id, "No encryption username found.");
                return Ok(None);
            }
            Err(e) => {
                self.not_asserted(token.id, e.to_string());
                return Ok(None);
            }
        };
        let crypto = self.exchange.credentials().resolve_crypto(CredentialPurpose::Encryption);
        let (recipient, keystore) = match (user, crypto) {
            (EncryptionUser::Alias(alias), Ok(keystore)) => (Recipient::Alias(alias), keystore),
            (EncryptionUser::Alias(_), Err(e)) => {
                self.not_asserted(wrapper, e.to_string());
                return Ok(None);
            }
            (EncryptionUser::RequestCertificate { certificate, .. }, crypto) => {
                let keystore = crypto.unwrap_or_else(|e| {
                    debug!(
                        subject = %certificate.subject,
                        error = %e,
                        "No encryption crypto, wrapping for the request certificate alone"
                    );
                    Arc::new(KeyStore::new("request"))
                });
                (Recipient::Certificate(certificate), keystore)
            }
        };

        let suite = &self.binding.algorithm_suite;
        let request = EncryptedKeyRequest {
            recipient,
            key_identifier,
            key_size: suite.maximum_symmetric_key_length,
            key_wrap_algorithm: suite.asymmetric_key_wrap.clone(),
        };
        match self
            .provider
            .prepare_encrypted_key(&mut *self.doc, &request, &keystore)
        {
            Ok(key) => {
                debug!(id = %key.id, recipient = %key.recipient.subject, "Prepared encrypted key");
                Ok(Some(key))
            }
            Err(e) => {
                let err = BindingError::from(e);
                warn!(token = %token.id, error = %err, "Could not prepare encrypted key");
                self.not_asserted(token.id, err.to_string());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SecurityResult;
    use crate::testing::Fixture;
    use wsbind_core::{config, Document, Password};
    use wsbind_crypto::KeyIdentifierKind;
    use wsbind_policy::{IncludeToken, IssuedTokenPolicy, X509TokenPolicy, X509TokenType};

    fn username(hash_password: bool) -> TokenKind {
        TokenKind::Username(UsernameTokenPolicy {
            no_password: false,
            hash_password,
        })
    }

    #[test]
    fn test_username_token_with_digest() {
        let mut fx = Fixture::new();
        let token = fx.registry.register_token(IncludeToken::Always, username(true));
        let category = fx
            .registry
            .register_supporting_tokens(SupportingTokenCategory::Signed, vec![token.clone()]);

        let mut builder = fx.builder();
        let artifacts = builder
            .handle_supporting_tokens(SupportingTokenCategory::Signed)
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        let BuiltArtifact::Username(artifact) = &artifacts[0].artifact else {
            panic!("expected a username token");
        };
        assert_eq!(artifact.password_type, PasswordType::Digest);
        assert_eq!(artifact.username, "alice");
        drop(builder);

        assert!(fx.registry.outcome(token.id).unwrap().is_asserted());
        assert!(fx.registry.outcome(category).unwrap().is_asserted());
        assert!(fx.security_children().contains(&artifacts[0].artifact.element()));
    }

    #[test]
    fn test_username_token_missing_password() {
        let mut fx = Fixture::new();
        fx.exchange.config_mut().remove(config::PASSWORD);
        let token = fx.registry.register_token(IncludeToken::Always, username(false));
        let category = fx
            .registry
            .register_supporting_tokens(SupportingTokenCategory::Plain, vec![token.clone()]);

        let artifacts = fx
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Plain)
            .unwrap();
        assert!(artifacts.is_empty());
        assert_eq!(
            fx.registry.outcome(token.id).unwrap().reason(),
            Some("No password available")
        );
        assert_eq!(
            fx.registry.outcome(category).unwrap().reason(),
            Some("1 of 1 SupportingTokens could not be built")
        );
        assert!(fx.security_children().is_empty());
    }

    #[test]
    fn test_username_token_from_callback_and_without_password() {
        let mut fx = Fixture::new();
        fx.exchange.config_mut().remove(config::PASSWORD);
        fx.exchange = fx.exchange.clone().with_callback(Arc::new(
            |_: &crate::credentials::CredentialRequest| -> anyhow::Result<Option<Password>> {
                Ok(Some(Password::from("from-callback")))
            },
        ));
        let with_password = fx.registry.register_token(IncludeToken::Always, username(false));
        let without = fx.registry.register_token(
            IncludeToken::Always,
            TokenKind::Username(UsernameTokenPolicy {
                no_password: true,
                hash_password: false,
            }),
        );
        fx.registry.register_supporting_tokens(
            SupportingTokenCategory::Plain,
            vec![with_password, without],
        );
        let artifacts = fx
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Plain)
            .unwrap();
        let kinds: Vec<_> = artifacts
            .iter()
            .filter_map(|built| match &built.artifact {
                BuiltArtifact::Username(u) => Some(u.password_type),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![PasswordType::Text, PasswordType::None]);
        assert!(fx.registry.is_satisfied());
    }

    #[test]
    fn test_responder_skips_username_tokens() {
        let mut fx = Fixture::responder(Vec::new());
        let token = fx.registry.register_token(IncludeToken::Always, username(false));
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::Signed, vec![token.clone()]);
        let artifacts = fx
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Signed)
            .unwrap();
        assert!(artifacts.is_empty());
        assert!(fx.registry.is_satisfied());
    }

    #[test]
    fn test_issued_token_depends_on_role() {
        let mut fx = Fixture::new();
        let token = fx
            .registry
            .register_token(IncludeToken::Always, TokenKind::Issued(IssuedTokenPolicy::default()));
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![token.clone()]);
        let mut responder = fx.registry.clone();

        fx.builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        assert_eq!(
            fx.registry.outcome(token.id).unwrap().reason(),
            Some("Issued token not yet supported")
        );

        let mut other = Fixture::responder(Vec::new());
        std::mem::swap(&mut other.registry, &mut responder);
        other
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        assert!(other.registry.is_satisfied());
    }

    #[test]
    fn test_x509_token_in_encrypted_category() {
        let mut fx = Fixture::new();
        let token = fx
            .registry
            .register_token(IncludeToken::Always, TokenKind::X509(X509TokenPolicy::default()));
        let category = fx.registry.register_supporting_tokens(
            SupportingTokenCategory::SignedEncrypted,
            vec![token.clone()],
        );

        let mut builder = fx.builder();
        let artifacts = builder
            .handle_supporting_tokens(SupportingTokenCategory::SignedEncrypted)
            .unwrap();
        let signature = artifacts[0].artifact.as_signature().unwrap();
        assert_eq!(signature.key_identifier, KeyIdentifierKind::BstDirectReference);
        let bst_id = signature.bst_id().unwrap().to_string();
        assert_eq!(builder.encrypted_token_ids, vec![bst_id.clone()]);

        let mut parts = Vec::new();
        builder.add_signature_parts(&artifacts, &mut parts);
        assert_eq!(parts, vec![PartReference::reference(bst_id.clone())]);
        drop(builder);

        assert!(fx.registry.outcome(category).unwrap().is_asserted());
        assert!(fx.dom.find_by_id(&bst_id).is_some());
    }

    #[test]
    fn test_x509_token_without_bst_records_artifact_id() {
        let mut fx = Fixture::new();
        let token = fx.registry.register_token(
            IncludeToken::Never,
            TokenKind::X509(X509TokenPolicy {
                require_thumbprint_reference: true,
                ..Default::default()
            }),
        );
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::PlainEncrypted, vec![token]);
        let mut builder = fx.builder();
        let artifacts = builder
            .handle_supporting_tokens(SupportingTokenCategory::PlainEncrypted)
            .unwrap();
        let signature = artifacts[0].artifact.as_signature().unwrap();
        assert!(signature.bst.is_none());
        assert_eq!(builder.encrypted_token_ids, vec![signature.id.clone()]);

        let mut parts = Vec::new();
        builder.add_signature_parts(&artifacts, &mut parts);
        assert!(parts.is_empty());
    }

    #[test]
    fn test_pki_path_token_embeds_path() {
        let mut fx = Fixture::new();
        let token = fx.registry.register_token(
            IncludeToken::Always,
            TokenKind::X509(X509TokenPolicy {
                token_type: X509TokenType::PkiPathV1Token10,
                ..Default::default()
            }),
        );
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![token]);
        let artifacts = fx
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        let bst = artifacts[0].artifact.as_signature().unwrap().bst.clone().unwrap();
        assert_eq!(bst.value_type, wsbind_core::ns::token::X509_PKI_PATH_V1);
    }

    #[test]
    fn test_signature_failures_are_attributed() {
        let mut fx = Fixture::new();
        fx.exchange.config_mut().remove(config::SIGNATURE_PASSWORD);
        let token = fx
            .registry
            .register_token(IncludeToken::Always, TokenKind::X509(X509TokenPolicy::default()));
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![token.clone()]);
        fx.builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        assert_eq!(fx.registry.outcome(token.id).unwrap().reason(), Some("No password found."));

        let mut fx = Fixture::new();
        fx.exchange.config_mut().remove(config::SIGNATURE_CRYPTO);
        let token = fx
            .registry
            .register_token(IncludeToken::Always, TokenKind::X509(X509TokenPolicy::default()));
        let category = fx
            .registry
            .register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![token]);
        fx.builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        assert_eq!(
            fx.registry.outcome(category).unwrap().reason(),
            Some("No signature crypto configured")
        );
    }

    #[test]
    fn test_wrong_key_password_is_a_provider_failure() {
        let mut fx = Fixture::new();
        fx.exchange.config_mut().set(config::SIGNATURE_PASSWORD, "wrong");
        let token = fx
            .registry
            .register_token(IncludeToken::Always, TokenKind::X509(X509TokenPolicy::default()));
        fx.registry
            .register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![token.clone()]);
        let artifacts = fx
            .builder()
            .handle_supporting_tokens(SupportingTokenCategory::Endorsing)
            .unwrap();
        assert!(artifacts.is_empty());
        let reason = fx.registry.outcome(token.id).unwrap().reason().unwrap().to_string();
        assert!(reason.contains("alice"), "{}", reason);
    }

    #[test]
    fn test_encrypted_key_for_request_certificate() {
        crate::testing::init_tracing();
        let mut keystore = KeyStore::new("client");
        let certificate = keystore.derive("client", "CN=client", "other", None).clone();
        let mut fx = Fixture::responder(Vec::new());
        fx.exchange = fx.exchange.clone().with_inbound_results(vec![SecurityResult::Signature {
            value: vec![7],
            certificate: Some(certificate.clone()),
        }]);
        fx.exchange
            .config_mut()
            .set(config::ENCRYPT_USERNAME, config::USE_REQ_SIG_CERT);
        fx.exchange.config_mut().remove(config::ENCRYPT_CRYPTO);
        let wrapped = fx.registry.register_wrapped_token(
            wsbind_policy::WrapperRole::Recipient,
            IncludeToken::Never,
            TokenKind::X509(X509TokenPolicy {
                require_key_identifier_reference: true,
                ..Default::default()
            }),
        );
        let key = fx
            .builder()
            .encrypted_key_builder(wrapped.wrapper, &wrapped.token)
            .unwrap()
            .unwrap();
        assert_eq!(key.recipient, certificate);
        assert_eq!(key.key.len(), 32);
        assert_eq!(key.key_identifier, KeyIdentifierKind::SubjectKeyIdentifier);
        assert!(fx.dom.parent(key.element).is_none());
    }

    #[test]
    fn test_encrypted_key_without_user() {
        let mut fx = Fixture::new();
        fx.exchange.config_mut().remove(config::ENCRYPT_USERNAME);
        let wrapped = fx.registry.register_wrapped_token(
            wsbind_policy::WrapperRole::Encryption,
            IncludeToken::Always,
            TokenKind::X509(X509TokenPolicy::default()),
        );
        let key = fx
            .builder()
            .encrypted_key_builder(wrapped.wrapper, &wrapped.token)
            .unwrap();
        assert!(key.is_none());
        assert_eq!(
            fx.registry.outcome(wrapped.token.id).unwrap().reason(),
            Some("No encryption username found.")
        );
    }
}
