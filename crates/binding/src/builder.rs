//! The binding pass: turns the assertions of one effective policy into
//! security header content for one outbound message.
//!
//! # Order
//!
//! 1. Timestamp, then layout
//! 2. Signed parts, plus the timestamp
//! 3. Supporting tokens, all eight categories
//! 4. Encrypted parts and the encrypted key
//! 5. Primary signature
//! 6. Endorsing signatures over the primary signature
//! 7. Signature confirmation
//!
//! Failures are attributed to the assertion they violate and the pass moves
//! on. Only document mutations abort it.

use crate::error::{BindingError, BindingResult, Diagnostic};
use crate::exchange::Exchange;
use crate::header::SecurityHeader;
use crate::parts::{select_parts, SelectionMode};
use crate::tokens::{TokenArtifact, TokenArtifacts};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wsbind_core::config::DEFAULT_TIMESTAMP_TTL_SECS;
use wsbind_core::{Document, Namespaces};
use wsbind_crypto::{
    BuiltArtifact, CryptoProvider, PartReference, SignatureArtifact, TimestampArtifact,
};
use wsbind_policy::{
    Assertion, AssertionId, AssertionKind, AssertionRegistry, Binding, Layout,
    SupportingTokenCategory, Token, TokenKind, WrappedToken,
};

/// One endorsing signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Token whose key signed
    pub token: AssertionId,
    pub signature_id: String,
    /// Ids the signature covers, main signature first
    pub references: Vec<String>,
}

/// What a binding pass put into the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildOutput {
    pub timestamp_id: Option<String>,
    pub main_signature_id: Option<String>,
    /// Parts the primary signature was asked to cover
    pub signed_parts: Vec<PartReference>,
    pub encrypted_parts: Vec<PartReference>,
    /// Token ids an encryption step must cover
    pub encrypted_token_ids: Vec<String>,
    pub encrypted_key_id: Option<String>,
    pub endorsements: Vec<Endorsement>,
    pub confirmation_ids: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutput {
    pub fn signed_ids(&self) -> impl Iterator<Item = &str> {
        self.signed_parts.iter().map(|p| p.id.as_str())
    }
}

/// Drives one binding pass over one message.
///
/// The binding is shared and read-only; registry, exchange and document
/// belong to the exchange being processed.
pub struct BindingBuilder<'a> {
    pub(crate) binding: &'a Binding,
    pub(crate) registry: &'a mut AssertionRegistry,
    pub(crate) exchange: &'a mut Exchange,
    pub(crate) doc: &'a mut dyn Document,
    pub(crate) provider: &'a dyn CryptoProvider,
    pub(crate) header: SecurityHeader,
    pub(crate) encrypted_token_ids: Vec<String>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    timestamp: Option<TimestampArtifact>,
    main_signature_id: Option<String>,
    main_signature_references: Vec<String>,
    endorsements: Vec<Endorsement>,
}

impl<'a> BindingBuilder<'a> {
    pub fn new(
        binding: &'a Binding,
        registry: &'a mut AssertionRegistry,
        exchange: &'a mut Exchange,
        doc: &'a mut dyn Document,
        provider: &'a dyn CryptoProvider,
    ) -> BindingResult<Self> {
        let header = SecurityHeader::find_or_create(&mut *doc)?;
        Ok(Self {
            binding,
            registry,
            exchange,
            doc,
            provider,
            header,
            encrypted_token_ids: Vec::new(),
            diagnostics: Vec::new(),
            timestamp: None,
            main_signature_id: None,
            main_signature_references: Vec::new(),
            endorsements: Vec::new(),
        })
    }

    pub fn security_header(&self) -> &SecurityHeader {
        &self.header
    }

    pub fn main_signature_id(&self) -> Option<&str> {
        self.main_signature_id.as_deref()
    }

    /// Run the whole pass.
    pub fn build(mut self) -> BindingResult<BuildOutput> {
        info!(
            binding = ?self.binding.kind,
            suite = %self.binding.algorithm_suite.name,
            requestor = self.exchange.is_requestor(),
            "Starting binding pass"
        );
        self.handle_timestamp()?;
        self.handle_layout()?;

        let mut signed_parts = self.signed_parts()?;
        if let Some(timestamp) = &self.timestamp {
            signed_parts.push(PartReference::reference(timestamp.id.clone()));
        }

        let signed = self.handle_supporting_tokens(SupportingTokenCategory::Signed)?;
        let endorsing = self.handle_supporting_tokens(SupportingTokenCategory::Endorsing)?;
        let signed_endorsing = self.handle_supporting_tokens(SupportingTokenCategory::SignedEndorsing)?;
        let signed_encrypted = self.handle_supporting_tokens(SupportingTokenCategory::SignedEncrypted)?;
        let endorsing_encrypted =
            self.handle_supporting_tokens(SupportingTokenCategory::EndorsingEncrypted)?;
        let signed_endorsing_encrypted =
            self.handle_supporting_tokens(SupportingTokenCategory::SignedEndorsingEncrypted)?;
        self.handle_supporting_tokens(SupportingTokenCategory::Plain)?;
        self.handle_supporting_tokens(SupportingTokenCategory::PlainEncrypted)?;

        self.add_signature_parts(&signed, &mut signed_parts);
        self.add_signature_parts(&signed_encrypted, &mut signed_parts);
        self.add_signature_parts(&signed_endorsing, &mut signed_parts);
        self.add_signature_parts(&signed_endorsing_encrypted, &mut signed_parts);

        let encrypted_parts = self.encrypted_parts()?;
        let encrypted_key_id = self.handle_encrypted_key(&encrypted_parts)?;

        if let Some(wrapped) = self.binding.signature_token.clone() {
            if signed_parts.is_empty() {
                debug!("Nothing to sign, skipping primary signature");
            } else {
                self.do_signature(&wrapped, &signed_parts)?;
            }
        }

        self.do_endorsed_signatures(endorsing.into_iter().chain(endorsing_encrypted).collect())?;
        self.do_endorsed_signatures(
            signed_endorsing
                .into_iter()
                .chain(signed_endorsing_encrypted)
                .collect(),
        )?;

        let confirmation_ids = self.add_signature_confirmation(None)?;
        self.settle();

        let output = BuildOutput {
            timestamp_id: self.timestamp.as_ref().map(|t| t.id.clone()),
            main_signature_id: self.main_signature_id,
            signed_parts,
            encrypted_parts,
            encrypted_token_ids: self.encrypted_token_ids,
            encrypted_key_id,
            endorsements: self.endorsements,
            confirmation_ids,
            diagnostics: self.diagnostics,
        };
        info!(
            signed = output.signed_parts.len(),
            endorsements = output.endorsements.len(),
            diagnostics = output.diagnostics.len(),
            satisfied = self.registry.is_satisfied(),
            "Binding pass complete"
        );
        Ok(output)
    }

    /// Record a failure against `id`.
    pub(crate) fn not_asserted(&mut self, id: AssertionId, reason: impl Into<String>) {
        let reason = reason.into();
        self.registry.mark_not_asserted(id, reason.clone());
        self.diagnostics.push(Diagnostic::new(Some(id), reason));
    }

    fn assertion_ids(&self, kind: AssertionKind) -> Vec<AssertionId> {
        self.registry.find_all(kind).into_iter().map(|(id, _)| id).collect()
    }

    fn handle_timestamp(&mut self) -> BindingResult<()> {
        let ids = self.assertion_ids(AssertionKind::IncludeTimestamp);
        let Some(first) = ids.first().copied() else {
            return Ok(());
        };
        let ttl = match self.exchange.config().timestamp_ttl() {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(error = %e, "Using default timestamp lifetime");
                self.diagnostics.push(Diagnostic::new(Some(first), e.to_string()));
                DEFAULT_TIMESTAMP_TTL_SECS
            }
        };
        match self.provider.create_timestamp(&mut *self.doc, ttl) {
            Ok(timestamp) => {
                self.header.prepend(&mut *self.doc, timestamp.element)?;
                for id in ids {
                    self.registry.mark_asserted(id);
                }
                self.timestamp = Some(timestamp);
            }
            Err(e) => {
                for id in ids {
                    self.not_asserted(id, e.to_string());
                }
            }
        }
        Ok(())
    }

    fn handle_layout(&mut self) -> BindingResult<()> {
        let layouts: Vec<(AssertionId, Layout)> = self
            .registry
            .find_all(AssertionKind::Layout)
            .into_iter()
            .filter_map(|(id, assertion)| match assertion {
                Assertion::Layout(layout) => Some((id, *layout)),
                _ => None,
            })
            .collect();
        let timestamp = self.timestamp.as_ref().map(|t| t.element);
        for (id, layout) in layouts {
            match (layout, timestamp) {
                (Layout::LaxTimestampLast, Some(element)) => {
                    self.header.move_to_back(&mut *self.doc, element)?;
                    self.registry.mark_asserted(id);
                }
                (Layout::LaxTimestampFirst, Some(element)) => {
                    self.header.move_to_front(&mut *self.doc, element)?;
                    self.registry.mark_asserted(id);
                }
                (layout, None) if layout.requires_timestamp() => {
                    let err = BindingError::MissingRequiredTimestamp(layout);
                    self.not_asserted(id, err.to_string());
                }
                _ => self.registry.mark_asserted(id),
            }
        }
        Ok(())
    }

    /// Parts named by the `SignedParts` and `SignedElements` assertions.
    pub fn signed_parts(&mut self) -> BindingResult<Vec<PartReference>> {
        self.collect_parts(SelectionMode::Sign)
    }

    /// Parts named by the `EncryptedParts` and `EncryptedElements` assertions.
    pub fn encrypted_parts(&mut self) -> BindingResult<Vec<PartReference>> {
        self.collect_parts(SelectionMode::Encrypt)
    }

    fn collect_parts(&mut self, mode: SelectionMode) -> BindingResult<Vec<PartReference>> {
        let (parts_kind, elements_kind) = match mode {
            SelectionMode::Sign => (AssertionKind::SignedParts, AssertionKind::SignedElements),
            SelectionMode::Encrypt => (AssertionKind::EncryptedParts, AssertionKind::EncryptedElements),
        };

        let mut body = false;
        let mut headers = Vec::new();
        let mut xpaths = Vec::new();
        let mut namespaces = Namespaces::new();
        let mut parts_ids = Vec::new();
        let mut elements_ids = Vec::new();
        for (id, assertion) in self.registry.find_all(parts_kind) {
            if let Assertion::SignedParts(parts) | Assertion::EncryptedParts(parts) = assertion {
                body |= parts.body;
                headers.extend(parts.headers.iter().cloned());
            }
            parts_ids.push(id);
        }
        for (id, assertion) in self.registry.find_all(elements_kind) {
            if let Assertion::SignedElements(elements) | Assertion::EncryptedElements(elements) =
                assertion
            {
                xpaths.extend(elements.xpaths.iter().cloned());
                namespaces.extend(elements.namespaces.clone());
            }
            elements_ids.push(id);
        }
        if parts_ids.is_empty() && elements_ids.is_empty() {
            return Ok(Vec::new());
        }
        for id in parts_ids.iter().chain(&elements_ids) {
            self.registry.mark_asserted(*id);
        }

        let selection = select_parts(&mut *self.doc, mode, body, &headers, &xpaths, &namespaces)?;
        let attributed = elements_ids.first().copied();
        self.diagnostics.extend(
            selection
                .diagnostics
                .into_iter()
                .map(|message| Diagnostic::new(attributed, message)),
        );
        debug!(mode = ?mode, parts = selection.parts.len(), "Selected parts");
        Ok(selection.parts)
    }

    fn handle_encrypted_key(&mut self, encrypted_parts: &[PartReference]) -> BindingResult<Option<String>> {
        let Some(wrapped) = self.binding.encryption_token.clone() else {
            return Ok(None);
        };
        if encrypted_parts.is_empty() && self.encrypted_token_ids.is_empty() {
            return Ok(None);
        }
        let Some(key) = self.encrypted_key_builder(wrapped.wrapper, &wrapped.token)? else {
            return Ok(None);
        };
        self.header.prepend(&mut *self.doc, key.element)?;
        if let Some(bst) = &key.bst {
            self.header.prepend(&mut *self.doc, bst.element)?;
        }
        Ok(Some(key.id))
    }

    fn do_signature(&mut self, wrapped: &WrappedToken, parts: &[PartReference]) -> BindingResult<()> {
        if !matches!(wrapped.token.kind, TokenKind::X509(_)) {
            let err = BindingError::UnsupportedTokenKind(wrapped.token.kind.name().to_string());
            warn!(token = %wrapped.token.id, "{}", err);
            self.not_asserted(wrapped.token.id, err.to_string());
            return Ok(());
        }
        let Some(mut signature) = self.signature_builder(wrapped.wrapper, &wrapped.token)? else {
            return Ok(());
        };
        if let Some(bst) = &signature.bst {
            self.header.append(&mut *self.doc, bst.element)?;
        }
        if let Err(e) = self.provider.compute_signature(&mut *self.doc, &mut signature, parts) {
            let err = BindingError::from(e);
            warn!(token = %wrapped.token.id, error = %err, "Primary signature failed");
            self.not_asserted(wrapped.token.id, err.to_string());
            self.discard_bst(&signature)?;
            return Ok(());
        }
        self.header.append(&mut *self.doc, signature.element)?;
        if let Some(value) = signature.value.clone() {
            self.exchange.record_signature(value);
        }
        self.registry.mark_asserted(wrapped.token.id);
        self.registry.mark_asserted(wrapped.wrapper);
        debug!(id = %signature.id, references = signature.references.len(), "Primary signature done");
        self.main_signature_id = Some(signature.id);
        self.main_signature_references = signature.references;
        Ok(())
    }

    fn do_endorsed_signatures(&mut self, tokens: TokenArtifacts) -> BindingResult<()> {
        let token_protection = self.binding.is_token_protection();
        for TokenArtifact {
            category,
            token,
            artifact,
        } in tokens
        {
            let BuiltArtifact::Signature(mut signature) = artifact else {
                continue;
            };
            let Some(main) = self.main_signature_id.clone() else {
                let reason = "No main signature available to endorse";
                self.endorsement_failed(category, &token, &signature, reason)?;
                continue;
            };
            let mut parts = vec![PartReference::reference(main)];
            if token_protection {
                if let Some(bst) = signature.bst_id() {
                    parts.push(PartReference::reference(bst));
                }
            }
            if let Err(e) = self.provider.compute_signature(&mut *self.doc, &mut signature, &parts) {
                let reason = BindingError::from(e).to_string();
                self.endorsement_failed(category, &token, &signature, &reason)?;
                continue;
            }
            self.header.append(&mut *self.doc, signature.element)?;
            if let Some(value) = signature.value.clone() {
                self.exchange.record_signature(value);
            }
            debug!(token = %token.id, id = %signature.id, "Endorsed primary signature");
            self.endorsements.push(Endorsement {
                token: token.id,
                signature_id: signature.id,
                references: signature.references,
            });
        }
        Ok(())
    }

    /// Record an endorsing token that could not sign. Its category is no
    /// longer met, and its certificate goes unless the primary signature
    /// covers it.
    fn endorsement_failed(
        &mut self,
        category: AssertionId,
        token: &Token,
        signature: &SignatureArtifact,
        reason: &str,
    ) -> BindingResult<()> {
        warn!(token = %token.id, reason = %reason, "Endorsing signature failed");
        self.not_asserted(token.id, reason);
        self.not_asserted(category, format!("Token {} did not endorse the main signature", token.id));
        let covered = signature
            .bst_id()
            .map_or(false, |bst| self.main_signature_covers(bst));
        if !covered {
            self.discard_bst(signature)?;
        }
        Ok(())
    }

    fn main_signature_covers(&self, id: &str) -> bool {
        self.main_signature_references.iter().any(|r| r == id)
    }

    /// Take the certificate of an unused signature out of the header and
    /// out of the ids to encrypt.
    fn discard_bst(&mut self, signature: &SignatureArtifact) -> BindingResult<()> {
        let Some(bst) = &signature.bst else {
            return Ok(());
        };
        debug!(id = %bst.id, "Removing unused BinarySecurityToken");
        self.header.remove(&mut *self.doc, bst.element)?;
        self.encrypted_token_ids.retain(|id| *id != bst.id);
        Ok(())
    }

    /// Confirm every signature of the inbound message.
    ///
    /// Only runs when the WS-Security 1.1 assertion asks for confirmation.
    /// Without inbound signatures a single confirmation without a value is
    /// sent. The confirmation ids are returned and, when `parts` is given,
    /// added to it.
    pub fn add_signature_confirmation(
        &mut self,
        parts: Option<&mut Vec<PartReference>>,
    ) -> BindingResult<Vec<String>> {
        let Some((wss, caps)) = self.registry.find_wss() else {
            return Ok(Vec::new());
        };
        if !caps.requires_signature_confirmation() {
            return Ok(Vec::new());
        }
        let values: Vec<Vec<u8>> = self
            .exchange
            .inbound_signature_values()
            .into_iter()
            .map(<[u8]>::to_vec)
            .collect();
        let requests: Vec<Option<&[u8]>> = if values.is_empty() {
            vec![None]
        } else {
            values.iter().map(|v| Some(v.as_slice())).collect()
        };

        let mut ids = Vec::with_capacity(requests.len());
        for value in requests {
            match self.provider.create_signature_confirmation(&mut *self.doc, value) {
                Ok(confirmation) => {
                    self.header.prepend(&mut *self.doc, confirmation.element)?;
                    ids.push(confirmation.id);
                }
                Err(e) => self.not_asserted(wss, BindingError::from(e).to_string()),
            }
        }
        debug!(confirmations = ids.len(), "Added signature confirmations");
        if let Some(parts) = parts {
            parts.extend(ids.iter().cloned().map(PartReference::reference));
        }
        Ok(ids)
    }

    /// Assert what the pass used without judging it, so that nothing it is
    /// responsible for stays pending.
    fn settle(&mut self) {
        self.registry.mark_kind_asserted(AssertionKind::Wss10);
        self.registry.mark_kind_asserted(AssertionKind::Wss11);
        let binding = self.binding;
        for wrapped in binding
            .signature_token
            .iter()
            .chain(binding.encryption_token.iter())
        {
            self.registry.mark_asserted(wrapped.token.id);
            self.registry.mark_asserted(wrapped.wrapper);
        }
    }
}
