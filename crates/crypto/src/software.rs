//! In-process crypto provider.
//!
//! Element structure follows WS-Security, and the algorithm URIs requested by
//! the binding are written into the elements as given. The values themselves
//! are always Ed25519 signatures over BLAKE3 reference digests. Key wrapping
//! uses ChaCha20-Poly1305 under a key derived from the recipient's public key,
//! so it demonstrates the header structure but protects nothing.

use crate::artifact::{
    BinarySecurityToken, ConfirmationArtifact, EncryptedKeyArtifact, KeyIdentifierKind,
    PartModifier, PartReference, PasswordType, SignatureArtifact, TimestampArtifact,
    UsernameArtifact,
};
use crate::error::{ProviderError, ProviderResult};
use crate::keystore::{Certificate, KeyStore};
use crate::provider::{
    CryptoMaterialSource, CryptoProvider, EncryptedKeyRequest, Recipient, SignatureRequest,
    UsernameTokenRequest,
};
use base64::engine::general_purpose;
use base64::Engine as _;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::Signer;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use wsbind_core::{ns, unique_id, CryptoProperties, Document, NodeId, Password};
use zeroize::Zeroizing;

/// Name of a key store registered with [`SoftwareProvider::with_keystore`]
pub const PROP_KEYSTORE_NAME: &str = "keystore.name";
/// Seed for a key store derived on load
pub const PROP_KEYSTORE_SEED: &str = "keystore.seed";
/// Alias of the derived key
pub const PROP_KEYSTORE_ALIAS: &str = "keystore.alias";
/// Password protecting the derived key
pub const PROP_KEYSTORE_PASSWORD: &str = "keystore.password";
/// Certificate subject of the derived key
pub const PROP_KEYSTORE_SUBJECT: &str = "keystore.subject";

const NONCE_SIZE: usize = 12;
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const KEY_WRAP_CONTEXT: &str = "wsbind software provider 2024 key wrap";

fn b64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

fn add_child(
    doc: &mut dyn Document,
    parent: NodeId,
    namespace: &str,
    qualified_name: &str,
) -> ProviderResult<NodeId> {
    let child = doc.create_element(Some(namespace), qualified_name);
    doc.append_child(parent, child)?;
    Ok(child)
}

fn add_text_child(
    doc: &mut dyn Document,
    parent: NodeId,
    namespace: &str,
    qualified_name: &str,
    text: &str,
) -> ProviderResult<NodeId> {
    let child = add_child(doc, parent, namespace, qualified_name)?;
    doc.set_text(child, text)?;
    Ok(child)
}

fn child_named(doc: &dyn Document, parent: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
    doc.child_elements(parent)
        .into_iter()
        .find(|c| doc.has_name(*c, namespace, local))
}

/// Software implementation of [`CryptoProvider`] and [`CryptoMaterialSource`].
#[derive(Debug, Default)]
pub struct SoftwareProvider {
    keystores: BTreeMap<String, Arc<KeyStore>>,
}

impl SoftwareProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `keystore` loadable through `keystore.name`.
    pub fn with_keystore(mut self, keystore: KeyStore) -> Self {
        self.keystores
            .insert(keystore.name().to_string(), Arc::new(keystore));
        self
    }

    pub fn keystore(&self, name: &str) -> Option<Arc<KeyStore>> {
        self.keystores.get(name).cloned()
    }

    fn binary_security_token(
        &self,
        doc: &mut dyn Document,
        certificate: &Certificate,
        single_certificate: bool,
        with_id: bool,
    ) -> ProviderResult<BinarySecurityToken> {
        let (value_type, encoded) = if single_certificate {
            (ns::token::X509_V3, certificate.encoded()?)
        } else {
            let path = serde_json::to_vec(&[certificate])
                .map_err(|e| ProviderError::Crypto(e.to_string()))?;
            (ns::token::X509_PKI_PATH_V1, path)
        };
        let element = doc.create_element(Some(ns::WSSE), "wsse:BinarySecurityToken");
        let id = if with_id {
            let id = unique_id(doc, "X509");
            doc.set_attribute_ns(element, ns::WSU, "wsu:Id", &id)?;
            id
        } else {
            String::new()
        };
        doc.set_attribute(element, "ValueType", value_type)?;
        doc.set_attribute(element, "EncodingType", ns::token::BASE64_BINARY)?;
        doc.set_text(element, &b64(&encoded))?;
        Ok(BinarySecurityToken {
            id,
            element,
            value_type: value_type.to_string(),
        })
    }

    /// Write `ds:KeyInfo` under `parent`, returning the embedded token if the
    /// key identifier references one.
    fn key_info(
        &self,
        doc: &mut dyn Document,
        parent: NodeId,
        kind: KeyIdentifierKind,
        certificate: &Certificate,
        single_certificate: bool,
    ) -> ProviderResult<Option<BinarySecurityToken>> {
        let key_info = add_child(doc, parent, ns::DSIG, "ds:KeyInfo")?;
        let str_element = add_child(doc, key_info, ns::WSSE, "wsse:SecurityTokenReference")?;
        match kind {
            KeyIdentifierKind::BstDirectReference => {
                let bst = self.binary_security_token(doc, certificate, single_certificate, true)?;
                let reference = add_child(doc, str_element, ns::WSSE, "wsse:Reference")?;
                doc.set_attribute(reference, "URI", &format!("#{}", bst.id))?;
                doc.set_attribute(reference, "ValueType", &bst.value_type)?;
                Ok(Some(bst))
            }
            KeyIdentifierKind::IssuerSerial => {
                let data = add_child(doc, str_element, ns::DSIG, "ds:X509Data")?;
                let issuer_serial = add_child(doc, data, ns::DSIG, "ds:X509IssuerSerial")?;
                add_text_child(doc, issuer_serial, ns::DSIG, "ds:X509IssuerName", &certificate.issuer)?;
                add_text_child(doc, issuer_serial, ns::DSIG, "ds:X509SerialNumber", &certificate.serial)?;
                Ok(None)
            }
            KeyIdentifierKind::SubjectKeyIdentifier => {
                let identifier = add_text_child(
                    doc,
                    str_element,
                    ns::WSSE,
                    "wsse:KeyIdentifier",
                    &b64(&certificate.subject_key_identifier()),
                )?;
                doc.set_attribute(identifier, "ValueType", ns::token::X509_SKI)?;
                doc.set_attribute(identifier, "EncodingType", ns::token::BASE64_BINARY)?;
                Ok(None)
            }
            KeyIdentifierKind::Thumbprint => {
                let identifier = add_text_child(
                    doc,
                    str_element,
                    ns::WSSE,
                    "wsse:KeyIdentifier",
                    &b64(&certificate.thumbprint()?),
                )?;
                doc.set_attribute(identifier, "ValueType", ns::token::THUMBPRINT)?;
                doc.set_attribute(identifier, "EncodingType", ns::token::BASE64_BINARY)?;
                Ok(None)
            }
            KeyIdentifierKind::EmbeddedCertificate => {
                let embedded = add_child(doc, str_element, ns::WSSE, "wsse:Embedded")?;
                let bst = self.binary_security_token(doc, certificate, single_certificate, false)?;
                doc.append_child(embedded, bst.element)?;
                Ok(None)
            }
        }
    }

    fn digest(&self, doc: &dyn Document, node: NodeId, modifier: PartModifier) -> Vec<u8> {
        let content = match modifier {
            PartModifier::Element => doc.serialize(node),
            PartModifier::Content => doc
                .child_elements(node)
                .into_iter()
                .map(|c| doc.serialize(c))
                .chain(doc.text(node).map(str::to_string))
                .collect(),
        };
        blake3::hash(content.as_bytes()).as_bytes().to_vec()
    }
}

/// Plaintext password digest as defined by the username token profile:
/// `Base64(SHA-256(nonce + created + password))`.
pub fn password_digest(nonce: &[u8], created: &str, password: &Password) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.expose().as_bytes());
    b64(&hasher.finalize())
}

/// Recover a session key wrapped by [`SoftwareProvider::prepare_encrypted_key`].
pub fn unwrap_key(wrapped: &[u8], recipient: &Certificate) -> ProviderResult<Zeroizing<Vec<u8>>> {
    if wrapped.len() < NONCE_SIZE {
        return Err(ProviderError::Crypto("wrapped key too short".to_string()));
    }
    let (nonce, ciphertext) = wrapped.split_at(NONCE_SIZE);
    let kek = Zeroizing::new(blake3::derive_key(KEY_WRAP_CONTEXT, &recipient.public_key));
    let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| ProviderError::Crypto(e.to_string()))
}

impl CryptoProvider for SoftwareProvider {
    fn create_timestamp(
        &self,
        doc: &mut dyn Document,
        ttl_secs: u64,
    ) -> ProviderResult<TimestampArtifact> {
        let created = chrono::Utc::now();
        let expires = created + chrono::Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64);
        let id = unique_id(doc, "TS");
        let element = doc.create_element(Some(ns::WSU), "wsu:Timestamp");
        doc.set_attribute_ns(element, ns::WSU, "wsu:Id", &id)?;
        add_text_child(doc, element, ns::WSU, "wsu:Created", &created.format(TIMESTAMP_FORMAT).to_string())?;
        add_text_child(doc, element, ns::WSU, "wsu:Expires", &expires.format(TIMESTAMP_FORMAT).to_string())?;
        debug!(id = %id, ttl_secs, "Created timestamp");
        Ok(TimestampArtifact {
            id,
            element,
            created,
            expires,
        })
    }

    fn create_username_token(
        &self,
        doc: &mut dyn Document,
        request: &UsernameTokenRequest,
    ) -> ProviderResult<UsernameArtifact> {
        let id = unique_id(doc, "UsernameToken");
        let element = doc.create_element(Some(ns::WSSE), "wsse:UsernameToken");
        doc.set_attribute_ns(element, ns::WSU, "wsu:Id", &id)?;
        add_text_child(doc, element, ns::WSSE, "wsse:Username", &request.username)?;

        let password = match (request.password_type, &request.password) {
            (PasswordType::None, _) => None,
            (kind, Some(password)) => Some((kind, password)),
            (_, None) => {
                return Err(ProviderError::Crypto(format!(
                    "Username token for '{}' requires a password",
                    request.username
                )))
            }
        };
        if let Some((kind, password)) = password {
            if kind == PasswordType::Digest {
                let mut nonce = [0u8; 16];
                OsRng.fill_bytes(&mut nonce);
                let created = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
                let value = password_digest(&nonce, &created, password);
                let node = add_text_child(doc, element, ns::WSSE, "wsse:Password", &value)?;
                doc.set_attribute(node, "Type", ns::token::PASSWORD_DIGEST)?;
                let nonce_node = add_text_child(doc, element, ns::WSSE, "wsse:Nonce", &b64(&nonce))?;
                doc.set_attribute(nonce_node, "EncodingType", ns::token::BASE64_BINARY)?;
                add_text_child(doc, element, ns::WSU, "wsu:Created", &created)?;
            } else {
                let node = add_text_child(doc, element, ns::WSSE, "wsse:Password", password.expose())?;
                doc.set_attribute(node, "Type", ns::token::PASSWORD_TEXT)?;
            }
        }
        debug!(id = %id, password_type = ?request.password_type, "Created username token");
        Ok(UsernameArtifact {
            id,
            element,
            username: request.username.clone(),
            password_type: request.password_type,
        })
    }

    fn prepare_signature(
        &self,
        doc: &mut dyn Document,
        request: &SignatureRequest,
        keystore: Arc<KeyStore>,
    ) -> ProviderResult<SignatureArtifact> {
        // Fail early on a wrong password rather than at compute time.
        keystore.signing_key(&request.user, &request.password)?;
        let certificate = keystore.certificate(&request.user)?.clone();

        let id = unique_id(doc, "SIG");
        let element = doc.create_element(Some(ns::DSIG), "ds:Signature");
        doc.set_attribute(element, ns::ID, &id)?;
        let signed_info = add_child(doc, element, ns::DSIG, "ds:SignedInfo")?;
        let c14n = add_child(doc, signed_info, ns::DSIG, "ds:CanonicalizationMethod")?;
        doc.set_attribute(c14n, "Algorithm", &request.c14n_algorithm)?;
        let method = add_child(doc, signed_info, ns::DSIG, "ds:SignatureMethod")?;
        doc.set_attribute(method, "Algorithm", &request.signature_algorithm)?;
        add_child(doc, element, ns::DSIG, "ds:SignatureValue")?;
        let bst = self.key_info(
            doc,
            element,
            request.key_identifier,
            &certificate,
            request.single_certificate,
        )?;
        debug!(
            id = %id,
            user = %request.user,
            key_identifier = %request.key_identifier,
            "Prepared signature"
        );
        Ok(SignatureArtifact {
            id,
            element,
            key_identifier: request.key_identifier,
            user: request.user.clone(),
            signature_algorithm: request.signature_algorithm.clone(),
            c14n_algorithm: request.c14n_algorithm.clone(),
            digest_algorithm: request.digest_algorithm.clone(),
            certificate,
            bst,
            references: Vec::new(),
            value: None,
            keystore,
            password: request.password.clone(),
        })
    }

    fn compute_signature(
        &self,
        doc: &mut dyn Document,
        signature: &mut SignatureArtifact,
        parts: &[PartReference],
    ) -> ProviderResult<()> {
        if signature.is_computed() {
            return Err(ProviderError::AlreadyComputed(signature.id.clone()));
        }
        let signed_info = child_named(doc, signature.element, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| ProviderError::UnresolvedReference(format!("{}/SignedInfo", signature.id)))?;
        let value_node = child_named(doc, signature.element, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .ok_or_else(|| ProviderError::UnresolvedReference(format!("{}/SignatureValue", signature.id)))?;

        let mut digests = Vec::with_capacity(parts.len());
        for part in parts {
            let node = part
                .node
                .or_else(|| doc.find_by_id(&part.id))
                .ok_or_else(|| ProviderError::UnresolvedReference(part.id.clone()))?;
            digests.push((part.id.clone(), self.digest(doc, node, part.modifier)));
        }
        for (id, digest) in &digests {
            let reference = add_child(doc, signed_info, ns::DSIG, "ds:Reference")?;
            doc.set_attribute(reference, "URI", &format!("#{}", id))?;
            let method = add_child(doc, reference, ns::DSIG, "ds:DigestMethod")?;
            doc.set_attribute(method, "Algorithm", &signature.digest_algorithm)?;
            add_text_child(doc, reference, ns::DSIG, "ds:DigestValue", &b64(digest))?;
        }

        let key = signature
            .keystore
            .signing_key(&signature.user, &signature.password)?;
        let value = key.sign(doc.serialize(signed_info).as_bytes()).to_bytes().to_vec();
        doc.set_text(value_node, &b64(&value))?;
        signature.references = digests.into_iter().map(|(id, _)| id).collect();
        signature.value = Some(value);
        debug!(id = %signature.id, references = signature.references.len(), "Computed signature");
        Ok(())
    }

    fn prepare_encrypted_key(
        &self,
        doc: &mut dyn Document,
        request: &EncryptedKeyRequest,
        keystore: &KeyStore,
    ) -> ProviderResult<EncryptedKeyArtifact> {
        let recipient = match &request.recipient {
            Recipient::Alias(alias) => keystore.certificate(alias)?.clone(),
            Recipient::Certificate(certificate) => certificate.clone(),
        };
        if request.key_size == 0 || request.key_size % 8 != 0 || request.key_size > 512 {
            return Err(ProviderError::Unsupported(format!(
                "symmetric key length of {} bits",
                request.key_size
            )));
        }

        let mut key = Zeroizing::new(vec![0u8; (request.key_size / 8) as usize]);
        OsRng.fill_bytes(key.as_mut_slice());
        let kek = Zeroizing::new(blake3::derive_key(KEY_WRAP_CONTEXT, &recipient.public_key));
        let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), key.as_slice())
            .map_err(|e| ProviderError::Crypto(e.to_string()))?;
        let mut wrapped_key = nonce.to_vec();
        wrapped_key.extend_from_slice(&ciphertext);

        let id = unique_id(doc, "EK");
        let element = doc.create_element(Some(ns::XENC), "xenc:EncryptedKey");
        doc.set_attribute(element, ns::ID, &id)?;
        let method = add_child(doc, element, ns::XENC, "xenc:EncryptionMethod")?;
        doc.set_attribute(method, "Algorithm", &request.key_wrap_algorithm)?;
        let bst = self.key_info(doc, element, request.key_identifier, &recipient, true)?;
        let cipher_data = add_child(doc, element, ns::XENC, "xenc:CipherData")?;
        add_text_child(doc, cipher_data, ns::XENC, "xenc:CipherValue", &b64(&wrapped_key))?;
        debug!(id = %id, recipient = %recipient.subject, "Prepared encrypted key");
        Ok(EncryptedKeyArtifact {
            id,
            element,
            key_identifier: request.key_identifier,
            recipient,
            key_wrap_algorithm: request.key_wrap_algorithm.clone(),
            key,
            wrapped_key,
            bst,
        })
    }

    fn create_signature_confirmation(
        &self,
        doc: &mut dyn Document,
        value: Option<&[u8]>,
    ) -> ProviderResult<ConfirmationArtifact> {
        let id = unique_id(doc, "SC");
        let element = doc.create_element(Some(ns::WSSE11), "wsse11:SignatureConfirmation");
        doc.set_attribute_ns(element, ns::WSU, "wsu:Id", &id)?;
        if let Some(value) = value {
            doc.set_attribute(element, "Value", &b64(value))?;
        }
        Ok(ConfirmationArtifact {
            id,
            element,
            value: value.map(<[u8]>::to_vec),
        })
    }
}

impl CryptoMaterialSource for SoftwareProvider {
    fn load(&self, properties: &CryptoProperties) -> ProviderResult<Arc<KeyStore>> {
        if let Some(name) = properties.get(PROP_KEYSTORE_NAME) {
            return self
                .keystore(name)
                .ok_or_else(|| ProviderError::CryptoMaterial(format!("Unknown keystore '{}'", name)));
        }
        let seed = properties.get(PROP_KEYSTORE_SEED).ok_or_else(|| {
            ProviderError::CryptoMaterial(format!(
                "Either {} or {} must be set",
                PROP_KEYSTORE_NAME, PROP_KEYSTORE_SEED
            ))
        })?;
        let alias = properties
            .get(PROP_KEYSTORE_ALIAS)
            .ok_or_else(|| ProviderError::CryptoMaterial(format!("{} is required", PROP_KEYSTORE_ALIAS)))?;
        let subject = properties
            .get(PROP_KEYSTORE_SUBJECT)
            .cloned()
            .unwrap_or_else(|| format!("CN={}", alias));
        let password = properties
            .get(PROP_KEYSTORE_PASSWORD)
            .map(|p| Password::new(p.as_str()));
        let mut keystore = KeyStore::new(format!("seed:{}", alias));
        keystore.derive(alias, &subject, seed, password);
        Ok(Arc::new(keystore))
    }
}
