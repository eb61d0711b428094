//! Message-scoped context of one binding pass.

use crate::credentials::{CredentialCallback, CredentialResolver};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use wsbind_core::SecurityConfig;
use wsbind_crypto::{Certificate, CryptoMaterialSource, KeyStore};

/// Outcome of processing the security header of the inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityResult {
    /// A verified signature
    Signature {
        value: Vec<u8>,
        certificate: Option<Certificate>,
    },
    /// An accepted username token
    UsernameToken { username: String },
}

/// Everything a binding pass knows about the exchange it runs in.
///
/// Create one per exchange. Nothing in here is shared between exchanges
/// except the `Arc`ed collaborators.
#[derive(Clone, Default)]
pub struct Exchange {
    config: SecurityConfig,
    requestor: bool,
    callback: Option<Arc<dyn CredentialCallback>>,
    material: Option<Arc<dyn CryptoMaterialSource>>,
    crypto: BTreeMap<String, Arc<KeyStore>>,
    inbound: Option<Vec<SecurityResult>>,
    sent_signatures: Vec<Vec<u8>>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("config", &self.config)
            .field("requestor", &self.requestor)
            .field("has_callback", &self.callback.is_some())
            .field("has_material_source", &self.material.is_some())
            .field("crypto", &self.crypto.keys().collect::<Vec<_>>())
            .field("inbound", &self.inbound)
            .field("sent_signatures", &self.sent_signatures.len())
            .finish()
    }
}

impl Exchange {
    /// Exchange on the initiating side.
    pub fn requestor(config: SecurityConfig) -> Self {
        Self {
            config,
            requestor: true,
            ..Default::default()
        }
    }

    /// Exchange on the responding side.
    pub fn responder(config: SecurityConfig) -> Self {
        Self {
            config,
            requestor: false,
            ..Default::default()
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn CredentialCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_material_source(mut self, material: Arc<dyn CryptoMaterialSource>) -> Self {
        self.material = Some(material);
        self
    }

    /// Register a ready key store under `name`, for the `*.crypto` keys.
    pub fn with_crypto(mut self, name: impl Into<String>, keystore: Arc<KeyStore>) -> Self {
        self.crypto.insert(name.into(), keystore);
        self
    }

    /// Results of the inbound message this exchange answers.
    pub fn with_inbound_results(mut self, results: Vec<SecurityResult>) -> Self {
        self.inbound = Some(results);
        self
    }

    pub fn is_requestor(&self) -> bool {
        self.requestor
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SecurityConfig {
        &mut self.config
    }

    pub fn callback(&self) -> Option<&dyn CredentialCallback> {
        self.callback.as_deref()
    }

    pub fn material_source(&self) -> Option<&dyn CryptoMaterialSource> {
        self.material.as_deref()
    }

    pub fn crypto(&self, name: &str) -> Option<Arc<KeyStore>> {
        self.crypto.get(name).cloned()
    }

    pub fn inbound_results(&self) -> Option<&[SecurityResult]> {
        self.inbound.as_deref()
    }

    /// Signature values of the inbound message, in order.
    pub fn inbound_signature_values(&self) -> Vec<&[u8]> {
        self.inbound
            .iter()
            .flatten()
            .filter_map(|result| match result {
                SecurityResult::Signature { value, .. } => Some(value.as_slice()),
                SecurityResult::UsernameToken { .. } => None,
            })
            .collect()
    }

    /// Signature values produced for the outbound message, in order.
    pub fn sent_signatures(&self) -> &[Vec<u8>] {
        &self.sent_signatures
    }

    pub(crate) fn record_signature(&mut self, value: Vec<u8>) {
        self.sent_signatures.push(value);
    }

    /// Credential lookups against this exchange.
    pub fn credentials(&self) -> CredentialResolver<'_> {
        CredentialResolver::new(self)
    }
}
