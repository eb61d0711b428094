//! Shared fixtures for the unit tests of this crate.

use crate::builder::{BindingBuilder, BuildOutput};
use crate::error::BindingResult;
use crate::exchange::{Exchange, SecurityResult};
use std::sync::Arc;
use wsbind_core::{config, ns, Document, Dom, NodeId, Password, SecurityConfig, SoapVersion};
use wsbind_crypto::{KeyStore, SoftwareProvider};
use wsbind_policy::{
    AssertionRegistry, Binding, BindingKind, AlgorithmSuite, IncludeToken, TokenKind,
    WrappedToken, WrapperRole, X509TokenPolicy,
};

pub(crate) const EX: &str = "urn:example:service";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub(crate) fn keystore() -> Arc<KeyStore> {
    let mut keystore = KeyStore::new("fixture");
    keystore.derive("alice", "CN=alice", "fixture", Some(Password::from("alice-key")));
    keystore.derive("bob", "CN=bob", "fixture", None);
    Arc::new(keystore)
}

pub(crate) fn config() -> SecurityConfig {
    SecurityConfig::new()
        .with(config::USERNAME, "alice")
        .with(config::PASSWORD, "alice-password")
        .with(config::SIGNATURE_PASSWORD, "alice-key")
        .with(config::SIGNATURE_CRYPTO, "main")
        .with(config::ENCRYPT_CRYPTO, "main")
        .with(config::ENCRYPT_USERNAME, "bob")
}

pub(crate) fn message() -> Dom {
    let mut dom = Dom::soap_envelope(SoapVersion::Soap11);
    if let (Some(header), Some(body)) = (dom.header(), dom.body()) {
        let action = dom.add_element(header, EX, "ex:Action").unwrap();
        dom.set_text(action, "urn:example:service/Echo").unwrap();
        let payload = dom.add_element(body, EX, "ex:Echo").unwrap();
        dom.set_text(payload, "hello").unwrap();
    }
    dom
}

pub(crate) struct Fixture {
    pub binding: Binding,
    pub registry: AssertionRegistry,
    pub exchange: Exchange,
    pub dom: Dom,
    pub provider: SoftwareProvider,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_exchange(Exchange::requestor(config()).with_crypto("main", keystore()))
    }

    /// Responding side that received signatures with these values.
    pub fn responder(inbound: Vec<Vec<u8>>) -> Self {
        let results = inbound
            .into_iter()
            .map(|value| SecurityResult::Signature {
                value,
                certificate: None,
            })
            .collect();
        Self::with_exchange(
            Exchange::responder(config())
                .with_crypto("main", keystore())
                .with_inbound_results(results),
        )
    }

    fn with_exchange(exchange: Exchange) -> Self {
        Self {
            binding: Binding::new(BindingKind::Asymmetric, AlgorithmSuite::basic256()),
            registry: AssertionRegistry::new(),
            exchange,
            dom: message(),
            provider: SoftwareProvider::new(),
        }
    }

    pub fn with_signature_token(&mut self, inclusion: IncludeToken) -> WrappedToken {
        let wrapped = self.registry.register_wrapped_token(
            WrapperRole::Initiator,
            inclusion,
            TokenKind::X509(X509TokenPolicy::default()),
        );
        self.binding = self.binding.clone().with_signature_token(wrapped.clone());
        wrapped
    }

    pub fn builder(&mut self) -> BindingBuilder<'_> {
        BindingBuilder::new(
            &self.binding,
            &mut self.registry,
            &mut self.exchange,
            &mut self.dom,
            &self.provider,
        )
        .unwrap()
    }

    pub fn build(&mut self) -> BindingResult<BuildOutput> {
        self.builder().build()
    }

    pub fn security_children(&self) -> Vec<NodeId> {
        let Some(header) = self.dom.header() else {
            return Vec::new();
        };
        self.dom
            .child_elements(header)
            .into_iter()
            .find(|n| self.dom.has_name(*n, ns::WSSE, ns::node::SECURITY))
            .map(|security| self.dom.child_elements(security))
            .unwrap_or_default()
    }
}
