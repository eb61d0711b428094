//! Test utilities for binding pass integration tests

use base64::engine::general_purpose;
use base64::Engine as _;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::sync::Arc;
use wsbind_binding::{BindingBuilder, BuildOutput, Exchange, SecurityResult};
use wsbind_core::{ns, Document, Dom, NodeId, Password, SecurityConfig, SoapVersion};
use wsbind_crypto::{Certificate, KeyStore, SoftwareProvider};
use wsbind_policy::{
    AlgorithmSuite, AssertionRegistry, Binding, BindingKind, IncludeToken, TokenKind,
    WrappedToken, WrapperRole, X509TokenPolicy,
};

/// Namespace of the application headers and payload
pub const SERVICE_NS: &str = "urn:example:quotes";

/// Seed the client and service keys are derived from
pub const KEY_SEED: &str = "integration";

/// Configuration of the client side of an exchange.
///
/// The signing key is loaded through inline crypto properties, the service
/// certificate comes from a key store registered on the exchange.
pub const CLIENT_CONFIG: &str = r#"
[properties]
"ws-security.username" = "alice"
"ws-security.password" = "alice-password"
"ws-security.signature.password" = "alice-key"
"ws-security.signature.properties" = "client"
"ws-security.encryption.crypto" = "trust"
"ws-security.encryption.username" = "service"

[crypto.client]
"keystore.seed" = "integration"
"keystore.alias" = "alice"
"keystore.password" = "alice-key"
"#;

/// Install a test subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Certificate the client signs with
pub fn client_certificate() -> Certificate {
    let mut keystore = KeyStore::new("verify");
    keystore
        .derive("alice", "CN=alice", KEY_SEED, Some(Password::from("alice-key")))
        .clone()
}

/// Key store holding the service certificate only
pub fn trust_store() -> Arc<KeyStore> {
    let mut service = KeyStore::new("service");
    let certificate = service.derive("service", "CN=service", KEY_SEED, None).clone();
    let mut trust = KeyStore::new("trust");
    trust.insert_certificate("service", certificate);
    Arc::new(trust)
}

/// Outbound request with an `Action` header and a quote payload
pub fn request_message() -> Dom {
    let mut dom = Dom::soap_envelope(SoapVersion::Soap11);
    if let (Some(header), Some(body)) = (dom.header(), dom.body()) {
        let action = dom.add_element(header, SERVICE_NS, "q:Action").unwrap();
        dom.set_text(action, "urn:example:quotes/GetQuote").unwrap();
        let to = dom.add_element(header, SERVICE_NS, "q:To").unwrap();
        dom.set_text(to, "https://quotes.example.org/").unwrap();
        let request = dom.add_element(body, SERVICE_NS, "q:GetQuote").unwrap();
        let symbol = dom.add_element(request, SERVICE_NS, "q:Symbol").unwrap();
        dom.set_text(symbol, "WSB").unwrap();
    }
    dom
}

/// Everything one binding pass needs, owned in one place
pub struct Scenario {
    pub binding: Binding,
    pub registry: AssertionRegistry,
    pub exchange: Exchange,
    pub dom: Dom,
    pub provider: Arc<SoftwareProvider>,
}

impl Scenario {
    /// Client side of an exchange using [`CLIENT_CONFIG`]
    pub fn client() -> Self {
        let config = SecurityConfig::from_toml_str(CLIENT_CONFIG).unwrap();
        let provider = Arc::new(SoftwareProvider::new());
        let exchange = Exchange::requestor(config)
            .with_material_source(provider.clone())
            .with_crypto("trust", trust_store());
        Self {
            binding: Binding::new(BindingKind::Asymmetric, AlgorithmSuite::basic256()),
            registry: AssertionRegistry::new(),
            exchange,
            dom: request_message(),
            provider,
        }
    }

    /// Service side answering a request that carried these signatures
    pub fn service(inbound: Vec<(Vec<u8>, Certificate)>) -> Self {
        let mut scenario = Self::client();
        let results = inbound
            .into_iter()
            .map(|(value, certificate)| SecurityResult::Signature {
                value,
                certificate: Some(certificate),
            })
            .collect();
        let config = scenario.exchange.config().clone();
        scenario.exchange = Exchange::responder(config)
            .with_material_source(scenario.provider.clone())
            .with_crypto("trust", trust_store())
            .with_inbound_results(results);
        scenario
    }

    /// Register an X.509 binding token and make it the signature token
    pub fn sign_with_x509(&mut self, inclusion: IncludeToken) -> WrappedToken {
        let wrapped = self.registry.register_wrapped_token(
            WrapperRole::Initiator,
            inclusion,
            TokenKind::X509(X509TokenPolicy::default()),
        );
        self.binding = self.binding.clone().with_signature_token(wrapped.clone());
        wrapped
    }

    /// Register an X.509 binding token and make it the encryption token
    pub fn encrypt_with_x509(&mut self, policy: X509TokenPolicy) -> WrappedToken {
        let wrapped = self.registry.register_wrapped_token(
            WrapperRole::Recipient,
            IncludeToken::Never,
            TokenKind::X509(policy),
        );
        self.binding = self.binding.clone().with_encryption_token(wrapped.clone());
        wrapped
    }

    /// Run one binding pass over the message
    pub fn run(&mut self) -> BuildOutput {
        BindingBuilder::new(
            &self.binding,
            &mut self.registry,
            &mut self.exchange,
            &mut self.dom,
            self.provider.as_ref(),
        )
        .unwrap()
        .build()
        .unwrap()
    }

    /// The `wsse:Security` element, if any
    pub fn security(&self) -> Option<NodeId> {
        let header = self.dom.header()?;
        self.dom
            .child_elements(header)
            .into_iter()
            .find(|n| self.dom.has_name(*n, ns::WSSE, ns::node::SECURITY))
    }

    /// Children of the security header in document order
    pub fn security_children(&self) -> Vec<NodeId> {
        self.security()
            .map(|security| self.dom.child_elements(security))
            .unwrap_or_default()
    }

    /// Local names of the security header children
    pub fn layout(&self) -> Vec<String> {
        self.security_children()
            .into_iter()
            .map(|n| self.dom.local_name(n).to_string())
            .collect()
    }

    /// Position of the element with `id` among the security header children
    pub fn position(&self, id: &str) -> Option<usize> {
        let node = self.dom.find_by_id(id)?;
        self.security_children().iter().position(|n| *n == node)
    }

    /// `URI` values of the references of signature `id`, without the `#`
    pub fn references(&self, id: &str) -> Vec<String> {
        let Some(signature) = self.dom.find_by_id(id) else {
            return Vec::new();
        };
        let Some(signed_info) = self.child(signature, ns::DSIG, ns::node::SIGNED_INFO) else {
            return Vec::new();
        };
        self.dom
            .child_elements(signed_info)
            .into_iter()
            .filter(|n| self.dom.has_name(*n, ns::DSIG, ns::node::REFERENCE))
            .filter_map(|n| self.dom.attribute(n, "URI"))
            .map(|uri| uri.trim_start_matches('#').to_string())
            .collect()
    }

    /// Check the value of signature `id` against `certificate`
    pub fn verify_signature(&self, id: &str, certificate: &Certificate) -> bool {
        let Some(signature) = self.dom.find_by_id(id) else {
            return false;
        };
        let (Some(signed_info), Some(value)) = (
            self.child(signature, ns::DSIG, ns::node::SIGNED_INFO),
            self.child(signature, ns::DSIG, ns::node::SIGNATURE_VALUE),
        ) else {
            return false;
        };
        let Some(value) = self
            .dom
            .text(value)
            .and_then(|text| general_purpose::STANDARD.decode(text).ok())
        else {
            return false;
        };
        let Ok(public_key) = <[u8; 32]>::try_from(certificate.public_key.as_slice()) else {
            return false;
        };
        let (Ok(key), Ok(signature)) = (
            VerifyingKey::from_bytes(&public_key),
            Signature::from_slice(&value),
        ) else {
            return false;
        };
        key.verify(self.dom.serialize(signed_info).as_bytes(), &signature)
            .is_ok()
    }

    fn child(&self, parent: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
        self.dom
            .child_elements(parent)
            .into_iter()
            .find(|n| self.dom.has_name(*n, namespace, local))
    }
}
