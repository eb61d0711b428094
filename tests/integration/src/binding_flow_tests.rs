//! End-to-end binding passes over complete policies
//!
//! Each test registers the assertions of one effective policy, runs a pass
//! over a fresh request and checks the header and the recorded outcomes.

use crate::test_utils::*;
use base64::engine::general_purpose;
use base64::Engine as _;
use wsbind_core::{config, ns, Document, Namespaces};
use wsbind_crypto::PartModifier;
use wsbind_policy::{
    Assertion, Elements, HeaderPart, IncludeToken, Layout, Parts, SupportingTokenCategory,
    TokenKind, UsernameTokenPolicy, WssCapabilities, WssVersion, X509TokenPolicy,
};

fn username(hash_password: bool) -> TokenKind {
    TokenKind::Username(UsernameTokenPolicy {
        no_password: false,
        hash_password,
    })
}

fn x509() -> TokenKind {
    TokenKind::X509(X509TokenPolicy::default())
}

#[test]
fn test_full_asymmetric_request() {
    init_tracing();
    let mut scenario = Scenario::client();
    let registry = &mut scenario.registry;
    registry.register(Assertion::IncludeTimestamp);
    let layout = registry.register(Assertion::Layout(Layout::LaxTimestampFirst));
    let wss = registry.register(Assertion::Wss(WssCapabilities {
        version: WssVersion::Wss11,
        must_support_ref_thumbprint: true,
        ..Default::default()
    }));
    registry.register(Assertion::SignedParts(Parts {
        body: true,
        headers: vec![HeaderPart::named(SERVICE_NS, "Action")],
    }));
    registry.register(Assertion::EncryptedParts(Parts {
        body: true,
        headers: Vec::new(),
    }));
    let user = registry.register_token(IncludeToken::AlwaysToRecipient, username(true));
    registry.register_supporting_tokens(SupportingTokenCategory::Signed, vec![user]);
    let endorsing = registry.register_token(IncludeToken::AlwaysToRecipient, x509());
    registry.register_supporting_tokens(SupportingTokenCategory::Endorsing, vec![endorsing.clone()]);
    scenario.sign_with_x509(IncludeToken::AlwaysToRecipient);
    scenario.encrypt_with_x509(X509TokenPolicy::default());
    scenario.binding = scenario.binding.clone().with_token_protection(true);

    let output = scenario.run();

    assert!(scenario.registry.is_satisfied(), "{:?}", scenario.registry.violations());
    assert!(scenario.registry.validate().is_ok());
    assert!(scenario.registry.outcome(layout).unwrap().is_asserted());
    assert!(scenario.registry.outcome(wss).unwrap().is_asserted());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    // Timestamp pinned in front of everything prepended later.
    let layout = scenario.layout();
    assert_eq!(layout[0], "Timestamp");
    assert_eq!(layout.iter().filter(|name| *name == "Timestamp").count(), 1);
    assert_eq!(layout.iter().filter(|name| *name == "EncryptedKey").count(), 1);
    assert_eq!(layout.iter().filter(|name| *name == "Signature").count(), 2);

    // The primary signature covers body, Action header and timestamp.
    let main = output.main_signature_id.clone().unwrap();
    let references = scenario.references(&main);
    let body_id = output.signed_parts[0].id.clone();
    assert_eq!(
        scenario.dom.find_by_id(&body_id),
        scenario.dom.body(),
    );
    assert!(references.contains(output.timestamp_id.as_ref().unwrap()));
    assert_eq!(references.len(), 3);
    assert!(scenario.verify_signature(&main, &client_certificate()));

    // The endorsing signature follows and covers the primary signature and,
    // under token protection, its own certificate.
    assert_eq!(output.endorsements.len(), 1);
    let endorsement = &output.endorsements[0];
    assert_eq!(endorsement.token, endorsing.id);
    assert_eq!(endorsement.references[0], main);
    assert_eq!(endorsement.references.len(), 2);
    assert!(scenario.position(&main) < scenario.position(&endorsement.signature_id));
    assert!(scenario.verify_signature(&endorsement.signature_id, &client_certificate()));
    assert_eq!(scenario.exchange.sent_signatures().len(), 2);

    // Body encrypted as content for the service certificate.
    assert_eq!(output.encrypted_parts.len(), 1);
    assert_eq!(output.encrypted_parts[0].id, body_id);
    assert_eq!(output.encrypted_parts[0].modifier, PartModifier::Content);
    let key_id = output.encrypted_key_id.clone().unwrap();
    assert_eq!(scenario.position(&key_id), Some(1));

    let xml = scenario.dom.to_xml();
    assert!(xml.contains(ns::token::PASSWORD_DIGEST));
    assert!(xml.contains(ns::token::THUMBPRINT));
    assert!(!xml.contains("alice-password"));
}

#[test]
fn test_missing_password_is_attributed() {
    let mut scenario = Scenario::client();
    scenario.exchange.config_mut().remove(config::PASSWORD);
    let token = scenario
        .registry
        .register_token(IncludeToken::Always, username(false));
    let category = scenario
        .registry
        .register_supporting_tokens(SupportingTokenCategory::Plain, vec![token.clone()]);

    let output = scenario.run();

    assert_eq!(
        scenario.registry.outcome(token.id).unwrap().reason(),
        Some("No password available")
    );
    assert_eq!(
        scenario.registry.outcome(category).unwrap().reason(),
        Some("1 of 1 SupportingTokens could not be built")
    );
    assert!(!scenario.registry.is_satisfied());
    assert!(scenario.layout().is_empty());

    let messages: Vec<_> = output.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["No password available", "1 of 1 SupportingTokens could not be built"]
    );

    let report = serde_json::to_value(scenario.registry.report()).unwrap();
    assert_eq!(report["entries"][token.id.0]["outcome"]["state"], "not_asserted");
}

#[test]
fn test_lax_timestamp_last_without_timestamp() {
    let mut scenario = Scenario::client();
    let layout = scenario
        .registry
        .register(Assertion::Layout(Layout::LaxTimestampLast));
    scenario.registry.register(Assertion::SignedParts(Parts {
        body: true,
        headers: Vec::new(),
    }));
    scenario.sign_with_x509(IncludeToken::Always);

    let output = scenario.run();

    assert_eq!(
        scenario.registry.outcome(layout).unwrap().reason(),
        Some("LaxTsLast requires a timestamp")
    );
    assert!(output.timestamp_id.is_none());
    // The rest of the pass is unaffected.
    assert!(output.main_signature_id.is_some());
    assert_eq!(scenario.registry.violations().len(), 1);
}

#[test]
fn test_lax_timestamp_last_keeps_timestamp_at_the_end() {
    let mut scenario = Scenario::client();
    scenario.registry.register(Assertion::IncludeTimestamp);
    scenario
        .registry
        .register(Assertion::Layout(Layout::LaxTimestampLast));
    scenario.registry.register(Assertion::SignedParts(Parts {
        body: true,
        headers: Vec::new(),
    }));
    let endorsing = scenario.registry.register_token(IncludeToken::Always, x509());
    scenario
        .registry
        .register_supporting_tokens(SupportingTokenCategory::SignedEndorsing, vec![endorsing]);
    scenario.sign_with_x509(IncludeToken::Always);

    let output = scenario.run();

    assert!(scenario.registry.is_satisfied(), "{:?}", scenario.registry.violations());
    assert_eq!(scenario.layout().last().map(String::as_str), Some("Timestamp"));
    let main = output.main_signature_id.unwrap();
    // Signed endorsing certificates are covered by the primary signature.
    let endorsing_bst = scenario.references(&main).into_iter().find(|id| {
        scenario
            .dom
            .find_by_id(id)
            .map_or(false, |n| scenario.dom.local_name(n) == "BinarySecurityToken")
    });
    assert!(endorsing_bst.is_some());
    assert_eq!(output.endorsements[0].references, vec![main]);
}

#[test]
fn test_encrypted_categories_track_token_ids() {
    let mut scenario = Scenario::client();
    let user = scenario
        .registry
        .register_token(IncludeToken::Always, username(false));
    scenario
        .registry
        .register_supporting_tokens(SupportingTokenCategory::SignedEncrypted, vec![user]);
    let endorsing = scenario.registry.register_token(IncludeToken::Always, x509());
    let endorsing_category = scenario.registry.register_supporting_tokens(
        SupportingTokenCategory::EndorsingEncrypted,
        vec![endorsing],
    );
    let plain = scenario
        .registry
        .register_token(IncludeToken::Always, username(false));
    scenario
        .registry
        .register_supporting_tokens(SupportingTokenCategory::Plain, vec![plain]);
    scenario.encrypt_with_x509(X509TokenPolicy {
        require_issuer_serial_reference: true,
        ..Default::default()
    });

    let output = scenario.run();

    // No encrypted parts, but the tokens still need a key.
    assert!(output.encrypted_parts.is_empty());
    assert!(output.encrypted_key_id.is_some());
    // Nothing to endorse without a primary signature, so the endorsing
    // certificate is taken out again.
    assert!(output.endorsements.is_empty());
    assert_eq!(
        scenario.registry.violations()[0].2,
        "No main signature available to endorse"
    );
    assert!(!scenario
        .registry
        .outcome(endorsing_category)
        .unwrap()
        .is_asserted());
    let names: Vec<_> = output
        .encrypted_token_ids
        .iter()
        .map(|id| scenario.dom.local_name(scenario.dom.find_by_id(id).unwrap()).to_string())
        .collect();
    assert_eq!(names, vec!["UsernameToken"]);
    assert!(scenario
        .layout()
        .iter()
        .all(|name| name != "BinarySecurityToken"));
}

#[test]
fn test_service_confirms_and_encrypts_for_requester() {
    let requester = client_certificate();
    let mut scenario = Scenario::service(vec![
        (vec![0xAA; 64], requester.clone()),
        (vec![0xBB; 64], requester.clone()),
    ]);
    scenario
        .exchange
        .config_mut()
        .set(config::ENCRYPT_USERNAME, config::USE_REQ_SIG_CERT);
    scenario.registry.register(Assertion::Wss(WssCapabilities {
        version: WssVersion::Wss11,
        must_support_ref_key_identifier: true,
        require_signature_confirmation: true,
        ..Default::default()
    }));
    scenario.registry.register(Assertion::EncryptedParts(Parts {
        body: true,
        headers: Vec::new(),
    }));
    let user = scenario
        .registry
        .register_token(IncludeToken::Always, username(false));
    scenario
        .registry
        .register_supporting_tokens(SupportingTokenCategory::Signed, vec![user]);
    scenario.encrypt_with_x509(X509TokenPolicy::default());

    let output = scenario.run();

    assert!(scenario.registry.is_satisfied(), "{:?}", scenario.registry.violations());
    assert_eq!(output.confirmation_ids.len(), 2);
    let layout = scenario.layout();
    assert_eq!(layout[0], "SignatureConfirmation");
    assert_eq!(layout[1], "SignatureConfirmation");
    assert!(layout.contains(&"EncryptedKey".to_string()));
    // The service never sends username tokens.
    assert!(!layout.contains(&"UsernameToken".to_string()));

    let xml = scenario.dom.to_xml();
    assert!(xml.contains(ns::token::X509_SKI));
    let identifier = general_purpose::STANDARD.encode(requester.subject_key_identifier());
    assert!(xml.contains(&identifier));
}

#[test]
fn test_username_primary_token_is_not_supported() {
    let mut scenario = Scenario::client();
    scenario.registry.register(Assertion::SignedParts(Parts {
        body: true,
        headers: Vec::new(),
    }));
    let wrapped = scenario.registry.register_wrapped_token(
        wsbind_policy::WrapperRole::Initiator,
        IncludeToken::Always,
        username(false),
    );
    scenario.binding = scenario.binding.clone().with_signature_token(wrapped.clone());

    let output = scenario.run();

    assert!(output.main_signature_id.is_none());
    assert_eq!(
        scenario.registry.outcome(wrapped.token.id).unwrap().reason(),
        Some("UsernameToken not yet supported")
    );
    assert!(scenario.layout().iter().all(|name| name != "Signature"));
}

#[test]
fn test_signed_elements_skip_failed_expressions() {
    let mut scenario = Scenario::client();
    let mut namespaces = Namespaces::new();
    namespaces.insert("q".to_string(), SERVICE_NS.to_string());
    namespaces.insert("soap".to_string(), ns::SOAP11_ENV.to_string());
    let elements = scenario.registry.register(Assertion::SignedElements(Elements {
        xpaths: vec![
            "//q:Symbol".to_string(),
            "//q:Missing[".to_string(),
            "/soap:Envelope/soap:Header/q:To".to_string(),
        ],
        namespaces,
    }));
    scenario.registry.register(Assertion::SignedParts(Parts {
        body: false,
        headers: vec![HeaderPart::named(SERVICE_NS, "To")],
    }));
    scenario.sign_with_x509(IncludeToken::Always);

    let output = scenario.run();

    // `To` is selected by both the header part and an expression.
    let names: Vec<_> = output
        .signed_parts
        .iter()
        .map(|part| scenario.dom.local_name(scenario.dom.find_by_id(&part.id).unwrap()).to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Symbol".to_string()));
    assert!(names.contains(&"To".to_string()));

    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].assertion, Some(elements));
    assert!(output.diagnostics[0].message.contains("//q:Missing["));
    assert!(scenario.registry.outcome(elements).unwrap().is_asserted());
    assert!(scenario.verify_signature(output.main_signature_id.as_ref().unwrap(), &client_certificate()));
}
