//! Properties every binding pass upholds, whatever the policy
//!
//! Policies are generated from a handful of switches; each generated pass
//! must leave no assertion pending and produce a well-formed header.

use crate::test_utils::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use wsbind_core::Document;
use wsbind_policy::{
    Assertion, HeaderPart, IncludeToken, Layout, Parts, SupportingTokenCategory, TokenKind,
    UsernameTokenPolicy, WssCapabilities, WssVersion, X509TokenPolicy,
};

#[derive(Debug, Clone)]
struct PolicySwitches {
    timestamp: bool,
    layout: Layout,
    sign_body: bool,
    sign_action: bool,
    primary: Option<IncludeToken>,
    username: Option<SupportingTokenCategory>,
    endorsing: Option<SupportingTokenCategory>,
    encrypt_body: bool,
    wss11: bool,
    token_protection: bool,
}

fn layouts() -> impl Strategy<Value = Layout> {
    prop_oneof![
        Just(Layout::Strict),
        Just(Layout::Lax),
        Just(Layout::LaxTimestampFirst),
        Just(Layout::LaxTimestampLast),
    ]
}

fn inclusions() -> impl Strategy<Value = IncludeToken> {
    prop_oneof![
        Just(IncludeToken::Never),
        Just(IncludeToken::Always),
        Just(IncludeToken::AlwaysToRecipient),
    ]
}

fn categories() -> impl Strategy<Value = SupportingTokenCategory> {
    (0..SupportingTokenCategory::ALL.len()).prop_map(|i| SupportingTokenCategory::ALL[i])
}

fn switches() -> impl Strategy<Value = PolicySwitches> {
    (
        any::<bool>(),
        layouts(),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(inclusions()),
        proptest::option::of(categories()),
        proptest::option::of(categories()),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(
                timestamp,
                layout,
                sign_body,
                sign_action,
                primary,
                username,
                endorsing,
                encrypt_body,
                wss11,
                token_protection,
            )| PolicySwitches {
                timestamp,
                layout,
                sign_body,
                sign_action,
                primary,
                username,
                endorsing,
                encrypt_body,
                wss11,
                token_protection,
            },
        )
}

fn scenario_for(switches: &PolicySwitches) -> Scenario {
    let mut scenario = Scenario::client();
    let registry = &mut scenario.registry;
    if switches.timestamp {
        registry.register(Assertion::IncludeTimestamp);
    }
    registry.register(Assertion::Layout(switches.layout));
    registry.register(Assertion::Wss(WssCapabilities {
        version: if switches.wss11 {
            WssVersion::Wss11
        } else {
            WssVersion::Wss10
        },
        must_support_ref_thumbprint: true,
        require_signature_confirmation: true,
        ..Default::default()
    }));
    if switches.sign_body || switches.sign_action {
        let headers = if switches.sign_action {
            vec![HeaderPart::named(SERVICE_NS, "Action")]
        } else {
            Vec::new()
        };
        registry.register(Assertion::SignedParts(Parts {
            body: switches.sign_body,
            headers,
        }));
    }
    if switches.encrypt_body {
        registry.register(Assertion::EncryptedParts(Parts {
            body: true,
            headers: Vec::new(),
        }));
    }
    if let Some(category) = switches.username {
        let token = registry.register_token(
            IncludeToken::Always,
            TokenKind::Username(UsernameTokenPolicy::default()),
        );
        registry.register_supporting_tokens(category, vec![token]);
    }
    if let Some(category) = switches.endorsing {
        let token = registry.register_token(
            IncludeToken::Always,
            TokenKind::X509(X509TokenPolicy::default()),
        );
        registry.register_supporting_tokens(category, vec![token]);
    }
    if let Some(inclusion) = switches.primary {
        scenario.sign_with_x509(inclusion);
    }
    scenario.encrypt_with_x509(X509TokenPolicy::default());
    scenario.binding = scenario
        .binding
        .clone()
        .with_token_protection(switches.token_protection);
    scenario
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pass_leaves_nothing_pending(switches in switches()) {
        let mut scenario = scenario_for(&switches);
        scenario.run();
        prop_assert!(scenario.registry.pending().is_empty(), "{:?}", scenario.registry.report());
    }

    #[test]
    fn timestamp_is_unique_and_pinned(switches in switches()) {
        let mut scenario = scenario_for(&switches);
        let output = scenario.run();
        let layout = scenario.layout();
        let timestamps = layout.iter().filter(|name| *name == "Timestamp").count();
        prop_assert_eq!(timestamps, usize::from(switches.timestamp));
        prop_assert_eq!(output.timestamp_id.is_some(), switches.timestamp);
        if switches.timestamp {
            match switches.layout {
                Layout::LaxTimestampFirst => {
                    prop_assert_eq!(layout.first().map(String::as_str), Some("Timestamp"));
                }
                Layout::LaxTimestampLast => {
                    prop_assert_eq!(layout.last().map(String::as_str), Some("Timestamp"));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn endorsements_cover_the_primary_signature(switches in switches()) {
        let mut scenario = scenario_for(&switches);
        let output = scenario.run();
        for endorsement in &output.endorsements {
            prop_assert_eq!(Some(&endorsement.references[0]), output.main_signature_id.as_ref());
            let expected = if switches.token_protection { 2 } else { 1 };
            prop_assert_eq!(endorsement.references.len(), expected);
            prop_assert!(scenario.position(&endorsement.signature_id) > output
                .main_signature_id
                .as_ref()
                .and_then(|main| scenario.position(main)));
        }
        if output.main_signature_id.is_none() {
            prop_assert!(output.endorsements.is_empty());
        }
    }

    #[test]
    fn signed_parts_are_unique_and_resolvable(switches in switches()) {
        let mut scenario = scenario_for(&switches);
        let output = scenario.run();
        let ids: BTreeSet<_> = output.signed_ids().collect();
        prop_assert_eq!(ids.len(), output.signed_parts.len());
        if let Some(main) = &output.main_signature_id {
            for id in ids {
                prop_assert!(scenario.dom.find_by_id(id).is_some(), "{} not in message", id);
            }
            prop_assert_eq!(scenario.references(main).len(), output.signed_parts.len());
            prop_assert!(scenario.verify_signature(main, &client_certificate()));
        }
    }

    #[test]
    fn confirmations_only_under_wss11(switches in switches()) {
        let mut scenario = scenario_for(&switches);
        let output = scenario.run();
        prop_assert_eq!(output.confirmation_ids.len(), usize::from(switches.wss11));
        for id in &output.confirmation_ids {
            prop_assert!(!output.signed_ids().any(|signed| signed == id));
        }
    }
}

#[test]
fn test_ids_are_reused_across_passes() {
    let switches = PolicySwitches {
        timestamp: true,
        layout: Layout::Strict,
        sign_body: true,
        sign_action: true,
        primary: Some(IncludeToken::Always),
        username: None,
        endorsing: None,
        encrypt_body: false,
        wss11: false,
        token_protection: false,
    };
    let mut first = scenario_for(&switches);
    let output = first.run();
    let body_id = output.signed_parts[0].id.clone();

    let mut second = scenario_for(&switches);
    second.dom = first.dom.clone();
    let again = second.run();
    assert_eq!(again.signed_parts[0].id, body_id);
    assert_eq!(again.signed_parts[1].id, output.signed_parts[1].id);
    assert_ne!(again.timestamp_id, output.timestamp_id);
}
