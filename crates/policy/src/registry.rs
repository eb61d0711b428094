//! Assertion registry with per-exchange outcome tracking.
//!
//! A registry is assembled once per endpoint policy and cloned (or
//! [`reset`](AssertionRegistry::reset)) for every exchange, so assertion ids
//! stay stable while outcomes never leak between exchanges.
//!
//! Outcome rules:
//! - `Pending → Asserted`, `Pending → NotAsserted`, `Asserted → NotAsserted`
//! - `NotAsserted` is terminal; the first recorded reason is kept.

use crate::assertion::{Assertion, AssertionId, AssertionKind, Outcome, WssCapabilities};
use crate::error::{PolicyError, PolicyResult};
use crate::token::{
    IncludeToken, SupportingTokenCategory, SupportingTokens, Token, TokenKind, WrappedToken,
    WrapperRole,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One registered assertion and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionInfo {
    pub id: AssertionId,
    pub assertion: Assertion,
    pub outcome: Outcome,
}

/// One line of a [`ComplianceReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: AssertionId,
    pub kind: String,
    pub outcome: Outcome,
}

/// Snapshot of every outcome, for callers deciding whether to send.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub entries: Vec<ReportEntry>,
}

impl ComplianceReport {
    /// No assertion is pending or not asserted.
    pub fn is_satisfied(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_asserted())
    }

    /// Entries that are not asserted.
    pub fn violations(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.reason().is_some())
    }
}

/// Registry of the assertions of one effective policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRegistry {
    infos: Vec<AssertionInfo>,
}

impl AssertionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assertion and return its id.
    pub fn register(&mut self, assertion: Assertion) -> AssertionId {
        let id = AssertionId(self.infos.len());
        self.infos.push(AssertionInfo {
            id,
            assertion,
            outcome: Outcome::Pending,
        });
        id
    }

    /// Register a token assertion.
    pub fn register_token(&mut self, inclusion: IncludeToken, kind: TokenKind) -> Token {
        let id = AssertionId(self.infos.len());
        let token = Token { id, inclusion, kind };
        self.register(Assertion::Token(token.clone()));
        token
    }

    /// Register a supporting-token assertion over already registered tokens.
    pub fn register_supporting_tokens(
        &mut self,
        category: SupportingTokenCategory,
        tokens: Vec<Token>,
    ) -> AssertionId {
        self.register(Assertion::SupportingTokens(SupportingTokens { category, tokens }))
    }

    /// Register a binding-level token and the wrapper assertion naming it.
    pub fn register_wrapped_token(
        &mut self,
        role: WrapperRole,
        inclusion: IncludeToken,
        kind: TokenKind,
    ) -> WrappedToken {
        let token = self.register_token(inclusion, kind);
        let wrapper = self.register(Assertion::TokenWrapper {
            role,
            token: token.id,
        });
        WrappedToken {
            wrapper,
            role,
            token,
        }
    }

    /// Number of registered assertions.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get(&self, id: AssertionId) -> Option<&Assertion> {
        self.infos.get(id.0).map(|info| &info.assertion)
    }

    pub fn outcome(&self, id: AssertionId) -> Option<&Outcome> {
        self.infos.get(id.0).map(|info| &info.outcome)
    }

    /// All registered assertions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AssertionInfo> {
        self.infos.iter()
    }

    /// First assertion of `kind` that has not been evaluated yet.
    pub fn find(&self, kind: AssertionKind) -> Option<(AssertionId, &Assertion)> {
        self.infos
            .iter()
            .find(|info| info.assertion.kind() == kind && info.outcome.is_pending())
            .map(|info| (info.id, &info.assertion))
    }

    /// Every assertion of `kind`, whatever its outcome.
    pub fn find_all(&self, kind: AssertionKind) -> Vec<(AssertionId, &Assertion)> {
        self.infos
            .iter()
            .filter(|info| info.assertion.kind() == kind)
            .map(|info| (info.id, &info.assertion))
            .collect()
    }

    /// The WS-Security capability assertion, `Wss10` taking precedence.
    pub fn find_wss(&self) -> Option<(AssertionId, WssCapabilities)> {
        [AssertionKind::Wss10, AssertionKind::Wss11]
            .into_iter()
            .flat_map(|kind| self.find_all(kind))
            .find_map(|(id, assertion)| match assertion {
                Assertion::Wss(caps) => Some((id, *caps)),
                _ => None,
            })
    }

    /// Record that an assertion is satisfied. Ignored if already not asserted.
    pub fn mark_asserted(&mut self, id: AssertionId) {
        let Some(info) = self.infos.get_mut(id.0) else {
            warn!(assertion = %id, "Asserting unknown assertion");
            return;
        };
        if info.outcome.is_pending() {
            debug!(assertion = %id, kind = %info.assertion.kind(), "Asserting");
            info.outcome = Outcome::Asserted;
        } else if info.outcome.reason().is_some() {
            debug!(assertion = %id, kind = %info.assertion.kind(), "Already not asserted, keeping failure");
        }
    }

    /// Record that an assertion is violated. The first reason wins.
    pub fn mark_not_asserted(&mut self, id: AssertionId, reason: impl Into<String>) {
        let Some(info) = self.infos.get_mut(id.0) else {
            warn!(assertion = %id, "Not asserting unknown assertion");
            return;
        };
        if info.outcome.reason().is_some() {
            return;
        }
        let reason = reason.into();
        info!(assertion = %id, kind = %info.assertion.kind(), reason = %reason, "Not asserting");
        info.outcome = Outcome::NotAsserted(reason);
    }

    /// Assert every assertion of `kind`.
    pub fn mark_kind_asserted(&mut self, kind: AssertionKind) {
        let ids: Vec<_> = self.find_all(kind).into_iter().map(|(id, _)| id).collect();
        for id in ids {
            self.mark_asserted(id);
        }
    }

    /// Assertions still pending.
    pub fn pending(&self) -> Vec<AssertionId> {
        self.infos
            .iter()
            .filter(|info| info.outcome.is_pending())
            .map(|info| info.id)
            .collect()
    }

    /// Not-asserted assertions with their reasons.
    pub fn violations(&self) -> Vec<(AssertionId, AssertionKind, &str)> {
        self.infos
            .iter()
            .filter_map(|info| {
                info.outcome
                    .reason()
                    .map(|reason| (info.id, info.assertion.kind(), reason))
            })
            .collect()
    }

    /// Every assertion is asserted.
    pub fn is_satisfied(&self) -> bool {
        self.infos.iter().all(|info| info.outcome.is_asserted())
    }

    /// Serializable snapshot of all outcomes.
    pub fn report(&self) -> ComplianceReport {
        ComplianceReport {
            entries: self
                .infos
                .iter()
                .map(|info| ReportEntry {
                    id: info.id,
                    kind: info.assertion.kind().to_string(),
                    outcome: info.outcome.clone(),
                })
                .collect(),
        }
    }

    /// Clear every outcome back to pending.
    pub fn reset(&mut self) {
        for info in &mut self.infos {
            info.outcome = Outcome::Pending;
        }
    }

    /// Check that every token and wrapper reference points at a registered
    /// assertion of the right kind.
    pub fn validate(&self) -> PolicyResult<()> {
        for info in &self.infos {
            match &info.assertion {
                Assertion::SupportingTokens(st) => {
                    for token in &st.tokens {
                        self.expect_token(token.id)?;
                    }
                }
                Assertion::TokenWrapper { token, .. } => {
                    self.expect_token(*token)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The registered token with this id.
    pub fn expect_token(&self, id: AssertionId) -> PolicyResult<&Token> {
        match self.get(id) {
            Some(Assertion::Token(token)) => Ok(token),
            Some(_) => Err(PolicyError::UnexpectedKind {
                id,
                expected: "token".to_string(),
            }),
            None => Err(PolicyError::UnknownAssertion(id)),
        }
    }
}
