//! Typed security-policy model for wsbind.
//!
//! Policies arrive here already parsed: a [`Binding`] with its
//! [`AlgorithmSuite`], plus the assertions of the effective policy registered
//! in an [`AssertionRegistry`]. The registry is where every evaluation outcome
//! ends up; callers inspect it after a binding pass to decide whether the
//! message may be sent.

pub mod assertion;
pub mod binding;
pub mod error;
pub mod registry;
pub mod token;

pub use assertion::{
    Assertion, AssertionId, AssertionKind, Elements, HeaderPart, Layout, Outcome, Parts,
    WssCapabilities, WssVersion,
};
pub use binding::{AlgorithmSuite, Binding, BindingKind};
pub use error::{PolicyError, PolicyResult};
pub use registry::{AssertionInfo, AssertionRegistry, ComplianceReport, ReportEntry};
pub use token::{
    IncludeToken, IssuedTokenPolicy, SupportingTokenCategory, SupportingTokens, Token, TokenKind,
    UsernameTokenPolicy, WrappedToken, WrapperRole, X509TokenPolicy, X509TokenType,
};
