//! Outbound WS-Security binding pass.
//!
//! Given a [`Binding`](wsbind_policy::Binding), the assertions registered for
//! the effective policy and the outbound message, a [`BindingBuilder`] adds
//! the timestamp, supporting tokens, encrypted key, signatures, endorsing
//! signatures and signature confirmations to the `wsse:Security` header.
//! Every assertion it handles ends up asserted or not asserted with a reason
//! in the [`AssertionRegistry`](wsbind_policy::AssertionRegistry).
//!
//! ```ignore
//! let mut exchange = Exchange::requestor(config).with_crypto("main", keystore);
//! let output = BindingBuilder::new(&binding, &mut registry, &mut exchange, &mut dom, &provider)?
//!     .build()?;
//! registry.validate()?;
//! ```

pub mod builder;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod header;
pub mod key_identifier;
pub mod parts;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use builder::{BindingBuilder, BuildOutput, Endorsement};
pub use credentials::{
    CredentialCallback, CredentialPurpose, CredentialRequest, CredentialResolver, EncryptionUser,
};
pub use error::{BindingError, BindingResult, CredentialError, Diagnostic};
pub use exchange::{Exchange, SecurityResult};
pub use header::SecurityHeader;
pub use key_identifier::choose_key_identifier;
pub use parts::{ensure_id, select_parts, PartSelection, SelectionMode};
pub use tokens::{TokenArtifact, TokenArtifacts};
