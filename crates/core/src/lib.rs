//! Core functionality for the wsbind security-policy binding workspace.
//!
//! This crate provides the fundamental types, traits, and utilities used
//! across wsbind: the structured-document collaborator contract and its
//! in-memory implementation, per-exchange configuration, secrets, namespace
//! constants and logging setup.

pub mod config;
pub mod document;
pub mod dom;
pub mod error;
pub mod logging;
pub mod ns;
pub mod secret;
pub mod xpath;

pub use config::{CryptoProperties, SecurityConfig};
pub use document::{
    element_id, unique_id, Document, DocumentError, DocumentResult, Namespaces, NodeId, QName,
};
pub use dom::{Dom, SoapVersion};
pub use error::{CoreError, CoreResult};
pub use secret::Password;
