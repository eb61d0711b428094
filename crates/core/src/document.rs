//! Structured document collaborator.
//!
//! The binding core never owns the message representation. It reads and mutates
//! the envelope exclusively through [`Document`], which a SOAP stack implements
//! over its own tree. [`crate::dom::Dom`] is the in-memory implementation.

use crate::ns;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Element identity inside one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Namespace-qualified element name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI (empty for no namespace)
    pub namespace: String,
    /// Local part
    pub local: String,
}

impl QName {
    /// Create a qualified name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// Prefix → namespace bindings used to evaluate XPath expressions.
pub type Namespaces = BTreeMap<String, String>;

/// Errors raised by document implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Node handle does not belong to this document
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    /// Child is not attached to the given parent
    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    /// Operation would create a cycle
    #[error("Cannot insert {0:?} below itself")]
    Cycle(NodeId),

    /// Markup could not be read into a document
    #[error("Malformed XML: {0}")]
    Malformed(String),

    /// XPath expression could not be evaluated
    #[error("XPath error in '{expression}': {reason}")]
    XPath { expression: String, reason: String },
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Operations the binding core needs from a message envelope.
///
/// Node handles are only meaningful for the document that issued them.
/// Accessors on unknown nodes return `None` / empty values rather than failing;
/// mutations report [`DocumentError`].
pub trait Document {
    /// Root element.
    fn document_element(&self) -> NodeId;

    /// SOAP body, if present.
    fn body(&self) -> Option<NodeId>;

    /// SOAP header, if present.
    fn header(&self) -> Option<NodeId>;

    /// Local name of an element.
    fn local_name(&self, node: NodeId) -> &str;

    /// Namespace URI of an element.
    fn namespace_uri(&self, node: NodeId) -> Option<&str>;

    /// Un-namespaced attribute value.
    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    /// Namespaced attribute value.
    fn attribute_ns(&self, node: NodeId, namespace: &str, local: &str) -> Option<&str>;

    /// Set an un-namespaced attribute.
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DocumentResult<()>;

    /// Set a namespaced attribute. `qualified_name` may carry a prefix.
    fn set_attribute_ns(
        &mut self,
        node: NodeId,
        namespace: &str,
        qualified_name: &str,
        value: &str,
    ) -> DocumentResult<()>;

    /// Prefix bound to `namespace` in scope at `node`.
    fn lookup_prefix(&self, node: NodeId, namespace: &str) -> Option<String>;

    /// Namespace bound to `prefix` in scope at `node`.
    fn lookup_namespace_uri(&self, node: NodeId, prefix: &str) -> Option<String>;

    /// Parent element.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// First element child.
    fn first_child_element(&self, node: NodeId) -> Option<NodeId>;

    /// Next element sibling.
    fn next_sibling_element(&self, node: NodeId) -> Option<NodeId>;

    /// Create a detached element.
    fn create_element(&mut self, namespace: Option<&str>, qualified_name: &str) -> NodeId;

    /// Replace the text content of an element.
    fn set_text(&mut self, node: NodeId, text: &str) -> DocumentResult<()>;

    /// Text content of an element (own text only).
    fn text(&self, node: NodeId) -> Option<&str>;

    /// Append `child` as the last child of `parent`, detaching it first.
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()>;

    /// Insert `child` before `reference`, or append when `reference` is `None`.
    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DocumentResult<()>;

    /// Detach `child` from `parent`.
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()>;

    /// Element carrying `Id` or `wsu:Id` equal to `id`.
    fn find_by_id(&self, id: &str) -> Option<NodeId>;

    /// Evaluate an XPath expression against the whole document.
    fn select(&self, expression: &str, namespaces: &Namespaces) -> DocumentResult<Vec<NodeId>>;

    /// Serialize an element and its subtree.
    fn serialize(&self, node: NodeId) -> String;

    /// Element children in document order.
    fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut next = self.first_child_element(node);
        while let Some(child) = next {
            children.push(child);
            next = self.next_sibling_element(child);
        }
        children
    }

    /// Whether the element has the given qualified name.
    fn has_name(&self, node: NodeId, namespace: &str, local: &str) -> bool {
        self.local_name(node) == local && self.namespace_uri(node).unwrap_or("") == namespace
    }

    /// Whether any element already uses `id` as `Id` or `wsu:Id`.
    fn contains_id(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }
}

/// Produce an identifier `<prefix>-<n>` not yet used in the document.
pub fn unique_id(doc: &dyn Document, prefix: &str) -> String {
    let mut counter = 1usize;
    loop {
        let candidate = format!("{}-{}", prefix, counter);
        if !doc.contains_id(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Existing identifier of an element: plain `Id` first, then `wsu:Id`.
pub fn element_id(doc: &dyn Document, node: NodeId) -> Option<String> {
    doc.attribute(node, ns::ID)
        .or_else(|| doc.attribute_ns(node, ns::WSU, ns::ID))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
