//! Selection of signable and encryptable message parts.
//!
//! Order is body, then declared headers, then XPath matches. An element is
//! selected at most once per selection. Every selected element ends up with
//! an identifier the signature or encryption can reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use wsbind_core::{
    element_id, ns, unique_id, Document, DocumentResult, Namespaces, NodeId, QName,
};
use wsbind_crypto::{PartModifier, PartReference, PartType};
use wsbind_policy::HeaderPart;

/// Whether parts are selected for signing or for encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionMode {
    Sign,
    Encrypt,
}

/// Result of one selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartSelection {
    pub parts: Vec<PartReference>,
    /// XPath expressions that could not be evaluated
    pub diagnostics: Vec<String>,
}

impl PartSelection {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.id.as_str())
    }
}

/// Identifier of `node`, writing a `wsu:Id` when it has none.
///
/// An existing `Id` or `wsu:Id` is returned untouched. Otherwise an unused
/// `Id-<n>` is written with whatever prefix is bound to the utility
/// namespace, declaring `wsu` (or `wsu1`, `wsu2`, ...) when none is.
pub fn ensure_id(doc: &mut dyn Document, node: NodeId) -> DocumentResult<String> {
    if let Some(id) = element_id(doc, node) {
        return Ok(id);
    }
    let id = unique_id(doc, "Id");
    let prefix = match doc.lookup_prefix(node, ns::WSU).filter(|p| !p.is_empty()) {
        Some(prefix) => prefix,
        None => {
            let mut counter = 0usize;
            let prefix = loop {
                let candidate = if counter == 0 {
                    "wsu".to_string()
                } else {
                    format!("wsu{}", counter)
                };
                if doc.lookup_namespace_uri(node, &candidate).is_none() {
                    break candidate;
                }
                counter += 1;
            };
            doc.set_attribute_ns(node, ns::XMLNS, &format!("xmlns:{}", prefix), ns::WSU)?;
            prefix
        }
    };
    doc.set_attribute_ns(node, ns::WSU, &format!("{}:Id", prefix), &id)?;
    debug!(id = %id, element = %doc.local_name(node), "Assigned element id");
    Ok(id)
}

struct Selector<'a> {
    doc: &'a mut dyn Document,
    mode: SelectionMode,
    found: BTreeSet<NodeId>,
    selection: PartSelection,
}

impl Selector<'_> {
    fn name(&self, node: NodeId) -> QName {
        QName::new(
            self.doc.namespace_uri(node).unwrap_or(""),
            self.doc.local_name(node),
        )
    }

    fn add(&mut self, node: NodeId, part_type: PartType) -> DocumentResult<()> {
        if !self.found.insert(node) {
            return Ok(());
        }
        let modifier = match (self.mode, part_type) {
            (SelectionMode::Encrypt, PartType::Body) => PartModifier::Content,
            _ => PartModifier::Element,
        };
        let id = ensure_id(&mut *self.doc, node)?;
        let name = self.name(node);
        self.selection.parts.push(PartReference {
            id,
            name: Some(name),
            modifier,
            part_type,
            node: Some(node),
        });
        Ok(())
    }

    fn add_headers(&mut self, header: NodeId, part: &HeaderPart) -> DocumentResult<()> {
        let matches: Vec<NodeId> = self
            .doc
            .child_elements(header)
            .into_iter()
            .filter(|child| {
                self.doc.namespace_uri(*child).unwrap_or("") == part.namespace
                    && match part.name.as_deref() {
                        None | Some("") => true,
                        Some(name) => self.doc.local_name(*child) == name,
                    }
            })
            .collect();
        for node in matches {
            self.add(node, PartType::Header)?;
        }
        Ok(())
    }

    fn add_xpath(&mut self, expression: &str, namespaces: &Namespaces) -> DocumentResult<()> {
        match self.doc.select(expression, namespaces) {
            Ok(nodes) => {
                for node in nodes {
                    self.add(node, PartType::Element)?;
                }
            }
            Err(e) => {
                warn!(expression = %expression, error = %e, "Skipping XPath expression");
                self.selection.diagnostics.push(e.to_string());
            }
        }
        Ok(())
    }
}

/// Resolve the parts named by a parts/elements assertion pair.
///
/// XPath expressions that fail to evaluate select nothing and are reported
/// in [`PartSelection::diagnostics`]. Only document mutations can fail the
/// whole selection.
pub fn select_parts(
    doc: &mut dyn Document,
    mode: SelectionMode,
    include_body: bool,
    headers: &[HeaderPart],
    xpaths: &[String],
    namespaces: &Namespaces,
) -> DocumentResult<PartSelection> {
    let body = doc.body();
    let header = doc.header();
    let mut selector = Selector {
        doc,
        mode,
        found: BTreeSet::new(),
        selection: PartSelection::default(),
    };

    if let (true, Some(body)) = (include_body, body) {
        selector.add(body, PartType::Body)?;
    }
    if let Some(header) = header {
        for part in headers {
            selector.add_headers(header, part)?;
        }
    }
    for expression in xpaths {
        selector.add_xpath(expression, namespaces)?;
    }
    Ok(selector.selection)
}
