//! XPath 1.0 selection for [`crate::dom::Dom`].
//!
//! Expressions are compiled and evaluated by `sxd-xpath` against a parsed copy
//! of the serialized document. Selected elements are mapped back to arena
//! handles by their element-child position path from the root.

use crate::document::{Document, DocumentError, DocumentResult, Namespaces, NodeId};
use crate::dom::Dom;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element, ParentOfChild};
use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use tracing::trace;

fn error(expression: &str, reason: impl Into<String>) -> DocumentError {
    DocumentError::XPath {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

/// Element-child indices leading from the document element to `element`.
fn position_path(element: Element<'_>) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut current = element;
    loop {
        match current.parent()? {
            ParentOfChild::Root(root) => {
                let index = root
                    .children()
                    .into_iter()
                    .filter_map(|c| match c {
                        ChildOfRoot::Element(e) => Some(e),
                        _ => None,
                    })
                    .position(|e| e == current)?;
                // Only one document element exists.
                if index != 0 {
                    return None;
                }
                path.reverse();
                return Some(path);
            }
            ParentOfChild::Element(parent) => {
                let index = parent
                    .children()
                    .into_iter()
                    .filter_map(|c| match c {
                        ChildOfElement::Element(e) => Some(e),
                        _ => None,
                    })
                    .position(|e| e == current)?;
                path.push(index);
                current = parent;
            }
        }
    }
}

fn resolve(dom: &Dom, path: &[usize]) -> Option<NodeId> {
    let mut node = dom.document_element();
    for index in path {
        node = *dom.child_elements(node).get(*index)?;
    }
    Some(node)
}

/// Evaluate `expression`; selected elements come back in document order.
///
/// Attribute, text and other non-element nodes in the result are ignored. An
/// expression that does not produce a node-set is an error.
pub fn evaluate(dom: &Dom, expression: &str, namespaces: &Namespaces) -> DocumentResult<Vec<NodeId>> {
    let xpath = Factory::new()
        .build(expression)
        .map_err(|e| error(expression, format!("{:?}", e)))?
        .ok_or_else(|| error(expression, "empty expression"))?;

    let package = parser::parse(&dom.to_xml())
        .map_err(|e| error(expression, format!("document did not parse: {:?}", e)))?;
    let document = package.as_document();

    let mut context = Context::new();
    for (prefix, namespace) in namespaces {
        context.set_namespace(prefix, namespace);
    }

    let value = xpath
        .evaluate(&context, document.root())
        .map_err(|e| error(expression, format!("{:?}", e)))?;
    let Value::Nodeset(nodes) = value else {
        return Err(error(expression, "expression does not select elements"));
    };

    let selected: Vec<NodeId> = nodes
        .document_order()
        .into_iter()
        .filter_map(|node| match node {
            Node::Element(element) => position_path(element),
            _ => None,
        })
        .filter_map(|path| resolve(dom, &path))
        .collect();
    trace!(expression = %expression, count = selected.len(), "XPath evaluated");
    Ok(selected)
}
