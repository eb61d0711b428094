//! In-memory, namespace-aware element tree implementing [`Document`].
//!
//! Nodes live in an arena and are never freed; detached nodes simply have no
//! parent. Namespace declarations are ordinary attributes in the XMLNS
//! namespace, so prefix lookups walk the ancestor chain the way DOM does.
//! Reading and writing markup goes through `quick-xml`.

use crate::document::{Document, DocumentError, DocumentResult, Namespaces, NodeId};
use crate::ns;
use crate::xpath;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    namespace: Option<String>,
    prefix: Option<String>,
    local: String,
    value: String,
}

impl Attribute {
    fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Element {
    namespace: Option<String>,
    prefix: Option<String>,
    local: String,
    attributes: Vec<Attribute>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    text: Option<String>,
}

/// SOAP envelope version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => ns::SOAP11_ENV,
            SoapVersion::Soap12 => ns::SOAP12_ENV,
        }
    }
}

/// Arena-backed document.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Element>,
    root: NodeId,
}

fn split_qname(qualified_name: &str) -> (Option<String>, String) {
    match qualified_name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qualified_name.to_string()),
    }
}

fn malformed(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Malformed(e.to_string())
}

fn utf8(bytes: &[u8]) -> DocumentResult<String> {
    std::str::from_utf8(bytes).map(str::to_string).map_err(malformed)
}

fn bound_namespace(resolved: ResolveResult<'_>, name: &[u8]) -> DocumentResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(utf8(namespace.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(DocumentError::Malformed(format!(
            "unbound prefix '{}' on {}",
            String::from_utf8_lossy(&prefix),
            String::from_utf8_lossy(name)
        ))),
    }
}

impl Dom {
    /// Create a document whose root element has the given name.
    pub fn new(namespace: Option<&str>, qualified_name: &str) -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = dom.create_element(namespace, qualified_name);
        if let (Some(namespace), (Some(prefix), _)) = (namespace, split_qname(qualified_name)) {
            dom.declare_namespace(root, &prefix, namespace);
        }
        dom.root = root;
        dom
    }

    /// Create `Envelope`, `Header` and `Body` for the given SOAP version.
    pub fn soap_envelope(version: SoapVersion) -> Self {
        let soap = version.namespace();
        let mut dom = Self::new(Some(soap), "soap:Envelope");
        let root = dom.root;
        let header = dom.create_element(Some(soap), "soap:Header");
        let body = dom.create_element(Some(soap), "soap:Body");
        dom.nodes[root.0].children = vec![header, body];
        dom.nodes[header.0].parent = Some(root);
        dom.nodes[body.0].parent = Some(root);
        dom
    }

    /// Bind `prefix` to `namespace` on `node` via an `xmlns:` attribute.
    pub fn declare_namespace(&mut self, node: NodeId, prefix: &str, namespace: &str) {
        let name = format!("xmlns:{}", prefix);
        // Only fails for unknown nodes, which cannot happen for arena handles we issued.
        let _ = self.set_attribute_ns(node, ns::XMLNS, &name, namespace);
    }

    /// Create an element, declare its prefix on it and append it to `parent`.
    pub fn add_element(
        &mut self,
        parent: NodeId,
        namespace: &str,
        qualified_name: &str,
    ) -> DocumentResult<NodeId> {
        let child = self.create_element(Some(namespace), qualified_name);
        if let (Some(prefix), _) = split_qname(qualified_name) {
            if self.lookup_namespace_uri(parent, &prefix).as_deref() != Some(namespace) {
                self.declare_namespace(child, &prefix, namespace);
            }
        }
        self.append_child(parent, child)?;
        Ok(child)
    }

    /// Serialize the whole document.
    pub fn to_xml(&self) -> String {
        self.serialize(self.root)
    }

    /// Build a document from markup. Text is trimmed and whitespace-only text is dropped;
    /// comments and processing instructions are skipped.
    pub fn parse(xml: &str) -> DocumentResult<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.trim_text(true);
        let mut dom = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let mut root = None;
        let mut open: Vec<NodeId> = Vec::new();
        loop {
            let (resolved, event) = reader.read_resolved_event().map_err(malformed)?;
            match event {
                Event::Start(start) => {
                    let namespace = bound_namespace(resolved, start.name().as_ref())?;
                    let node = dom.open_element(&reader, namespace, &start, open.last().copied())?;
                    root.get_or_insert(node);
                    open.push(node);
                }
                Event::Empty(start) => {
                    let namespace = bound_namespace(resolved, start.name().as_ref())?;
                    let node = dom.open_element(&reader, namespace, &start, open.last().copied())?;
                    root.get_or_insert(node);
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(text) => {
                    if let Some(node) = open.last() {
                        let text = text.unescape().map_err(malformed)?;
                        dom.push_text(*node, &text);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = open.last() {
                        let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        dom.push_text(*node, &text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        dom.root = root.ok_or_else(|| DocumentError::Malformed("no document element".into()))?;
        debug!(elements = dom.nodes.len(), "Parsed document");
        Ok(dom)
    }

    fn open_element(
        &mut self,
        reader: &NsReader<&[u8]>,
        namespace: Option<String>,
        start: &BytesStart<'_>,
        parent: Option<NodeId>,
    ) -> DocumentResult<NodeId> {
        let qualified_name = utf8(start.name().as_ref())?;
        let node = self.create_element(namespace.as_deref(), &qualified_name);
        if let Some(parent) = parent {
            self.append_child(parent, node)?;
        }
        for attribute in start.attributes() {
            let attribute = attribute.map_err(malformed)?;
            let key = utf8(attribute.key.as_ref())?;
            let value = attribute.unescape_value().map_err(malformed)?;
            if key == "xmlns" || key.starts_with("xmlns:") {
                self.set_attribute_ns(node, ns::XMLNS, &key, &value)?;
            } else if key.contains(':') {
                let (resolved, _) = reader.resolve_attribute(attribute.key);
                let namespace = bound_namespace(resolved, key.as_bytes())?.unwrap_or_default();
                self.set_attribute_ns(node, &namespace, &key, &value)?;
            } else {
                self.set_attribute(node, &key, &value)?;
            }
        }
        Ok(node)
    }

    fn push_text(&mut self, node: NodeId, text: &str) {
        if let Some(element) = self.nodes.get_mut(node.0) {
            element.text.get_or_insert_with(String::new).push_str(text);
        }
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    fn element_mut(&mut self, node: NodeId) -> DocumentResult<&mut Element> {
        self.nodes.get_mut(node.0).ok_or(DocumentError::UnknownNode(node))
    }

    fn check(&self, node: NodeId) -> DocumentResult<()> {
        self.element(node).map(|_| ()).ok_or(DocumentError::UnknownNode(node))
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == candidate {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    fn sibling_offset(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = &self.nodes[parent.0].children;
        let position = siblings.iter().position(|c| *c == node)? as isize;
        let target = position + offset;
        if target < 0 {
            return None;
        }
        siblings.get(target as usize).copied()
    }

    /// Previous element sibling.
    pub fn previous_sibling_element(&self, node: NodeId) -> Option<NodeId> {
        self.sibling_offset(node, -1)
    }

    /// Every element of the document in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .element(node)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    fn write<W: std::io::Write>(
        &self,
        node: NodeId,
        in_scope: &BTreeMap<String, String>,
        writer: &mut Writer<W>,
    ) -> quick_xml::Result<()> {
        let Some(element) = self.element(node) else {
            return Ok(());
        };
        let mut scope = in_scope.clone();
        let mut declarations: Vec<(String, String)> = Vec::new();
        for attribute in &element.attributes {
            if attribute.namespace.as_deref() == Some(ns::XMLNS) {
                scope.insert(attribute.local.clone(), attribute.value.clone());
            }
        }
        let mut require = |prefix: &Option<String>, namespace: &Option<String>| {
            if let (Some(prefix), Some(namespace)) = (prefix, namespace) {
                if scope.get(prefix) != Some(namespace) {
                    scope.insert(prefix.clone(), namespace.clone());
                    declarations.push((format!("xmlns:{}", prefix), namespace.clone()));
                }
            }
        };
        require(&element.prefix, &element.namespace);
        for attribute in &element.attributes {
            if attribute.namespace.as_deref() != Some(ns::XMLNS) {
                require(&attribute.prefix, &attribute.namespace);
            }
        }

        let name = match &element.prefix {
            Some(prefix) => format!("{}:{}", prefix, element.local),
            None => element.local.clone(),
        };
        let mut start = BytesStart::new(name.as_str());
        for attribute in &element.attributes {
            let key = attribute.qualified_name();
            start.push_attribute((key.as_str(), attribute.value.as_str()));
        }
        for (key, namespace) in &declarations {
            start.push_attribute((key.as_str(), namespace.as_str()));
        }
        if element.children.is_empty() && element.text.is_none() {
            return writer.write_event(Event::Empty(start));
        }
        writer.write_event(Event::Start(start))?;
        if let Some(text) = &element.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &element.children {
            self.write(*child, &scope, writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(name.as_str())))
    }
}

impl Document for Dom {
    fn document_element(&self) -> NodeId {
        self.root
    }

    fn body(&self) -> Option<NodeId> {
        let envelope_ns = self.namespace_uri(self.root)?.to_string();
        self.child_elements(self.root)
            .into_iter()
            .find(|c| self.has_name(*c, &envelope_ns, ns::node::BODY))
    }

    fn header(&self) -> Option<NodeId> {
        let envelope_ns = self.namespace_uri(self.root)?.to_string();
        self.child_elements(self.root)
            .into_iter()
            .find(|c| self.has_name(*c, &envelope_ns, ns::node::HEADER))
    }

    fn local_name(&self, node: NodeId) -> &str {
        self.element(node).map(|e| e.local.as_str()).unwrap_or("")
    }

    fn namespace_uri(&self, node: NodeId) -> Option<&str> {
        self.element(node)?.namespace.as_deref()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local == name)
            .map(|a| a.value.as_str())
    }

    fn attribute_ns(&self, node: NodeId, namespace: &str, local: &str) -> Option<&str> {
        self.element(node)?
            .attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local == local)
            .map(|a| a.value.as_str())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DocumentResult<()> {
        let element = self.element_mut(node)?;
        match element
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local == name)
        {
            Some(existing) => existing.value = value.to_string(),
            None => element.attributes.push(Attribute {
                namespace: None,
                prefix: None,
                local: name.to_string(),
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    fn set_attribute_ns(
        &mut self,
        node: NodeId,
        namespace: &str,
        qualified_name: &str,
        value: &str,
    ) -> DocumentResult<()> {
        let (prefix, local) = split_qname(qualified_name);
        let element = self.element_mut(node)?;
        match element
            .attributes
            .iter_mut()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local == local)
        {
            Some(existing) => {
                existing.prefix = prefix;
                existing.value = value.to_string();
            }
            None => element.attributes.push(Attribute {
                namespace: Some(namespace.to_string()),
                prefix,
                local,
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    fn lookup_prefix(&self, node: NodeId, namespace: &str) -> Option<String> {
        let mut current = Some(node);
        while let Some(n) = current {
            let element = self.element(n)?;
            if element.namespace.as_deref() == Some(namespace) {
                if let Some(prefix) = &element.prefix {
                    return Some(prefix.clone());
                }
            }
            if let Some(declaration) = element
                .attributes
                .iter()
                .find(|a| a.namespace.as_deref() == Some(ns::XMLNS) && a.value == namespace)
            {
                return Some(declaration.local.clone());
            }
            current = element.parent;
        }
        None
    }

    fn lookup_namespace_uri(&self, node: NodeId, prefix: &str) -> Option<String> {
        let mut current = Some(node);
        while let Some(n) = current {
            let element = self.element(n)?;
            if element.prefix.as_deref() == Some(prefix) {
                if let Some(namespace) = &element.namespace {
                    return Some(namespace.clone());
                }
            }
            if let Some(declaration) = element
                .attributes
                .iter()
                .find(|a| a.namespace.as_deref() == Some(ns::XMLNS) && a.local == prefix)
            {
                return Some(declaration.value.clone());
            }
            current = element.parent;
        }
        None
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.element(node)?.parent
    }

    fn first_child_element(&self, node: NodeId) -> Option<NodeId> {
        self.element(node)?.children.first().copied()
    }

    fn next_sibling_element(&self, node: NodeId) -> Option<NodeId> {
        self.sibling_offset(node, 1)
    }

    fn create_element(&mut self, namespace: Option<&str>, qualified_name: &str) -> NodeId {
        let (prefix, local) = split_qname(qualified_name);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element {
            namespace: namespace.map(str::to_string),
            prefix,
            local,
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
            text: None,
        });
        id
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> DocumentResult<()> {
        self.element_mut(node)?.text = Some(text.to_string());
        Ok(())
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        self.element(node)?.text.as_deref()
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()> {
        self.insert_before(parent, child, None)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DocumentResult<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(DocumentError::Cycle(child));
        }
        if let Some(reference) = reference {
            if reference == child {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(DocumentError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        self.detach(child);
        let siblings = &mut self.nodes[parent.0].children;
        let position = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()> {
        self.check(parent)?;
        if self.parent(child) != Some(parent) {
            return Err(DocumentError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|n| {
                self.attribute(*n, ns::ID) == Some(id)
                    || self.attribute_ns(*n, ns::WSU, ns::ID) == Some(id)
            })
    }

    fn contains_id(&self, id: &str) -> bool {
        // Detached elements count too; they are usually headed for the document.
        (0..self.nodes.len()).map(NodeId).any(|n| {
            self.attribute(n, ns::ID) == Some(id)
                || self.attribute_ns(n, ns::WSU, ns::ID) == Some(id)
        })
    }

    fn select(&self, expression: &str, namespaces: &Namespaces) -> DocumentResult<Vec<NodeId>> {
        xpath::evaluate(self, expression, namespaces)
    }

    fn serialize(&self, node: NodeId) -> String {
        let mut scope = BTreeMap::new();
        let mut current = self.parent(node);
        let mut ancestors = Vec::new();
        while let Some(n) = current {
            ancestors.push(n);
            current = self.parent(n);
        }
        for ancestor in ancestors.into_iter().rev() {
            let element = &self.nodes[ancestor.0];
            if let (Some(prefix), Some(namespace)) = (&element.prefix, &element.namespace) {
                scope.insert(prefix.clone(), namespace.clone());
            }
            for attribute in &element.attributes {
                if attribute.namespace.as_deref() == Some(ns::XMLNS) {
                    scope.insert(attribute.local.clone(), attribute.value.clone());
                }
            }
        }
        let mut writer = Writer::new(Vec::new());
        if let Err(e) = self.write(node, &scope, &mut writer) {
            warn!(node = ?node, error = %e, "Serialization stopped early");
        }
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }
}
