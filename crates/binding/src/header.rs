//! Placement of artifacts in the `wsse:Security` header.
//!
//! The provider only creates detached elements. Everything that ends up in
//! the header goes through [`SecurityHeader`], which keeps a timestamp pinned
//! to the front or back once a layout has asked for it.

use tracing::debug;
use wsbind_core::{ns, Document, DocumentResult, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityHeader {
    element: NodeId,
    pinned_first: Option<NodeId>,
    pinned_last: Option<NodeId>,
}

impl SecurityHeader {
    /// The message's security header, creating `Header` and `wsse:Security`
    /// when missing.
    pub fn find_or_create(doc: &mut dyn Document) -> DocumentResult<Self> {
        let header = match doc.header() {
            Some(header) => header,
            None => {
                let root = doc.document_element();
                let soap = doc.namespace_uri(root).unwrap_or(ns::SOAP11_ENV).to_string();
                let prefix = doc.lookup_prefix(root, &soap).unwrap_or_else(|| "soap".to_string());
                let header = doc.create_element(Some(&soap), &format!("{}:Header", prefix));
                let body = doc.body();
                doc.insert_before(root, header, body)?;
                header
            }
        };

        let existing = doc
            .child_elements(header)
            .into_iter()
            .find(|child| doc.has_name(*child, ns::WSSE, ns::node::SECURITY));
        let element = match existing {
            Some(element) => element,
            None => {
                let element = doc.create_element(Some(ns::WSSE), "wsse:Security");
                let first = doc.first_child_element(header);
                doc.insert_before(header, element, first)?;
                debug!("Created security header");
                element
            }
        };
        Ok(Self {
            element,
            pinned_first: None,
            pinned_last: None,
        })
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Header children in document order.
    pub fn children(&self, doc: &dyn Document) -> Vec<NodeId> {
        doc.child_elements(self.element)
    }

    /// Insert at the front, behind a timestamp pinned there.
    pub fn prepend(&self, doc: &mut dyn Document, node: NodeId) -> DocumentResult<()> {
        let reference = match self.pinned_first {
            Some(pinned) if pinned != node => doc.next_sibling_element(pinned),
            _ => doc.first_child_element(self.element),
        };
        doc.insert_before(self.element, node, reference)
    }

    /// Insert at the back, ahead of a timestamp pinned there.
    pub fn append(&self, doc: &mut dyn Document, node: NodeId) -> DocumentResult<()> {
        match self.pinned_last {
            Some(pinned) if pinned != node => doc.insert_before(self.element, node, Some(pinned)),
            _ => doc.append_child(self.element, node),
        }
    }

    /// Take `node` out of the header again. Nodes elsewhere are left alone.
    pub fn remove(&mut self, doc: &mut dyn Document, node: NodeId) -> DocumentResult<()> {
        if doc.parent(node) != Some(self.element) {
            return Ok(());
        }
        self.pinned_first = self.pinned_first.filter(|pinned| *pinned != node);
        self.pinned_last = self.pinned_last.filter(|pinned| *pinned != node);
        doc.remove_child(self.element, node)
    }

    /// Move `node` to the front and keep it there.
    pub fn move_to_front(&mut self, doc: &mut dyn Document, node: NodeId) -> DocumentResult<()> {
        let first = doc.first_child_element(self.element);
        doc.insert_before(self.element, node, first)?;
        self.pinned_first = Some(node);
        self.pinned_last = self.pinned_last.filter(|pinned| *pinned != node);
        Ok(())
    }

    /// Move `node` to the back and keep it there.
    pub fn move_to_back(&mut self, doc: &mut dyn Document, node: NodeId) -> DocumentResult<()> {
        doc.append_child(self.element, node)?;
        self.pinned_last = Some(node);
        self.pinned_first = self.pinned_first.filter(|pinned| *pinned != node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbind_core::{Dom, SoapVersion};

    fn detached(dom: &mut Dom, name: &str) -> NodeId {
        dom.create_element(Some("urn:example"), name)
    }

    #[test]
    fn test_creates_header_before_body() {
        let mut dom = Dom::new(Some(ns::SOAP12_ENV), "env:Envelope");
        let root = dom.document_element();
        let body = dom.add_element(root, ns::SOAP12_ENV, "env:Body").unwrap();
        let security = SecurityHeader::find_or_create(&mut dom).unwrap();
        let header = dom.header().unwrap();
        assert_eq!(dom.child_elements(root), vec![header, body]);
        assert_eq!(dom.local_name(header), "Header");
        assert_eq!(dom.parent(security.element()), Some(header));
        assert!(dom.to_xml().contains("<env:Header>"));
    }

    #[test]
    fn test_reuses_existing_security_header() {
        let mut dom = Dom::soap_envelope(SoapVersion::Soap11);
        let first = SecurityHeader::find_or_create(&mut dom).unwrap();
        let second = SecurityHeader::find_or_create(&mut dom).unwrap();
        assert_eq!(first.element(), second.element());
        assert_eq!(dom.child_elements(dom.header().unwrap()).len(), 1);
    }

    #[test]
    fn test_pinned_timestamp_stays_at_the_ends() {
        let mut dom = Dom::soap_envelope(SoapVersion::Soap11);
        let mut security = SecurityHeader::find_or_create(&mut dom).unwrap();
        let ts = detached(&mut dom, "ex:Timestamp");
        let a = detached(&mut dom, "ex:A");
        let b = detached(&mut dom, "ex:B");
        let c = detached(&mut dom, "ex:C");

        security.prepend(&mut dom, ts).unwrap();
        security.append(&mut dom, a).unwrap();
        security.move_to_back(&mut dom, ts).unwrap();
        security.append(&mut dom, b).unwrap();
        security.prepend(&mut dom, c).unwrap();
        assert_eq!(security.children(&dom), vec![c, a, b, ts]);

        security.move_to_front(&mut dom, ts).unwrap();
        let d = detached(&mut dom, "ex:D");
        let e = detached(&mut dom, "ex:E");
        security.prepend(&mut dom, d).unwrap();
        security.append(&mut dom, e).unwrap();
        assert_eq!(security.children(&dom), vec![ts, d, c, a, b, e]);
    }

    #[test]
    fn test_remove_only_touches_header_children() {
        let mut dom = Dom::soap_envelope(SoapVersion::Soap11);
        let mut security = SecurityHeader::find_or_create(&mut dom).unwrap();
        let a = detached(&mut dom, "ex:A");
        let b = detached(&mut dom, "ex:B");
        let elsewhere = dom.add_element(dom.body().unwrap(), "urn:example", "ex:Payload").unwrap();
        security.append(&mut dom, a).unwrap();
        security.move_to_back(&mut dom, b).unwrap();

        security.remove(&mut dom, b).unwrap();
        security.remove(&mut dom, elsewhere).unwrap();
        assert_eq!(security.children(&dom), vec![a]);
        assert_eq!(dom.parent(elsewhere), dom.body());

        // No longer pinned, so appends go last again.
        let c = detached(&mut dom, "ex:C");
        security.append(&mut dom, c).unwrap();
        assert_eq!(security.children(&dom), vec![a, c]);
    }
}
