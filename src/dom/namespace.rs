use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    error::XmlError,
    verifier::{check_namespace_uri, check_ncname},
};

use super::{
    NodeType, XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    element::ElementRef,
    node::{Node, NodeRef, NodeWeakRef},
};

pub struct Namespace {
    parent_node: Option<NodeWeakRef>,
    prefix: String,
    uri: String,
}

/// A node of the XPath namespace axis: one binding in scope on an element.
///
/// Namespace nodes are snapshots. Changing them is not possible, and changing the
/// element does not update them.
#[derive(Clone)]
pub struct NamespaceRef(Rc<RefCell<Namespace>>);

impl NamespaceRef {
    /// # Errors
    /// - `IllegalName` if `prefix` is neither empty nor an NCName, or is `xmlns`.
    /// - `NamespaceConflict` if the binding is reserved or binds a prefix to no namespace.
    pub fn new(prefix: &str, uri: &str, parent: Option<&ElementRef>) -> Result<Self, XmlError> {
        if !prefix.is_empty() {
            check_ncname(prefix)?;
        }
        if prefix == "xmlns" {
            return Err(XmlError::illegal_name(
                prefix,
                "the xmlns prefix is never bound",
            ));
        }
        if (prefix == "xml") != (uri == XML_XML_NAMESPACE) || uri == XML_NS_NAMESPACE {
            return Err(XmlError::namespace_conflict(
                prefix,
                uri,
                "reserved prefixes and namespaces can only be bound to each other",
            ));
        }
        if !prefix.is_empty() && uri.is_empty() {
            return Err(XmlError::namespace_conflict(
                prefix,
                uri,
                "prefixes cannot be bound to the empty namespace",
            ));
        }
        check_namespace_uri(uri)?;
        Ok(Self::build(
            prefix.to_owned(),
            uri.to_owned(),
            parent.map(|parent| NodeWeakRef::Element(parent.downgrade())),
        ))
    }

    /// Used for bindings that were already checked by the element holding them.
    pub(super) fn attached(prefix: String, uri: String, parent: &ElementRef) -> Self {
        Self::build(prefix, uri, Some(NodeWeakRef::Element(parent.downgrade())))
    }

    fn build(prefix: String, uri: String, parent_node: Option<NodeWeakRef>) -> Self {
        Self(Rc::new(RefCell::new(Namespace {
            parent_node,
            prefix,
            uri,
        })))
    }

    pub fn prefix(&self) -> String {
        self.0.borrow().prefix.clone()
    }

    pub fn uri(&self) -> String {
        self.0.borrow().uri.clone()
    }
}

impl Node for NamespaceRef {
    fn node_type(&self) -> NodeType {
        NodeType::Namespace
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        self.uri()
    }

    fn copy(&self) -> Self {
        let ns = self.0.borrow();
        Self::build(ns.prefix.clone(), ns.uri.clone(), None)
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Namespace(other) if Rc::ptr_eq(&self.0, &other.0))
    }

    /// Remove the additional declaration of this prefix from the parent element,
    /// then forget the parent.
    fn detach(&mut self) -> Result<(), XmlError> {
        if let Some(mut parent) = self.parent_node().and_then(|parent| parent.as_element()) {
            let prefix = self.prefix();
            parent.remove_namespace_declaration(&prefix)?;
        }
        self.0.borrow_mut().parent_node = None;
        Ok(())
    }
}

impl Debug for NamespaceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = self.0.borrow();
        f.debug_struct("Namespace")
            .field("prefix", &ns.prefix)
            .field("uri", &ns.uri)
            .finish()
    }
}

impl_leaf_connection!((NamespaceRef, Namespace));
