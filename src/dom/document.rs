use std::{
    cell::{Ref, RefCell, RefMut},
    fmt::Debug,
    rc::{Rc, Weak},
};

use crate::error::XmlError;

use super::{
    NodeType,
    document_type::DocumentTypeRef,
    element::ElementRef,
    node::{Node, NodeConnection, NodeRef, NodeWeakRef},
    parent_node::{MutationCheck, ParentConnection, ParentNode},
};

pub struct Document {
    /// - `Element` (exactly one once the document is complete)
    /// - `ProcessingInstruction`
    /// - `Comment`
    /// - `DocumentType` (maximum of one, before the root element)
    children: Vec<NodeRef>,
    actual_base_uri: Option<String>,
    check: Option<Rc<dyn MutationCheck>>,
}

/// Wrapper of `Rc<RefCell<Document>>`.
///
/// A document always has exactly one root element. It can be replaced with
/// [`DocumentRef::set_root_element`], but never removed.
#[derive(Clone)]
pub struct DocumentRef(Rc<RefCell<Document>>);

impl DocumentRef {
    /// Create a document whose root element is `root`.
    ///
    /// # Errors
    /// `MultipleParent` if `root` already has a parent.
    pub fn new(root: ElementRef) -> Result<Self, XmlError> {
        Self::build(root, None)
    }

    /// Same as [`DocumentRef::new`], and every mutation of the document's child list
    /// is additionally submitted to `check`.
    pub fn with_check(root: ElementRef, check: Rc<dyn MutationCheck>) -> Result<Self, XmlError> {
        Self::build(root, Some(check))
    }

    fn build(root: ElementRef, check: Option<Rc<dyn MutationCheck>>) -> Result<Self, XmlError> {
        if root.parent_node().is_some() {
            return Err(XmlError::MultipleParent);
        }
        let mut doc = Self::empty(check);
        doc.fast_append(root.into());
        Ok(doc)
    }

    /// A document without root element.
    ///
    /// Only the builder may hold such a document, until its root element arrives.
    pub(crate) fn empty(check: Option<Rc<dyn MutationCheck>>) -> Self {
        Self(Rc::new(RefCell::new(Document {
            children: vec![],
            actual_base_uri: None,
            check,
        })))
    }

    /// Generate [`DocumentWeakRef`] from `self`.
    pub fn downgrade(&self) -> DocumentWeakRef {
        DocumentWeakRef(Rc::downgrade(&self.0))
    }

    pub fn root_element(&self) -> Option<ElementRef> {
        self.position_of_root()
            .and_then(|pos| self.0.borrow().children[pos].as_element())
    }

    fn position_of_root(&self) -> Option<usize> {
        self.0
            .borrow()
            .children
            .iter()
            .position(|child| matches!(child, NodeRef::Element(_)))
    }

    fn position_of_doc_type(&self) -> Option<usize> {
        self.0
            .borrow()
            .children
            .iter()
            .position(|child| matches!(child, NodeRef::DocumentType(_)))
    }

    /// Replace the root element by `root`, keeping every other child in place.
    ///
    /// # Errors
    /// `MultipleParent` if `root` already has a parent other than this document.
    pub fn set_root_element(&mut self, root: ElementRef) -> Result<(), XmlError> {
        match self.root_element() {
            Some(old) => self.replace_child(&old.into(), root),
            None => {
                let len = self.child_count();
                self.insert_child(root, len)
            }
        }
    }

    pub fn doc_type(&self) -> Option<DocumentTypeRef> {
        self.position_of_doc_type()
            .and_then(|pos| self.0.borrow().children[pos].as_document_type())
    }

    /// Replace the document type declaration in place, or insert it as the first child.
    pub fn set_doc_type(&mut self, doc_type: DocumentTypeRef) -> Result<(), XmlError> {
        match self.doc_type() {
            Some(old) => self.replace_child(&old.into(), doc_type),
            None => self.insert_child(doc_type, 0),
        }
    }
}

impl Node for DocumentRef {
    fn node_type(&self) -> NodeType {
        NodeType::Document
    }

    fn parent_node(&self) -> Option<NodeRef> {
        None
    }

    /// The value of the root element.
    fn value(&self) -> String {
        self.root_element()
            .map(|root| root.value())
            .unwrap_or_default()
    }

    /// Copy the whole tree.
    fn copy(&self) -> Self {
        let doc = self.0.borrow();
        let mut new = Self::empty(doc.check.clone());
        new.0.borrow_mut().actual_base_uri = doc.actual_base_uri.clone();
        for child in &doc.children {
            new.fast_append(child.copy());
        }
        new
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Document(other) if Rc::ptr_eq(&self.0, &other.0))
    }

    fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    fn child(&self, index: usize) -> Option<NodeRef> {
        self.0.borrow().children.get(index).cloned()
    }

    fn base_uri(&self) -> String {
        self.actual_base_uri().unwrap_or_default()
    }

    /// The XML declaration followed by every child on its own line.
    fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\"?>\n");
        for child in self.children() {
            xml.push_str(&child.to_xml());
            xml.push('\n');
        }
        xml
    }

    fn document(&self) -> Option<DocumentRef> {
        Some(self.clone())
    }
}

impl NodeConnection for DocumentRef {
    /// Documents are always roots.
    fn set_parent_node(&mut self, _: Option<NodeWeakRef>) -> Option<NodeWeakRef> {
        None
    }
}

impl ParentNode for DocumentRef {
    fn actual_base_uri(&self) -> Option<String> {
        self.0.borrow().actual_base_uri.clone()
    }
}

impl ParentConnection for DocumentRef {
    fn children_ref(&self) -> Ref<'_, Vec<NodeRef>> {
        Ref::map(self.0.borrow(), |doc| &doc.children)
    }

    fn children_mut(&self) -> RefMut<'_, Vec<NodeRef>> {
        RefMut::map(self.0.borrow_mut(), |doc| &mut doc.children)
    }

    fn downgrade_parent(&self) -> NodeWeakRef {
        NodeWeakRef::Document(self.downgrade())
    }

    fn mutation_check(&self) -> Option<Rc<dyn MutationCheck>> {
        self.0.borrow().check.clone()
    }

    fn set_actual_base_uri(&mut self, uri: Option<String>) {
        self.0.borrow_mut().actual_base_uri = uri;
    }

    fn check_insertion(
        &self,
        child: &NodeRef,
        position: usize,
        replacing: Option<&NodeRef>,
    ) -> Result<(), XmlError> {
        let root = self.position_of_root();
        let doc_type = self.position_of_doc_type();
        match child {
            NodeRef::Element(_) => {
                if root.is_some() && !matches!(replacing, Some(NodeRef::Element(_))) {
                    return Err(XmlError::illegal_add(
                        "a document cannot have more than one root element",
                    ));
                }
                let after_doc_type = match (doc_type, replacing) {
                    (_, Some(NodeRef::DocumentType(_))) | (None, _) => true,
                    (Some(doc_type), _) => position > doc_type,
                };
                if !after_doc_type {
                    return Err(XmlError::illegal_add(
                        "the root element must follow the document type declaration",
                    ));
                }
            }
            NodeRef::DocumentType(_) => {
                if doc_type.is_some() && !matches!(replacing, Some(NodeRef::DocumentType(_))) {
                    return Err(XmlError::illegal_add(
                        "a document cannot have more than one document type declaration",
                    ));
                }
                if root.is_some_and(|root| position > root) {
                    return Err(XmlError::illegal_add(
                        "the document type declaration must precede the root element",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_removal(
        &self,
        child: &NodeRef,
        replacement: Option<&NodeRef>,
    ) -> Result<(), XmlError> {
        if matches!(child, NodeRef::Element(_)) && !matches!(replacement, Some(NodeRef::Element(_)))
        {
            return Err(XmlError::Wellformedness {
                reason: "the root element cannot be removed".into(),
            });
        }
        Ok(())
    }
}

impl From<DocumentRef> for NodeRef {
    fn from(value: DocumentRef) -> Self {
        NodeRef::Document(value)
    }
}

impl Debug for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("children", &self.0.borrow().children)
            .finish()
    }
}

/// Wrapper of `Weak<RefCell<Document>>`.
#[derive(Clone)]
pub struct DocumentWeakRef(Weak<RefCell<Document>>);

impl DocumentWeakRef {
    /// Generate [`DocumentRef`] from `self`.
    /// Success conditions are the same as for [`std::rc::Weak::upgrade`].
    pub fn upgrade(&self) -> Option<DocumentRef> {
        self.0.upgrade().map(DocumentRef)
    }
}
