use std::{
    cell::{Ref, RefCell, RefMut},
    fmt::Debug,
    mem::replace,
    rc::{Rc, Weak},
};

use crate::{
    error::XmlError,
    verifier::{check_namespace_uri, check_ncname, split_qname},
};

use super::{
    NodeType, XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    attr::AttrRef,
    character_data::TextRef,
    namespace::NamespaceRef,
    node::{Node, NodeConnection, NodeRef, NodeWeakRef, compute_base_uri},
    parent_node::{MutationCheck, ParentConnection, ParentNode},
};

pub struct Element {
    parent_node: Option<NodeWeakRef>,
    /// - `Element`
    /// - `Text`
    /// - `Comment`
    /// - `ProcessingInstruction`
    children: Vec<NodeRef>,
    attributes: Vec<AttrRef>,
    /// Namespaces declared in addition to the ones used by the element and its attributes,
    /// in declaration order.
    declarations: Vec<(String, String)>,
    local_name: String,
    prefix: String,
    namespace_uri: String,
    actual_base_uri: Option<String>,
    check: Option<Rc<dyn MutationCheck>>,
}

/// Bindings ignored while looking for a namespace conflict on an element.
#[derive(Clone, Copy)]
pub(super) enum Exclude<'a> {
    Nothing,
    /// The prefix of the element itself is about to change.
    OwnName,
    /// The attribute is about to change its own prefix.
    Attribute(&'a AttrRef),
}

/// Wrapper of `Rc<RefCell<Element>>`.
#[derive(Clone)]
pub struct ElementRef(pub(super) Rc<RefCell<Element>>);

impl ElementRef {
    /// Create an element in no namespace.
    ///
    /// `name` may carry the `xml` prefix, which implies the XML namespace.
    /// Any other prefix needs a namespace URI; use [`ElementRef::with_namespace`].
    pub fn new(name: &str) -> Result<Self, XmlError> {
        let (prefix, local_name) = split_qname(name)?;
        let uri = if prefix == "xml" { XML_XML_NAMESPACE } else { "" };
        Self::build(prefix, local_name, uri, None)
    }

    /// Create an element whose qualified name is `qname` in the namespace `uri`.
    pub fn with_namespace(qname: &str, uri: &str) -> Result<Self, XmlError> {
        let (prefix, local_name) = split_qname(qname)?;
        Self::build(prefix, local_name, uri, None)
    }

    /// Same as [`ElementRef::with_namespace`], and every mutation of the new element
    /// is additionally submitted to `check`.
    ///
    /// Copies of the element share `check`.
    pub fn with_check(
        qname: &str,
        uri: &str,
        check: Rc<dyn MutationCheck>,
    ) -> Result<Self, XmlError> {
        let (prefix, local_name) = split_qname(qname)?;
        Self::build(prefix, local_name, uri, Some(check))
    }

    fn build(
        prefix: &str,
        local_name: &str,
        uri: &str,
        check: Option<Rc<dyn MutationCheck>>,
    ) -> Result<Self, XmlError> {
        check_element_namespace(prefix, uri)?;
        Ok(Self(Rc::new(RefCell::new(Element {
            parent_node: None,
            children: vec![],
            attributes: vec![],
            declarations: vec![],
            local_name: local_name.to_owned(),
            prefix: prefix.to_owned(),
            namespace_uri: uri.to_owned(),
            actual_base_uri: None,
            check,
        }))))
    }

    /// Generate [`ElementWeakRef`] from `self`.
    pub fn downgrade(&self) -> ElementWeakRef {
        ElementWeakRef(Rc::downgrade(&self.0))
    }

    pub fn local_name(&self) -> String {
        self.0.borrow().local_name.clone()
    }

    /// The prefix of this element, or an empty string if it has none.
    pub fn prefix(&self) -> String {
        self.0.borrow().prefix.clone()
    }

    /// The namespace URI of this element, or an empty string if it is in no namespace.
    pub fn namespace_uri(&self) -> String {
        self.0.borrow().namespace_uri.clone()
    }

    pub fn qualified_name(&self) -> String {
        let elem = self.0.borrow();
        if elem.prefix.is_empty() {
            elem.local_name.clone()
        } else {
            format!("{}:{}", elem.prefix, elem.local_name)
        }
    }

    pub fn set_local_name(&mut self, local_name: &str) -> Result<(), XmlError> {
        check_ncname(local_name)?;
        self.0.borrow_mut().local_name = local_name.to_owned();
        Ok(())
    }

    /// # Errors
    /// `NamespaceConflict` if `prefix` cannot be bound to the current namespace URI,
    /// or if an attribute or a declaration of this element already binds it to
    /// another URI.
    pub fn set_namespace_prefix(&mut self, prefix: &str) -> Result<(), XmlError> {
        if !prefix.is_empty() {
            check_ncname(prefix)?;
        }
        let uri = self.namespace_uri();
        check_element_namespace(prefix, &uri)?;
        self.check_binding(prefix, &uri, Exclude::OwnName)?;
        self.0.borrow_mut().prefix = prefix.to_owned();
        Ok(())
    }

    /// # Errors
    /// `NamespaceConflict` if the current prefix cannot be bound to `uri`,
    /// or if an attribute or a declaration of this element binds it to another URI.
    pub fn set_namespace_uri(&mut self, uri: &str) -> Result<(), XmlError> {
        let prefix = self.prefix();
        check_element_namespace(&prefix, uri)?;
        self.check_binding(&prefix, uri, Exclude::OwnName)?;
        self.0.borrow_mut().namespace_uri = uri.to_owned();
        Ok(())
    }

    /// Copy this element with its attributes and namespace declarations, but no children.
    pub fn shallow_copy(&self) -> Self {
        let elem = self.0.borrow();
        let new = Self(Rc::new(RefCell::new(Element {
            parent_node: None,
            children: vec![],
            attributes: vec![],
            declarations: elem.declarations.clone(),
            local_name: elem.local_name.clone(),
            prefix: elem.prefix.clone(),
            namespace_uri: elem.namespace_uri.clone(),
            actual_base_uri: elem.actual_base_uri.clone(),
            check: elem.check.clone(),
        })));
        let parent = NodeWeakRef::Element(new.downgrade());
        let attributes = elem
            .attributes
            .iter()
            .map(|attr| {
                let mut attr = attr.copy();
                attr.set_parent_node(Some(parent.clone()));
                attr
            })
            .collect();
        new.0.borrow_mut().attributes = attributes;
        new
    }

    /// Attach `attribute` to this element.
    ///
    /// An attribute with the same local name and namespace URI is replaced and detached.
    ///
    /// # Errors
    /// - `MultipleParent` if `attribute` belongs to another element.
    /// - `NamespaceConflict` if the prefix of `attribute` is bound to another URI here.
    pub fn add_attribute(&mut self, mut attribute: AttrRef) -> Result<(), XmlError> {
        if let Some(owner) = attribute.owner_element() {
            if Rc::ptr_eq(&owner.0, &self.0) {
                return Ok(());
            }
            return Err(XmlError::MultipleParent);
        }
        let (local_name, prefix, uri) = (
            attribute.local_name(),
            attribute.prefix(),
            attribute.namespace_uri(),
        );
        if !prefix.is_empty() {
            self.check_binding(&prefix, &uri, Exclude::Nothing)?;
        }
        if let Some(check) = self.mutation_check() {
            check.check_add_attribute(self, &attribute)?;
        }

        attribute.set_parent_node(Some(NodeWeakRef::Element(self.downgrade())));
        let old = {
            let mut elem = self.0.borrow_mut();
            let pos = elem
                .attributes
                .iter()
                .position(|attr| attr.local_name() == local_name && attr.namespace_uri() == uri);
            match pos {
                Some(pos) => Some(replace(&mut elem.attributes[pos], attribute)),
                None => {
                    elem.attributes.push(attribute);
                    None
                }
            }
        };
        if let Some(mut old) = old {
            old.set_parent_node(None);
        }
        Ok(())
    }

    /// Detach `attribute` from this element and return it.
    ///
    /// # Errors
    /// `NoSuchAttribute` if `attribute` is not attached to this element.
    pub fn remove_attribute(&mut self, attribute: &AttrRef) -> Result<AttrRef, XmlError> {
        let pos = self
            .0
            .borrow()
            .attributes
            .iter()
            .position(|attr| attr.is_same_attribute(attribute))
            .ok_or(XmlError::NoSuchAttribute)?;
        if let Some(check) = self.mutation_check() {
            check.check_remove_attribute(self, attribute)?;
        }

        let mut removed = self.0.borrow_mut().attributes.remove(pos);
        removed.set_parent_node(None);
        Ok(removed)
    }

    /// The attribute whose expanded name is `{uri}local_name`.
    pub fn attribute(&self, local_name: &str, uri: &str) -> Option<AttrRef> {
        self.0
            .borrow()
            .attributes
            .iter()
            .find(|attr| attr.local_name() == local_name && attr.namespace_uri() == uri)
            .cloned()
    }

    pub fn attribute_value(&self, local_name: &str, uri: &str) -> Option<String> {
        self.attribute(local_name, uri).map(|attr| attr.value())
    }

    pub fn attribute_count(&self) -> usize {
        self.0.borrow().attributes.len()
    }

    pub fn attribute_at(&self, index: usize) -> Option<AttrRef> {
        self.0.borrow().attributes.get(index).cloned()
    }

    pub fn attributes(&self) -> Vec<AttrRef> {
        self.0.borrow().attributes.clone()
    }

    /// Declare `prefix` for `uri` on this element.
    ///
    /// Declaring the `xml` prefix for the XML namespace does nothing.
    ///
    /// # Errors
    /// - `IllegalName` if `prefix` is not an NCName or is `xmlns`.
    /// - `NamespaceConflict` if the binding is reserved or illegal, or if `prefix`
    ///   is already bound to another URI on this element.
    pub fn add_namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if prefix == "xmlns" {
            return Err(XmlError::illegal_name(
                prefix,
                "the xmlns prefix cannot be declared",
            ));
        }
        if prefix == "xml" {
            if uri == XML_XML_NAMESPACE {
                return Ok(());
            }
            return Err(XmlError::namespace_conflict(
                prefix,
                uri,
                "the xml prefix can only be bound to the XML namespace",
            ));
        }
        if uri == XML_XML_NAMESPACE || uri == XML_NS_NAMESPACE {
            return Err(XmlError::namespace_conflict(
                prefix,
                uri,
                "reserved namespaces cannot be bound to other prefixes",
            ));
        }
        if !prefix.is_empty() {
            check_ncname(prefix)?;
            if uri.is_empty() {
                return Err(XmlError::namespace_conflict(
                    prefix,
                    uri,
                    "prefixes cannot be bound to the empty namespace",
                ));
            }
        }
        check_namespace_uri(uri)?;
        self.check_binding(prefix, uri, Exclude::Nothing)?;
        if let Some(check) = self.mutation_check() {
            check.check_add_namespace_declaration(self, prefix, uri)?;
        }

        let mut elem = self.0.borrow_mut();
        if !elem.declarations.iter().any(|(p, _)| p == prefix) {
            elem.declarations.push((prefix.to_owned(), uri.to_owned()));
        }
        Ok(())
    }

    /// Remove the additional declaration of `prefix`.
    ///
    /// Prefixes used by the element or its attributes are not affected.
    /// If `prefix` is not declared here, do nothing.
    pub fn remove_namespace_declaration(&mut self, prefix: &str) -> Result<(), XmlError> {
        let Some(pos) = self
            .0
            .borrow()
            .declarations
            .iter()
            .position(|(p, _)| p == prefix)
        else {
            return Ok(());
        };
        if let Some(check) = self.mutation_check() {
            check.check_remove_namespace_declaration(self, prefix)?;
        }
        self.0.borrow_mut().declarations.remove(pos);
        Ok(())
    }

    /// Prefixes bound on this element, by its name, by its attributes or
    /// by additional declarations. The `xml` prefix is never included.
    fn declared_prefixes(&self) -> Vec<String> {
        let elem = self.0.borrow();
        let mut prefixes: Vec<String> = vec![];
        let candidates = std::iter::once(elem.prefix.clone())
            .chain(elem.declarations.iter().map(|(p, _)| p.clone()))
            .chain(
                elem.attributes
                    .iter()
                    .map(|attr| attr.prefix())
                    .filter(|prefix| !prefix.is_empty()),
            );
        for prefix in candidates {
            if prefix != "xml" && !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        prefixes
    }

    /// The number of distinct prefixes bound on this element.
    pub fn namespace_declaration_count(&self) -> usize {
        self.declared_prefixes().len()
    }

    /// The `index`-th prefix bound on this element, in the order
    /// element, additional declarations, attributes.
    pub fn namespace_prefix_at(&self, index: usize) -> Option<String> {
        self.declared_prefixes().into_iter().nth(index)
    }

    /// The URI bound to `prefix` on this element only.
    pub fn local_namespace_uri(&self, prefix: &str) -> Option<String> {
        self.local_binding(prefix, Exclude::Nothing)
    }

    pub(super) fn local_binding(&self, prefix: &str, exclude: Exclude<'_>) -> Option<String> {
        let elem = self.0.borrow();
        if !matches!(exclude, Exclude::OwnName) && elem.prefix == prefix {
            return Some(elem.namespace_uri.clone());
        }
        match prefix {
            "xml" => return Some(XML_XML_NAMESPACE.to_owned()),
            "xmlns" => return Some(XML_NS_NAMESPACE.to_owned()),
            _ => {}
        }
        if let Some((_, uri)) = elem.declarations.iter().find(|(p, _)| p == prefix) {
            return Some(uri.clone());
        }
        if prefix.is_empty() {
            return None;
        }
        elem.attributes
            .iter()
            .filter(|attr| !matches!(exclude, Exclude::Attribute(a) if a.is_same_attribute(attr)))
            .find(|attr| attr.prefix() == prefix)
            .map(|attr| attr.namespace_uri())
    }

    /// Fail if `prefix` is already bound on this element to a URI other than `uri`.
    pub(super) fn check_binding(
        &self,
        prefix: &str,
        uri: &str,
        exclude: Exclude<'_>,
    ) -> Result<(), XmlError> {
        match self.local_binding(prefix, exclude) {
            Some(bound) if bound != uri => Err(XmlError::namespace_conflict(
                prefix,
                uri,
                format!("the prefix is already bound to '{bound}' on this element"),
            )),
            _ => Ok(()),
        }
    }

    /// The URI bound to `prefix` in the scope of this element.
    ///
    /// Ancestors are consulted at call time, the nearest binding wins.
    /// An unbound empty prefix means no namespace and yields an empty string;
    /// any other unbound prefix yields `None`.
    pub fn namespace_uri_for_prefix(&self, prefix: &str) -> Option<String> {
        let mut current = Some(self.clone());
        while let Some(elem) = current {
            if let Some(uri) = elem.local_namespace_uri(prefix) {
                return Some(uri);
            }
            current = elem.parent_node().and_then(|parent| parent.as_element());
        }
        prefix.is_empty().then(String::new)
    }

    /// The namespace nodes of the XPath namespace axis of this element.
    ///
    /// Includes the `xml` binding, and excludes an undeclared default namespace.
    pub fn namespace_nodes(&self) -> Vec<NamespaceRef> {
        let mut bindings: Vec<(String, String)> = vec![];
        let mut current = Some(self.clone());
        while let Some(elem) = current {
            for prefix in elem.declared_prefixes() {
                if bindings.iter().all(|(p, _)| *p != prefix) {
                    let uri = elem.local_namespace_uri(&prefix).unwrap_or_default();
                    bindings.push((prefix, uri));
                }
            }
            current = elem.parent_node().and_then(|parent| parent.as_element());
        }
        bindings.push(("xml".to_owned(), XML_XML_NAMESPACE.to_owned()));

        bindings
            .into_iter()
            .filter(|(prefix, uri)| !(prefix.is_empty() && uri.is_empty()))
            .map(|(prefix, uri)| NamespaceRef::attached(prefix, uri, self))
            .collect()
    }

    /// Child elements of this element, in document order.
    pub fn child_elements(&self) -> Vec<ElementRef> {
        self.0
            .borrow()
            .children
            .iter()
            .filter_map(|child| child.as_element())
            .collect()
    }

    /// Child elements whose expanded name is `{uri}local_name`.
    pub fn child_elements_by_name(&self, local_name: &str, uri: &str) -> Vec<ElementRef> {
        self.child_elements()
            .into_iter()
            .filter(|elem| elem.has_name(local_name, uri))
            .collect()
    }

    pub fn first_child_element(&self, local_name: &str, uri: &str) -> Option<ElementRef> {
        self.0
            .borrow()
            .children
            .iter()
            .filter_map(|child| child.as_element())
            .find(|elem| elem.has_name(local_name, uri))
    }

    fn has_name(&self, local_name: &str, uri: &str) -> bool {
        let elem = self.0.borrow();
        elem.local_name == local_name && elem.namespace_uri == uri
    }

    /// Append a text node holding `text`.
    pub fn append_text(&mut self, text: &str) -> Result<(), XmlError> {
        let text = TextRef::new(text)?;
        self.append_child(text)
    }

    /// Remove all children and return them, detached, in their original order.
    pub fn remove_children(&mut self) -> Result<Vec<NodeRef>, XmlError> {
        if let Some(check) = self.mutation_check() {
            let this: NodeRef = self.clone().into();
            for (position, child) in self.children_ref().iter().enumerate() {
                check.check_remove_child(&this, child, position)?;
            }
        }
        let mut children = std::mem::take(&mut *self.children_mut());
        for child in &mut children {
            child.set_parent_node(None);
        }
        Ok(children)
    }

    /// Attach `attribute` without any check.
    /// The builder uses this after resolving every name itself.
    pub(crate) fn fast_add_attribute(&mut self, mut attribute: AttrRef) {
        attribute.set_parent_node(Some(NodeWeakRef::Element(self.downgrade())));
        self.0.borrow_mut().attributes.push(attribute);
    }

    pub(crate) fn fast_add_namespace_declaration(&mut self, prefix: &str, uri: &str) {
        let mut elem = self.0.borrow_mut();
        if !elem.declarations.iter().any(|(p, _)| p == prefix) {
            elem.declarations.push((prefix.to_owned(), uri.to_owned()));
        }
    }
}

/// Rules for the name of an element, independent of its position in a tree.
fn check_element_namespace(prefix: &str, uri: &str) -> Result<(), XmlError> {
    if prefix == "xmlns" {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "elements cannot use the xmlns prefix",
        ));
    }
    if uri == XML_NS_NAMESPACE {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "elements cannot be in the xmlns namespace",
        ));
    }
    if prefix == "xml" && uri != XML_XML_NAMESPACE {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "the xml prefix can only be bound to the XML namespace",
        ));
    }
    if uri == XML_XML_NAMESPACE && prefix != "xml" {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "the XML namespace can only be bound to the xml prefix",
        ));
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "prefixed elements must have a namespace URI",
        ));
    }
    check_namespace_uri(uri)
}

impl Node for ElementRef {
    fn node_type(&self) -> NodeType {
        NodeType::Element
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    /// The concatenation of all descendant text nodes, in document order.
    fn value(&self) -> String {
        let mut value = String::new();
        let mut stack: Vec<NodeRef> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                NodeRef::Text(text) => value.push_str(&text.value()),
                NodeRef::Element(elem) => stack.extend(elem.children().into_iter().rev()),
                _ => {}
            }
        }
        value
    }

    fn copy(&self) -> Self {
        let root = self.shallow_copy();
        let mut stack = vec![(self.clone(), root.clone())];
        while let Some((source, mut target)) = stack.pop() {
            for child in source.children() {
                match child {
                    NodeRef::Element(elem) => {
                        let copied = elem.shallow_copy();
                        target.fast_append(copied.clone().into());
                        stack.push((elem, copied));
                    }
                    other => target.fast_append(other.copy()),
                }
            }
        }
        root
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Element(other) if Rc::ptr_eq(&self.0, &other.0))
    }

    fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    fn child(&self, index: usize) -> Option<NodeRef> {
        self.0.borrow().children.get(index).cloned()
    }

    fn base_uri(&self) -> String {
        compute_base_uri(self.clone().into())
    }
}

impl NodeConnection for ElementRef {
    fn set_parent_node(&mut self, new_parent: Option<NodeWeakRef>) -> Option<NodeWeakRef> {
        replace(&mut self.0.borrow_mut().parent_node, new_parent)
    }
}

impl ParentNode for ElementRef {
    fn actual_base_uri(&self) -> Option<String> {
        self.0.borrow().actual_base_uri.clone()
    }
}

impl ParentConnection for ElementRef {
    fn children_ref(&self) -> Ref<'_, Vec<NodeRef>> {
        Ref::map(self.0.borrow(), |elem| &elem.children)
    }

    fn children_mut(&self) -> RefMut<'_, Vec<NodeRef>> {
        RefMut::map(self.0.borrow_mut(), |elem| &mut elem.children)
    }

    fn downgrade_parent(&self) -> NodeWeakRef {
        NodeWeakRef::Element(self.downgrade())
    }

    fn mutation_check(&self) -> Option<Rc<dyn MutationCheck>> {
        self.0.borrow().check.clone()
    }

    fn set_actual_base_uri(&mut self, uri: Option<String>) {
        self.0.borrow_mut().actual_base_uri = uri;
    }

    /// Reject `child` if it is this element or one of its ancestors.
    fn check_insertion(
        &self,
        child: &NodeRef,
        _position: usize,
        _replacing: Option<&NodeRef>,
    ) -> Result<(), XmlError> {
        if !matches!(child, NodeRef::Element(_)) {
            return Ok(());
        }
        let mut current: Option<NodeRef> = Some(self.clone().into());
        while let Some(node) = current {
            if node.is_same_node(child) {
                return Err(XmlError::Cycle);
            }
            current = node.parent_node();
        }
        Ok(())
    }
}

impl From<ElementRef> for NodeRef {
    fn from(value: ElementRef) -> Self {
        NodeRef::Element(value)
    }
}

impl Debug for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elem = self.0.borrow();
        f.debug_struct("Element")
            .field("local_name", &elem.local_name)
            .field("prefix", &elem.prefix)
            .field("namespace_uri", &elem.namespace_uri)
            .field("attributes", &elem.attributes)
            .field("children", &elem.children.len())
            .finish()
    }
}

/// Wrapper of `Weak<RefCell<Element>>`.
#[derive(Clone)]
pub struct ElementWeakRef(Weak<RefCell<Element>>);

impl ElementWeakRef {
    /// Generate [`ElementRef`] from `self`.
    /// Success conditions are the same as for [`std::rc::Weak::upgrade`].
    pub fn upgrade(&self) -> Option<ElementRef> {
        self.0.upgrade().map(ElementRef)
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::{CommentRef, DocumentRef};

    use super::*;

    #[test]
    fn test_self_insertion() {
        let mut elem = ElementRef::new("e").unwrap();
        let other = elem.clone();
        assert_eq!(elem.append_child(other), Err(XmlError::Cycle));
        assert_eq!(elem.child_count(), 0);
    }

    #[test]
    fn test_ancestor_insertion() {
        let mut a = ElementRef::new("a").unwrap();
        let mut b = ElementRef::new("b").unwrap();
        let mut c = ElementRef::new("c").unwrap();
        a.append_child(b.clone()).unwrap();
        b.append_child(c.clone()).unwrap();

        assert_eq!(c.append_child(a.clone()), Err(XmlError::Cycle));
        assert_eq!(c.child_count(), 0);
        assert!(a.parent_node().is_none());
        assert_eq!(a.child_count(), 1);
    }

    #[test]
    fn test_multiple_parent() {
        let mut a = ElementRef::new("a").unwrap();
        let mut b = ElementRef::new("b").unwrap();
        let c = ElementRef::new("c").unwrap();
        a.append_child(c.clone()).unwrap();
        assert_eq!(b.append_child(c.clone()), Err(XmlError::MultipleParent));

        let mut c: NodeRef = c.into();
        c.detach().unwrap();
        b.append_child(c.clone()).unwrap();
        assert_eq!(a.child_count(), 0);
        assert!(c.parent_node().unwrap().is_same_node(&b.into()));
    }

    #[test]
    fn test_insert_position() {
        let mut a = ElementRef::new("a").unwrap();
        a.append_text("1").unwrap();
        a.append_text("3").unwrap();
        a.insert_child(TextRef::new("2").unwrap(), 1).unwrap();
        assert_eq!(a.value(), "123");
        assert_eq!(
            a.insert_child(TextRef::new("4").unwrap(), 4),
            Err(XmlError::IndexOutOfBounds { index: 4, len: 3 })
        );
        assert!(matches!(
            a.insert_child(DocumentRef::new(ElementRef::new("r").unwrap()).unwrap(), 0),
            Err(XmlError::IllegalAdd { .. })
        ));
    }

    #[test]
    fn test_replace_child() {
        let mut a = ElementRef::new("a").unwrap();
        let old: NodeRef = CommentRef::new("old").unwrap().into();
        a.append_child(old.clone()).unwrap();
        a.replace_child(&old, old.clone()).unwrap();
        assert_eq!(a.child_count(), 1);

        let new = ElementRef::new("new").unwrap();
        a.replace_child(&old, new.clone()).unwrap();
        assert!(old.parent_node().is_none());
        assert!(a.child(0).unwrap().is_same_node(&new.into()));

        let stranger: NodeRef = CommentRef::new("stranger").unwrap().into();
        assert_eq!(
            a.replace_child(&stranger, TextRef::new("x").unwrap()),
            Err(XmlError::NoSuchChild)
        );
        // rejected replacement leaves the tree unchanged
        let current = a.child(0).unwrap();
        assert_eq!(a.replace_child(&current, a.clone()), Err(XmlError::Cycle));
        assert!(a.child(0).unwrap().is_same_node(&current));
    }

    #[test]
    fn test_names() {
        let elem = ElementRef::with_namespace("pre:local", "http://example.com/").unwrap();
        assert_eq!(elem.qualified_name(), "pre:local");
        assert_eq!(elem.prefix(), "pre");
        assert_eq!(elem.local_name(), "local");

        assert!(matches!(
            ElementRef::new("pre:local"),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            ElementRef::with_namespace("xml:local", "http://example.com/"),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            ElementRef::with_namespace("pre:local", XML_XML_NAMESPACE),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            ElementRef::with_namespace("local", "relative/uri"),
            Err(XmlError::MalformedUri { .. })
        ));
        assert_eq!(
            ElementRef::new("xml:space").unwrap().namespace_uri(),
            XML_XML_NAMESPACE
        );
        assert!(matches!(
            ElementRef::new("1abc"),
            Err(XmlError::IllegalName { .. })
        ));
    }

    #[test]
    fn test_set_namespace() {
        let mut elem = ElementRef::with_namespace("pre:local", "http://a.example/").unwrap();
        elem.add_attribute(
            AttrRef::with_namespace("pre:attr", "http://a.example/", "v").unwrap(),
        )
        .unwrap();
        assert!(matches!(
            elem.set_namespace_uri("http://b.example/"),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert_eq!(elem.namespace_uri(), "http://a.example/");
        elem.set_namespace_prefix("other").unwrap();
        elem.set_namespace_uri("http://b.example/").unwrap();
        assert_eq!(elem.qualified_name(), "other:local");
        assert!(matches!(
            elem.set_namespace_uri(""),
            Err(XmlError::NamespaceConflict { .. })
        ));
    }

    #[test]
    fn test_attributes() {
        let mut elem = ElementRef::new("e").unwrap();
        elem.add_attribute(AttrRef::new("a", "1").unwrap()).unwrap();
        elem.add_attribute(AttrRef::new("b", "2").unwrap()).unwrap();
        let replaced = elem.attribute("a", "").unwrap();
        elem.add_attribute(AttrRef::new("a", "3").unwrap()).unwrap();
        assert_eq!(elem.attribute_count(), 2);
        assert_eq!(elem.attribute_value("a", "").as_deref(), Some("3"));
        assert!(replaced.owner_element().is_none());

        let b = elem.attribute("b", "").unwrap();
        let mut other = ElementRef::new("other").unwrap();
        assert_eq!(other.add_attribute(b.clone()), Err(XmlError::MultipleParent));
        assert_eq!(other.remove_attribute(&b), Err(XmlError::NoSuchAttribute));
        elem.remove_attribute(&b).unwrap();
        other.add_attribute(b).unwrap();
        assert_eq!(elem.attribute_count(), 1);
        assert_eq!(other.attribute_count(), 1);
    }

    #[test]
    fn test_attribute_prefix_conflict() {
        let mut elem = ElementRef::new("e").unwrap();
        elem.add_namespace_declaration("p", "http://a.example/")
            .unwrap();
        let attr = AttrRef::with_namespace("p:x", "http://b.example/", "v").unwrap();
        assert!(matches!(
            elem.add_attribute(attr),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert_eq!(elem.attribute_count(), 0);
    }

    #[test]
    fn test_namespace_declarations() {
        let mut elem = ElementRef::with_namespace("p:e", "http://p.example/").unwrap();
        elem.add_namespace_declaration("q", "http://q.example/")
            .unwrap();
        elem.add_namespace_declaration("xml", XML_XML_NAMESPACE)
            .unwrap();
        assert!(matches!(
            elem.add_namespace_declaration("p", "http://other.example/"),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            elem.add_namespace_declaration("xmlns", "http://other.example/"),
            Err(XmlError::IllegalName { .. })
        ));
        assert!(matches!(
            elem.add_namespace_declaration("xml", "http://other.example/"),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            elem.add_namespace_declaration("r", XML_XML_NAMESPACE),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(matches!(
            elem.add_namespace_declaration("r", ""),
            Err(XmlError::NamespaceConflict { .. })
        ));

        assert_eq!(elem.namespace_declaration_count(), 2);
        assert_eq!(elem.namespace_prefix_at(0).as_deref(), Some("p"));
        assert_eq!(elem.namespace_prefix_at(1).as_deref(), Some("q"));

        elem.remove_namespace_declaration("q").unwrap();
        elem.remove_namespace_declaration("p").unwrap();
        assert_eq!(elem.namespace_declaration_count(), 1);
        assert_eq!(elem.namespace_uri_for_prefix("p").as_deref(), Some("http://p.example/"));
    }

    #[test]
    fn test_namespace_scope() {
        let mut root = ElementRef::with_namespace("root", "http://default.example/").unwrap();
        root.add_namespace_declaration("a", "http://a.example/")
            .unwrap();
        let mut child = ElementRef::new("child").unwrap();
        let grandchild = ElementRef::with_namespace("a:gc", "http://a.example/").unwrap();
        child.append_child(grandchild.clone()).unwrap();
        root.append_child(child.clone()).unwrap();

        assert_eq!(grandchild.namespace_uri_for_prefix("a").as_deref(), Some("http://a.example/"));
        // the nearest binding of the default namespace is the unprefixed child itself
        assert_eq!(grandchild.namespace_uri_for_prefix("").as_deref(), Some(""));
        assert_eq!(root.namespace_uri_for_prefix("").as_deref(), Some("http://default.example/"));
        assert_eq!(grandchild.namespace_uri_for_prefix("unbound"), None);
        assert_eq!(grandchild.namespace_uri_for_prefix("xml").as_deref(), Some(XML_XML_NAMESPACE));

        let nodes = grandchild.namespace_nodes();
        let mut prefixes: Vec<String> = nodes.iter().map(|ns| ns.prefix()).collect();
        prefixes.sort();
        assert_eq!(prefixes, ["a", "xml"]);
    }

    #[test]
    fn test_value_and_copy() {
        let mut root = ElementRef::new("root").unwrap();
        root.add_attribute(AttrRef::new("id", "r").unwrap()).unwrap();
        root.append_text("a").unwrap();
        let mut child = ElementRef::new("child").unwrap();
        child.append_text("b").unwrap();
        child.append_child(CommentRef::new("ignored").unwrap()).unwrap();
        root.append_child(child).unwrap();
        root.append_text("c").unwrap();
        assert_eq!(root.value(), "abc");

        let copy = root.copy();
        assert!(!copy.is_same_node(&root.clone().into()));
        assert!(copy.parent_node().is_none());
        assert_eq!(copy.value(), "abc");
        assert_eq!(copy.attribute_value("id", "").as_deref(), Some("r"));
        let copied_child = copy.child(1).unwrap();
        assert!(copied_child.parent_node().unwrap().is_same_node(&copy.clone().into()));

        let shallow = root.shallow_copy();
        assert_eq!(shallow.child_count(), 0);
        assert_eq!(shallow.attribute_count(), 1);
    }

    #[test]
    fn test_child_elements() {
        let mut root = ElementRef::new("root").unwrap();
        root.append_child(ElementRef::new("a").unwrap()).unwrap();
        root.append_text("t").unwrap();
        root.append_child(ElementRef::with_namespace("a", "http://x.example/").unwrap())
            .unwrap();
        root.append_child(ElementRef::new("b").unwrap()).unwrap();

        assert_eq!(root.child_elements().len(), 3);
        assert_eq!(root.child_elements_by_name("a", "").len(), 1);
        let first = root.first_child_element("a", "http://x.example/").unwrap();
        assert_eq!(first.namespace_uri(), "http://x.example/");

        let removed = root.remove_children().unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(root.child_count(), 0);
        assert!(removed.iter().all(|node| node.parent_node().is_none()));
    }

    #[test]
    fn test_base_uri() {
        let mut root = ElementRef::new("root").unwrap();
        root.set_base_uri("http://example.com/dir/doc.xml").unwrap();
        let mut child = ElementRef::new("child").unwrap();
        child.add_attribute(AttrRef::new("xml:base", "sub/").unwrap())
            .unwrap();
        let text = TextRef::new("t").unwrap();
        child.append_child(text.clone()).unwrap();
        root.append_child(child.clone()).unwrap();

        assert_eq!(child.base_uri(), "http://example.com/dir/sub/");
        assert_eq!(text.base_uri(), "http://example.com/dir/sub/");
        assert!(matches!(
            root.set_base_uri("http://exa mple.com/"),
            Err(XmlError::MalformedUri { .. })
        ));
        assert_eq!(root.base_uri(), "http://example.com/dir/doc.xml");
    }
}
