use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use crate::{
    error::XmlError,
    verifier::{check_character_data, check_namespace_uri, check_ncname, split_qname},
};

use super::{
    NodeType, XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    element::{ElementRef, Exclude},
    node::{Node, NodeRef, NodeWeakRef},
};

/// The type an attribute was declared with in the DTD.
///
/// This is descriptive only. Nothing checks that values match their type,
/// nor that IDs are unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    /// No declaration was seen for the attribute.
    #[default]
    Undeclared,
    Cdata,
    Id,
    Idref,
    Idrefs,
    Nmtoken,
    Nmtokens,
    Notation,
    Entity,
    Entities,
    Enumeration,
}

impl AttributeType {
    /// The keyword of this type in an attribute-list declaration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undeclared => "UNDECLARED",
            Self::Cdata => "CDATA",
            Self::Id => "ID",
            Self::Idref => "IDREF",
            Self::Idrefs => "IDREFS",
            Self::Nmtoken => "NMTOKEN",
            Self::Nmtokens => "NMTOKENS",
            Self::Notation => "NOTATION",
            Self::Entity => "ENTITY",
            Self::Entities => "ENTITIES",
            Self::Enumeration => "ENUMERATION",
        }
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub struct Attr {
    /// The element this attribute is attached to.
    parent_node: Option<NodeWeakRef>,
    local_name: String,
    prefix: String,
    namespace_uri: String,
    value: String,
    attr_type: AttributeType,
}

/// Wrapper of `Rc<RefCell<Attr>>`.
///
/// `xmlns` and `xmlns:*` are never attributes. Namespace declarations are managed by
/// [`ElementRef::add_namespace_declaration`].
#[derive(Clone)]
pub struct AttrRef(Rc<RefCell<Attr>>);

impl AttrRef {
    /// Create an attribute in no namespace, or in the XML namespace if `name`
    /// has the `xml` prefix.
    ///
    /// # Errors
    /// - `IllegalName` if `name` is not a QName, or is `xmlns`.
    /// - `NamespaceConflict` if `name` has a prefix other than `xml`.
    /// - `IllegalData` if `value` contains characters XML does not allow.
    pub fn new(name: &str, value: &str) -> Result<Self, XmlError> {
        let (prefix, _) = split_qname(name)?;
        let uri = if prefix == "xml" { XML_XML_NAMESPACE } else { "" };
        Self::with_type(name, uri, value, AttributeType::Undeclared)
    }

    /// Create an attribute whose qualified name is `qname` in the namespace `uri`.
    pub fn with_namespace(qname: &str, uri: &str, value: &str) -> Result<Self, XmlError> {
        Self::with_type(qname, uri, value, AttributeType::Undeclared)
    }

    pub fn with_type(
        qname: &str,
        uri: &str,
        value: &str,
        attr_type: AttributeType,
    ) -> Result<Self, XmlError> {
        let (prefix, local_name) = split_qname(qname)?;
        check_attribute_name(prefix, local_name)?;
        check_attribute_namespace(prefix, uri)?;
        check_character_data(value)?;
        Ok(Self(Rc::new(RefCell::new(Attr {
            parent_node: None,
            local_name: local_name.to_owned(),
            prefix: prefix.to_owned(),
            namespace_uri: uri.to_owned(),
            value: value.to_owned(),
            attr_type,
        }))))
    }

    pub fn local_name(&self) -> String {
        self.0.borrow().local_name.clone()
    }

    pub fn prefix(&self) -> String {
        self.0.borrow().prefix.clone()
    }

    pub fn namespace_uri(&self) -> String {
        self.0.borrow().namespace_uri.clone()
    }

    pub fn qualified_name(&self) -> String {
        let attr = self.0.borrow();
        if attr.prefix.is_empty() {
            attr.local_name.clone()
        } else {
            format!("{}:{}", attr.prefix, attr.local_name)
        }
    }

    pub fn attr_type(&self) -> AttributeType {
        self.0.borrow().attr_type
    }

    pub fn set_type(&mut self, attr_type: AttributeType) {
        self.0.borrow_mut().attr_type = attr_type;
    }

    pub fn set_value(&mut self, value: &str) -> Result<(), XmlError> {
        check_character_data(value)?;
        self.0.borrow_mut().value = value.to_owned();
        Ok(())
    }

    /// # Errors
    /// - `IllegalName` if `local_name` is not an NCName.
    /// - `DuplicateAttribute` if the owner element already has an attribute
    ///   with the new expanded name.
    pub fn set_local_name(&mut self, local_name: &str) -> Result<(), XmlError> {
        let (prefix, uri) = (self.prefix(), self.namespace_uri());
        check_attribute_name(&prefix, local_name)?;
        self.check_duplicate(local_name, &uri)?;
        self.0.borrow_mut().local_name = local_name.to_owned();
        Ok(())
    }

    /// Move this attribute to the namespace `uri` with `prefix`.
    ///
    /// # Errors
    /// - `NamespaceConflict` if the binding is illegal for attributes, or if the owner
    ///   element binds `prefix` to another URI.
    /// - `DuplicateAttribute` if the owner element already has an attribute
    ///   with the new expanded name.
    pub fn set_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if !prefix.is_empty() {
            check_ncname(prefix)?;
        }
        let local_name = self.local_name();
        check_attribute_name(prefix, &local_name)?;
        check_attribute_namespace(prefix, uri)?;
        if let Some(owner) = self.owner_element() {
            if !prefix.is_empty() {
                owner.check_binding(prefix, uri, Exclude::Attribute(self))?;
            }
        }
        self.check_duplicate(&local_name, uri)?;

        let mut attr = self.0.borrow_mut();
        attr.prefix = prefix.to_owned();
        attr.namespace_uri = uri.to_owned();
        Ok(())
    }

    fn check_duplicate(&self, local_name: &str, uri: &str) -> Result<(), XmlError> {
        let Some(owner) = self.owner_element() else {
            return Ok(());
        };
        match owner.attribute(local_name, uri) {
            Some(other) if !other.is_same_attribute(self) => Err(XmlError::DuplicateAttribute {
                local_name: local_name.to_owned(),
                uri: uri.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    /// The element this attribute is attached to.
    pub fn owner_element(&self) -> Option<ElementRef> {
        self.parent_node().and_then(|parent| parent.as_element())
    }

    pub fn is_same_attribute(&self, other: &AttrRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn check_attribute_name(prefix: &str, local_name: &str) -> Result<(), XmlError> {
    check_ncname(local_name)?;
    if prefix == "xmlns" || (prefix.is_empty() && local_name == "xmlns") {
        let name = if prefix.is_empty() {
            local_name.to_owned()
        } else {
            format!("{prefix}:{local_name}")
        };
        return Err(XmlError::illegal_name(
            &name,
            "namespace declarations are not attributes",
        ));
    }
    Ok(())
}

fn check_attribute_namespace(prefix: &str, uri: &str) -> Result<(), XmlError> {
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
    if uri == XML_NS_NAMESPACE {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "attributes cannot be in the xmlns namespace",
        ));
    }
    if prefix.is_empty() && !uri.is_empty() {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "unprefixed attributes cannot be in a namespace",
        ));
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(XmlError::namespace_conflict(
            prefix,
            uri,
            "prefixed attributes must have a namespace URI",
        ));
    }
    check_namespace_uri(uri)
}

impl Node for AttrRef {
    fn node_type(&self) -> NodeType {
        NodeType::Attribute
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        self.0.borrow().value.clone()
    }

    fn copy(&self) -> Self {
        let attr = self.0.borrow();
        Self(Rc::new(RefCell::new(Attr {
            parent_node: None,
            local_name: attr.local_name.clone(),
            prefix: attr.prefix.clone(),
            namespace_uri: attr.namespace_uri.clone(),
            value: attr.value.clone(),
            attr_type: attr.attr_type,
        })))
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Attribute(other) if self.is_same_attribute(other))
    }

    /// Remove this attribute from its owner element.
    fn detach(&mut self) -> Result<(), XmlError> {
        match self.owner_element() {
            Some(mut owner) => owner.remove_attribute(self).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl_leaf_connection!((AttrRef, Attribute));

impl PartialEq for AttrRef {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_attribute(other)
    }
}

impl Eq for AttrRef {}

impl Debug for AttrRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attr = self.0.borrow();
        f.debug_struct("Attr")
            .field("local_name", &attr.local_name)
            .field("prefix", &attr.prefix)
            .field("namespace_uri", &attr.namespace_uri)
            .field("value", &attr.value)
            .field("type", &attr.attr_type)
            .finish()
    }
}
