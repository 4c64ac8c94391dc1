use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    error::XmlError,
    verifier::{check_character_data, check_public_id, check_system_literal, check_xml_name},
};

use super::{
    NodeType,
    node::{Node, NodeRef, NodeWeakRef},
};

pub struct DocumentType {
    parent_node: Option<NodeWeakRef>,
    root_element_name: String,
    public_id: Option<String>,
    system_id: Option<String>,
    /// Kept as written, without the surrounding brackets.
    internal_subset: String,
}

/// Wrapper of `Rc<RefCell<DocumentType>>`.
///
/// The internal subset is opaque markup. It is neither parsed nor validated
/// beyond being legal character data.
#[derive(Clone)]
pub struct DocumentTypeRef(Rc<RefCell<DocumentType>>);

impl DocumentTypeRef {
    /// Declare `root_element_name` as the name of the root element, without external subset.
    pub fn new(root_element_name: &str) -> Result<Self, XmlError> {
        check_xml_name(root_element_name)?;
        Ok(Self(Rc::new(RefCell::new(DocumentType {
            parent_node: None,
            root_element_name: root_element_name.to_owned(),
            public_id: None,
            system_id: None,
            internal_subset: String::new(),
        }))))
    }

    pub fn with_system_id(root_element_name: &str, system_id: &str) -> Result<Self, XmlError> {
        let mut new = Self::new(root_element_name)?;
        new.set_system_id(Some(system_id))?;
        Ok(new)
    }

    pub fn with_public_id(
        root_element_name: &str,
        public_id: &str,
        system_id: &str,
    ) -> Result<Self, XmlError> {
        let mut new = Self::with_system_id(root_element_name, system_id)?;
        new.set_public_id(Some(public_id))?;
        Ok(new)
    }

    pub fn root_element_name(&self) -> String {
        self.0.borrow().root_element_name.clone()
    }

    pub fn set_root_element_name(&mut self, name: &str) -> Result<(), XmlError> {
        check_xml_name(name)?;
        self.0.borrow_mut().root_element_name = name.to_owned();
        Ok(())
    }

    pub fn public_id(&self) -> Option<String> {
        self.0.borrow().public_id.clone()
    }

    /// # Errors
    /// - `Wellformedness` if a public identifier is set without a system identifier.
    /// - `IllegalData` if `public_id` contains characters other than `PubidChar`.
    pub fn set_public_id(&mut self, public_id: Option<&str>) -> Result<(), XmlError> {
        if let Some(public_id) = public_id {
            if self.0.borrow().system_id.is_none() {
                return Err(XmlError::Wellformedness {
                    reason: "a public identifier requires a system identifier".into(),
                });
            }
            check_public_id(public_id)?;
        }
        self.0.borrow_mut().public_id = public_id.map(str::to_owned);
        Ok(())
    }

    pub fn system_id(&self) -> Option<String> {
        self.0.borrow().system_id.clone()
    }

    /// # Errors
    /// - `Wellformedness` if the system identifier is removed while a public
    ///   identifier is set.
    /// - `MalformedUri` if `system_id` has a fragment identifier.
    /// - `IllegalData` if `system_id` contains both kinds of quotes.
    pub fn set_system_id(&mut self, system_id: Option<&str>) -> Result<(), XmlError> {
        match system_id {
            Some(system_id) => check_system_literal(system_id)?,
            None if self.0.borrow().public_id.is_some() => {
                return Err(XmlError::Wellformedness {
                    reason: "a public identifier requires a system identifier".into(),
                });
            }
            None => {}
        }
        self.0.borrow_mut().system_id = system_id.map(str::to_owned);
        Ok(())
    }

    pub fn internal_subset(&self) -> String {
        self.0.borrow().internal_subset.clone()
    }

    pub fn set_internal_subset(&mut self, subset: &str) -> Result<(), XmlError> {
        check_character_data(subset)?;
        self.0.borrow_mut().internal_subset = subset.to_owned();
        Ok(())
    }
}

impl Node for DocumentTypeRef {
    fn node_type(&self) -> NodeType {
        NodeType::DocumentType
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    /// Document type declarations have no XPath string value.
    fn value(&self) -> String {
        String::new()
    }

    fn copy(&self) -> Self {
        let doctype = self.0.borrow();
        Self(Rc::new(RefCell::new(DocumentType {
            parent_node: None,
            root_element_name: doctype.root_element_name.clone(),
            public_id: doctype.public_id.clone(),
            system_id: doctype.system_id.clone(),
            internal_subset: doctype.internal_subset.clone(),
        })))
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::DocumentType(other) if Rc::ptr_eq(&self.0, &other.0))
    }
}

impl Debug for DocumentTypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let doctype = self.0.borrow();
        f.debug_struct("DocumentType")
            .field("root_element_name", &doctype.root_element_name)
            .field("public_id", &doctype.public_id)
            .field("system_id", &doctype.system_id)
            .finish()
    }
}

impl_leaf_connection!((DocumentTypeRef, DocumentType));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        let mut doctype = DocumentTypeRef::new("html").unwrap();
        assert!(matches!(
            doctype.set_public_id(Some("-//W3C//DTD XHTML 1.0 Strict//EN")),
            Err(XmlError::Wellformedness { .. })
        ));
        doctype
            .set_system_id(Some("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"))
            .unwrap();
        doctype
            .set_public_id(Some("-//W3C//DTD XHTML 1.0 Strict//EN"))
            .unwrap();
        assert!(matches!(
            doctype.set_system_id(None),
            Err(XmlError::Wellformedness { .. })
        ));
        assert!(matches!(
            doctype.set_system_id(Some("doc.dtd#frag")),
            Err(XmlError::MalformedUri { .. })
        ));
        assert!(doctype.set_system_id(Some("a'b\"c")).is_err());
        assert!(doctype.set_public_id(Some("{}")).is_err());
        assert_eq!(
            doctype.public_id().as_deref(),
            Some("-//W3C//DTD XHTML 1.0 Strict//EN")
        );
    }

    #[test]
    fn test_root_name() {
        assert!(DocumentTypeRef::new("svg:svg").is_ok());
        assert!(DocumentTypeRef::new("1svg").is_err());
        let mut doctype = DocumentTypeRef::with_system_id("a", "a.dtd").unwrap();
        doctype.set_internal_subset("<!ELEMENT a EMPTY>").unwrap();
        let copy = doctype.copy();
        assert_eq!(copy.internal_subset(), "<!ELEMENT a EMPTY>");
        assert_eq!(copy.system_id().as_deref(), Some("a.dtd"));
    }
}
