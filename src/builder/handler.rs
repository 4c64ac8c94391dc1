use std::rc::Rc;

use crate::{
    dom::{
        AttrRef, CommentRef, DocumentRef, DocumentTypeRef, ElementRef, MutationCheck, NamespaceRef,
        Node, NodeRef, ProcessingInstructionRef, TextRef, parent_node::ParentConnection,
    },
    error::XmlError,
    verifier::is_xml_space,
};

/// An attribute of a start tag, with its namespace already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttribute {
    pub qname: String,
    pub uri: String,
    pub value: String,
}

/// Receiver of parse events, in document order.
///
/// Events are only delivered for well-formed input, but names and character data
/// are not checked further than the parser checks them.
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    /// `internal_subset` is empty if the declaration has none.
    fn start_dtd(
        &mut self,
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: &str,
    ) -> Result<(), XmlError>;

    /// `declarations` holds the `xmlns` attributes as `(prefix, uri)` pairs.
    /// They are not repeated in `attributes`.
    fn start_element(
        &mut self,
        qname: &str,
        uri: &str,
        attributes: &[ParsedAttribute],
        declarations: &[(String, String)],
    ) -> Result<(), XmlError>;

    fn end_element(&mut self) -> Result<(), XmlError>;

    /// May be called several times for one run of text.
    fn characters(&mut self, text: &str) -> Result<(), XmlError>;

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError>;

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError>;

    fn end_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }
}

/// [`ContentHandler`] that assembles a [`DocumentRef`].
///
/// Nodes are appended without the checks of [`ParentNode`](crate::dom::ParentNode),
/// because the events arrive in an order that keeps the document well-formed.
/// Names and data are still checked by the node constructors.
///
/// The document and every element share the injected [`MutationCheck`], which
/// applies to mutations after the build.
pub struct TreeBuilder {
    document: DocumentRef,
    check: Option<Rc<dyn MutationCheck>>,
    open: Vec<ElementRef>,
    // adjacent text is merged into one node
    pending_text: Option<(String, bool)>,
    in_cdata: bool,
}

impl TreeBuilder {
    pub fn new(system_id: Option<&str>, check: Option<Rc<dyn MutationCheck>>) -> Self {
        let mut document = DocumentRef::empty(check.clone());
        document.set_actual_base_uri(system_id.map(str::to_owned));
        Self {
            document,
            check,
            open: vec![],
            pending_text: None,
            in_cdata: false,
        }
    }

    pub fn document(&self) -> DocumentRef {
        self.document.clone()
    }

    pub fn into_document(self) -> DocumentRef {
        self.document
    }

    fn append(&mut self, node: NodeRef) {
        match self.open.last_mut() {
            Some(parent) => parent.fast_append(node),
            None => self.document.fast_append(node),
        }
    }

    fn flush_text(&mut self) -> Result<(), XmlError> {
        let Some((text, cdata)) = self.pending_text.take() else {
            return Ok(());
        };
        let text = if cdata {
            TextRef::cdata(&text)?
        } else {
            TextRef::new(&text)?
        };
        self.append(text.into());
        Ok(())
    }
}

impl ContentHandler for TreeBuilder {
    fn start_document(&mut self) -> Result<(), XmlError> {
        log::trace!(target: "exom::builder", "start document");
        Ok(())
    }

    fn start_dtd(
        &mut self,
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: &str,
    ) -> Result<(), XmlError> {
        if self.document.root_element().is_some() {
            return Err(XmlError::illegal_add(
                "the document type declaration must precede the root element",
            ));
        }
        let mut doctype = DocumentTypeRef::new(root_name)?;
        doctype.set_system_id(system_id)?;
        doctype.set_public_id(public_id)?;
        doctype.set_internal_subset(internal_subset)?;
        self.append(doctype.into());
        Ok(())
    }

    fn start_element(
        &mut self,
        qname: &str,
        uri: &str,
        attributes: &[ParsedAttribute],
        declarations: &[(String, String)],
    ) -> Result<(), XmlError> {
        self.flush_text()?;
        if self.open.is_empty() && self.document.root_element().is_some() {
            return Err(XmlError::illegal_add("a document has only one root element"));
        }
        let mut elem = match &self.check {
            Some(check) => ElementRef::with_check(qname, uri, check.clone())?,
            None => ElementRef::with_namespace(qname, uri)?,
        };
        for attribute in attributes {
            let attr = AttrRef::with_namespace(&attribute.qname, &attribute.uri, &attribute.value)?;
            let local_name = attr.local_name();
            if elem.attribute(&local_name, &attribute.uri).is_some() {
                return Err(XmlError::DuplicateAttribute {
                    local_name,
                    uri: attribute.uri.clone(),
                });
            }
            elem.fast_add_attribute(attr);
        }
        let elem_prefix = elem.prefix();
        for (prefix, uri) in declarations {
            NamespaceRef::new(prefix, uri, None)?;
            // bindings implied by the names need no declaration of their own
            let implied = *prefix == elem_prefix
                || prefix == "xml"
                || elem.attributes().iter().any(|attr| attr.prefix() == *prefix);
            if !implied {
                elem.fast_add_namespace_declaration(prefix, uri);
            }
        }
        self.append(elem.clone().into());
        self.open.push(elem);
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), XmlError> {
        self.flush_text()?;
        self.open.pop();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        if self.open.is_empty() {
            if text.chars().all(is_xml_space) {
                return Ok(());
            }
            return Err(XmlError::illegal_add(
                "text is not allowed outside of the root element",
            ));
        }
        match &mut self.pending_text {
            Some((pending, cdata)) => {
                pending.push_str(text);
                *cdata &= self.in_cdata;
            }
            None => self.pending_text = Some((text.to_owned(), self.in_cdata)),
        }
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        self.in_cdata = true;
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        self.in_cdata = false;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.flush_text()?;
        let comment = CommentRef::new(text)?;
        self.append(comment.into());
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.flush_text()?;
        let pi = ProcessingInstructionRef::new(target, data)?;
        self.append(pi.into());
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        self.flush_text()?;
        if let Some(open) = self.open.last() {
            return Err(XmlError::Wellformedness {
                reason: format!("the element '{}' is not closed", open.qualified_name()).into(),
            });
        }
        if self.document.root_element().is_none() {
            return Err(XmlError::Wellformedness {
                reason: "the document has no root element".into(),
            });
        }
        log::trace!(
            target: "exom::builder",
            "end document, {} top-level node(s)",
            self.document.child_count()
        );
        Ok(())
    }
}
