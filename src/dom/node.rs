use std::fmt::Debug;

use crate::{error::XmlError, serializer::node_to_xml, uri::resolve};

use super::{
    NodeType, XML_XML_NAMESPACE,
    attr::AttrRef,
    character_data::{CommentRef, TextRef},
    document::{DocumentRef, DocumentWeakRef},
    document_type::DocumentTypeRef,
    element::{ElementRef, ElementWeakRef},
    namespace::NamespaceRef,
    parent_node::ParentNode,
    pi::ProcessingInstructionRef,
};

/// Operations shared by every kind of node.
///
/// Equality of nodes is identity: two distinct nodes are never the same node,
/// even if their content is identical.
#[allow(private_bounds)]
pub trait Node: NodeConnection {
    fn node_type(&self) -> NodeType;

    /// The node that owns this node, if any.
    ///
    /// For attributes and namespace nodes, this is the element they are attached to.
    fn parent_node(&self) -> Option<NodeRef>;

    /// The XPath string-value of this node.
    fn value(&self) -> String;

    /// Deep copy of this node. The copy has no parent.
    fn copy(&self) -> Self;

    fn is_same_node(&self, other: &NodeRef) -> bool;

    fn child_count(&self) -> usize {
        0
    }

    fn child(&self, _index: usize) -> Option<NodeRef> {
        None
    }

    /// The absolute base URI of this node if it can be computed,
    /// otherwise the best relative one, or an empty string if nothing is known.
    fn base_uri(&self) -> String {
        self.parent_node()
            .map(|parent| parent.base_uri())
            .unwrap_or_default()
    }

    /// Serialize this node as XML in a string.
    fn to_xml(&self) -> String {
        node_to_xml(&self.clone().into())
    }

    /// The topmost ancestor of this node, or this node itself.
    fn root(&self) -> NodeRef {
        let mut current: NodeRef = self.clone().into();
        while let Some(parent) = current.parent_node() {
            current = parent;
        }
        current
    }

    /// The document this node belongs to, if any.
    fn document(&self) -> Option<DocumentRef> {
        self.root().as_document()
    }

    /// Remove this node from its parent.
    ///
    /// If this node has no parent, do nothing.
    fn detach(&mut self) -> Result<(), XmlError> {
        let this: NodeRef = self.clone().into();
        match self.parent_node() {
            Some(NodeRef::Element(mut parent)) => parent.remove_child(&this).map(|_| ()),
            Some(NodeRef::Document(mut parent)) => parent.remove_child(&this).map(|_| ()),
            _ => Ok(()),
        }
    }
}

/// Maintenance of the parent pointer. Only the tree machinery may use this.
pub(crate) trait NodeConnection: Clone + Into<NodeRef> {
    /// Set a new parent and return the old one.
    fn set_parent_node(&mut self, new_parent: Option<NodeWeakRef>) -> Option<NodeWeakRef>;
}

/// Handle to any node of a tree.
#[derive(Clone)]
pub enum NodeRef {
    Element(ElementRef),
    Attribute(AttrRef),
    Text(TextRef),
    ProcessingInstruction(ProcessingInstructionRef),
    Comment(CommentRef),
    Document(DocumentRef),
    DocumentType(DocumentTypeRef),
    Namespace(NamespaceRef),
}

macro_rules! impl_node_trait_to_noderef {
    (
        $(
            fn $( ($mut:tt) )? $fn:ident($( $arg_name:ident : $arg_type:ty ),*) -> $ret:ty
        ),*
    ) => {
        impl Node for NodeRef {
            $(
                fn $fn(& $( $mut )? self, $( $arg_name: $arg_type),* ) -> $ret {
                    match self {
                        NodeRef::Element(node) => {
                            <ElementRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                        NodeRef::Attribute(node) => <AttrRef as Node>::$fn(node, $( $arg_name ),* ),
                        NodeRef::Text(node) => <TextRef as Node>::$fn(node, $( $arg_name ),* ),
                        NodeRef::ProcessingInstruction(node) => {
                            <ProcessingInstructionRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                        NodeRef::Comment(node) => {
                            <CommentRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                        NodeRef::Document(node) => {
                            <DocumentRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                        NodeRef::DocumentType(node) => {
                            <DocumentTypeRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                        NodeRef::Namespace(node) => {
                            <NamespaceRef as Node>::$fn(node, $( $arg_name ),* )
                        }
                    }
                }
            )*

            fn copy(&self) -> Self {
                match self {
                    NodeRef::Element(node) => NodeRef::Element(node.copy()),
                    NodeRef::Attribute(node) => NodeRef::Attribute(node.copy()),
                    NodeRef::Text(node) => NodeRef::Text(node.copy()),
                    NodeRef::ProcessingInstruction(node) => {
                        NodeRef::ProcessingInstruction(node.copy())
                    }
                    NodeRef::Comment(node) => NodeRef::Comment(node.copy()),
                    NodeRef::Document(node) => NodeRef::Document(node.copy()),
                    NodeRef::DocumentType(node) => NodeRef::DocumentType(node.copy()),
                    NodeRef::Namespace(node) => NodeRef::Namespace(node.copy()),
                }
            }
        }
    };
}

impl_node_trait_to_noderef! {
    fn node_type() -> NodeType,
    fn parent_node() -> Option<NodeRef>,
    fn value() -> String,
    fn is_same_node(other: &NodeRef) -> bool,
    fn child_count() -> usize,
    fn child(index: usize) -> Option<NodeRef>,
    fn base_uri() -> String,
    fn to_xml() -> String,
    fn root() -> NodeRef,
    fn document() -> Option<DocumentRef>,
    fn(mut) detach() -> Result<(), XmlError>
}

impl NodeConnection for NodeRef {
    fn set_parent_node(&mut self, new_parent: Option<NodeWeakRef>) -> Option<NodeWeakRef> {
        match self {
            NodeRef::Element(node) => node.set_parent_node(new_parent),
            NodeRef::Attribute(node) => node.set_parent_node(new_parent),
            NodeRef::Text(node) => node.set_parent_node(new_parent),
            NodeRef::ProcessingInstruction(node) => node.set_parent_node(new_parent),
            NodeRef::Comment(node) => node.set_parent_node(new_parent),
            NodeRef::Document(node) => node.set_parent_node(new_parent),
            NodeRef::DocumentType(node) => node.set_parent_node(new_parent),
            NodeRef::Namespace(node) => node.set_parent_node(new_parent),
        }
    }
}

macro_rules! impl_node_conversion {
    ( $( ( $fn:ident, $var:ident, $t:ty ) ),* ) => {
        impl NodeRef {
            $(
                pub fn $fn (&self) -> Option<$t> {
                    match self {
                        NodeRef:: $var (node) => Some(node.clone()),
                        _ => None
                    }
                }
            )*
        }
    };
}

impl_node_conversion! {
    ( as_element, Element, ElementRef ),
    ( as_attribute, Attribute, AttrRef ),
    ( as_text, Text, TextRef ),
    ( as_processing_instruction, ProcessingInstruction, ProcessingInstructionRef ),
    ( as_comment, Comment, CommentRef ),
    ( as_document, Document, DocumentRef ),
    ( as_document_type, DocumentType, DocumentTypeRef ),
    ( as_namespace, Namespace, NamespaceRef )
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_node(other)
    }
}

impl Eq for NodeRef {}

impl Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRef::Element(node) => Debug::fmt(node, f),
            NodeRef::Attribute(node) => Debug::fmt(node, f),
            NodeRef::Text(node) => Debug::fmt(node, f),
            NodeRef::ProcessingInstruction(node) => Debug::fmt(node, f),
            NodeRef::Comment(node) => Debug::fmt(node, f),
            NodeRef::Document(node) => Debug::fmt(node, f),
            NodeRef::DocumentType(node) => Debug::fmt(node, f),
            NodeRef::Namespace(node) => Debug::fmt(node, f),
        }
    }
}

/// Weak pointer to a node that can own children.
#[derive(Clone)]
pub enum NodeWeakRef {
    Element(ElementWeakRef),
    Document(DocumentWeakRef),
}

impl NodeWeakRef {
    /// Generate [`NodeRef`] from `self`.
    /// Success conditions are the same as for [`std::rc::Weak::upgrade`].
    pub fn upgrade(&self) -> Option<NodeRef> {
        match self {
            NodeWeakRef::Element(node) => node.upgrade().map(NodeRef::Element),
            NodeWeakRef::Document(node) => node.upgrade().map(NodeRef::Document),
        }
    }
}

/// Walk from `start` to the root collecting `xml:base` attributes and explicit base URIs,
/// then resolve them from the outermost to the innermost.
///
/// The walk stops at the first absolute URI, because nothing above it can change the result.
pub(super) fn compute_base_uri(start: NodeRef) -> String {
    // innermost first
    let mut bases = vec![];
    let mut current = Some(start);
    'walk: while let Some(node) = current {
        match &node {
            NodeRef::Element(elem) => {
                let candidates = [
                    elem.attribute_value("base", XML_XML_NAMESPACE),
                    elem.actual_base_uri(),
                ];
                for base in candidates.into_iter().flatten() {
                    let absolute = crate::uri::is_absolute(&base);
                    bases.push(base);
                    if absolute {
                        break 'walk;
                    }
                }
            }
            NodeRef::Document(doc) => {
                if let Some(base) = doc.actual_base_uri() {
                    bases.push(base);
                }
                break;
            }
            _ => {}
        }
        current = node.parent_node();
    }

    let mut bases = bases.into_iter().rev();
    let Some(mut base) = bases.next() else {
        return String::new();
    };
    for reference in bases {
        base = resolve(&base, &reference);
    }
    base
}
