//! In-memory XML tree that stays well-formed under every mutation.
//!
//! Every node is a reference-counted handle (`XxxRef`) around a `RefCell`.
//! Parents own their children; children only keep a weak pointer back to
//! their parent, so detaching a subtree never leaves a dangling owner.
//!
//! All checks run before anything is modified. A rejected operation leaves
//! the tree exactly as it was.
//!
//! # Note
//! - The tree is not thread-safe. Handles are `!Send` and `!Sync`.
//! - Namespace prefixes are checked against the element's bindings at the moment they are
//!   set. Moving an element to another place in the tree does not re-check them.

use std::fmt::Display;

/// Parent pointer maintenance and the conversion into [`NodeRef`] for node kinds
/// that wrap a `Rc<RefCell<_>>` with a `parent_node` field.
macro_rules! impl_leaf_connection {
    ( $( ( $t:ty, $var:ident ) ),* ) => {
        $(
            impl $crate::dom::node::NodeConnection for $t {
                fn set_parent_node(
                    &mut self,
                    new_parent: Option<$crate::dom::NodeWeakRef>,
                ) -> Option<$crate::dom::NodeWeakRef> {
                    std::mem::replace(&mut self.0.borrow_mut().parent_node, new_parent)
                }
            }

            impl From<$t> for $crate::dom::NodeRef {
                fn from(value: $t) -> Self {
                    $crate::dom::NodeRef::$var(value)
                }
            }
        )*
    };
}

pub mod attr;
pub mod character_data;
pub mod document;
pub mod document_type;
pub mod element;
pub mod namespace;
pub mod node;
pub mod parent_node;
pub mod pi;

pub use attr::{AttrRef, AttributeType};
pub use character_data::{CommentRef, TextRef};
pub use document::DocumentRef;
pub use document_type::DocumentTypeRef;
pub use element::ElementRef;
pub use namespace::NamespaceRef;
pub use node::{Node, NodeRef, NodeWeakRef};
pub use parent_node::{MutationCheck, ParentNode};
pub use pi::ProcessingInstructionRef;

/// This is the namespace for the special xml: prefix predefined in the
/// XML Namespace specification.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XML_NS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// The kinds of node a tree can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element,
    Attribute,
    Text,
    ProcessingInstruction,
    Comment,
    Document,
    DocumentType,
    Namespace,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Text => "text",
            Self::ProcessingInstruction => "processing instruction",
            Self::Comment => "comment",
            Self::Document => "document",
            Self::DocumentType => "document type declaration",
            Self::Namespace => "namespace",
        };
        write!(f, "{name}")
    }
}

/// Return `true` if `parent` and `child` are allowed to be parent and child.
/// Otherwise, return `false`.
///
/// | NodeType | Children                                                                          |
/// | :------- | :-------------------------------------------------------------------------------- |
/// | Document | Element (exactly one), ProcessingInstruction, Comment, DocumentType (at most one) |
/// | Element  | Element, Text, Comment, ProcessingInstruction                                     |
/// | others   | no children                                                                       |
///
/// Attributes and namespaces are attached to elements, but they are not children.
fn check_vertical_hierarchy(parent: NodeType, child: NodeType) -> bool {
    use NodeType::*;
    match parent {
        Element => matches!(child, Element | Text | Comment | ProcessingInstruction),
        Document => matches!(
            child,
            Element | ProcessingInstruction | Comment | DocumentType
        ),
        _ => false,
    }
}
