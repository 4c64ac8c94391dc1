use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    error::XmlError,
    verifier::{check_comment, check_pcdata},
};

use super::{
    NodeType,
    node::{Node, NodeRef, NodeWeakRef},
};

pub struct Text {
    parent_node: Option<NodeWeakRef>,
    data: String,
    /// Written as a CDATA section when the serializer can. It has no other effect.
    cdata: bool,
}

/// Wrapper of `Rc<RefCell<Text>>`.
///
/// Text may be empty, and adjacent text nodes are never merged by the tree.
#[derive(Clone)]
pub struct TextRef(Rc<RefCell<Text>>);

impl TextRef {
    /// # Errors
    /// `IllegalData` if `data` contains characters XML does not allow.
    pub fn new(data: &str) -> Result<Self, XmlError> {
        Self::build(data, false)
    }

    /// Create a text node that prefers to be written as a CDATA section.
    ///
    /// It follows the same rules as any other text; `]]>` is allowed.
    pub fn cdata(data: &str) -> Result<Self, XmlError> {
        Self::build(data, true)
    }

    fn build(data: &str, cdata: bool) -> Result<Self, XmlError> {
        check_pcdata(data)?;
        Ok(Self(Rc::new(RefCell::new(Text {
            parent_node: None,
            data: data.to_owned(),
            cdata,
        }))))
    }

    pub fn set_value(&mut self, data: &str) -> Result<(), XmlError> {
        check_pcdata(data)?;
        self.0.borrow_mut().data = data.to_owned();
        Ok(())
    }

    pub fn is_cdata(&self) -> bool {
        self.0.borrow().cdata
    }

    /// `true` if this text is empty or contains only XML white space.
    pub fn is_whitespace(&self) -> bool {
        self.0
            .borrow()
            .data
            .chars()
            .all(crate::verifier::is_xml_space)
    }
}

impl Node for TextRef {
    fn node_type(&self) -> NodeType {
        NodeType::Text
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        self.0.borrow().data.clone()
    }

    fn copy(&self) -> Self {
        let text = self.0.borrow();
        Self(Rc::new(RefCell::new(Text {
            parent_node: None,
            data: text.data.clone(),
            cdata: text.cdata,
        })))
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Text(other) if Rc::ptr_eq(&self.0, &other.0))
    }
}

impl Debug for TextRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = self.0.borrow();
        f.debug_struct("Text")
            .field("data", &text.data)
            .field("cdata", &text.cdata)
            .finish()
    }
}

pub struct Comment {
    parent_node: Option<NodeWeakRef>,
    data: String,
}

/// Wrapper of `Rc<RefCell<Comment>>`.
#[derive(Clone)]
pub struct CommentRef(Rc<RefCell<Comment>>);

impl CommentRef {
    /// # Errors
    /// `IllegalData` if `data` contains `--`, starts or ends with `-`,
    /// or contains characters XML does not allow.
    pub fn new(data: &str) -> Result<Self, XmlError> {
        check_comment(data)?;
        Ok(Self(Rc::new(RefCell::new(Comment {
            parent_node: None,
            data: data.to_owned(),
        }))))
    }

    /// Replace the content. If `data` is rejected, the content is unchanged.
    pub fn set_value(&mut self, data: &str) -> Result<(), XmlError> {
        check_comment(data)?;
        self.0.borrow_mut().data = data.to_owned();
        Ok(())
    }
}

impl Node for CommentRef {
    fn node_type(&self) -> NodeType {
        NodeType::Comment
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        self.0.borrow().data.clone()
    }

    fn copy(&self) -> Self {
        Self(Rc::new(RefCell::new(Comment {
            parent_node: None,
            data: self.0.borrow().data.clone(),
        })))
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::Comment(other) if Rc::ptr_eq(&self.0, &other.0))
    }
}

impl Debug for CommentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comment")
            .field("data", &self.0.borrow().data)
            .finish()
    }
}

impl_leaf_connection!((TextRef, Text), (CommentRef, Comment));

#[cfg(test)]
mod tests {
    use crate::dom::{ElementRef, ParentNode};

    use super::*;

    #[test]
    fn test_comment_data() {
        assert!(matches!(
            CommentRef::new("a--b"),
            Err(XmlError::IllegalData { .. })
        ));
        assert!(CommentRef::new("trailing-").is_err());
        assert!(CommentRef::new("\u{0}").is_err());

        let mut comment = CommentRef::new("ok").unwrap();
        assert!(matches!(
            comment.set_value("-bad"),
            Err(XmlError::IllegalData { .. })
        ));
        assert_eq!(comment.value(), "ok");
        comment.set_value(" a - b ").unwrap();
        assert_eq!(comment.value(), " a - b ");
    }

    #[test]
    fn test_text_data() {
        assert!(TextRef::new("\u{C}").is_err());
        assert!(TextRef::new("").unwrap().is_whitespace());

        let mut text = TextRef::cdata("a ]]> b").unwrap();
        assert!(text.is_cdata());
        assert!(text.set_value("\u{FFFF}").is_err());
        assert_eq!(text.value(), "a ]]> b");

        let copy = text.copy();
        assert!(copy.is_cdata());
        assert!(!copy.is_same_node(&text.into()));
    }

    #[test]
    fn test_detach() {
        let mut elem = ElementRef::new("e").unwrap();
        let mut text = TextRef::new("t").unwrap();
        elem.append_child(text.clone()).unwrap();
        assert!(text.parent_node().is_some());
        text.detach().unwrap();
        assert!(text.parent_node().is_none());
        assert_eq!(elem.child_count(), 0);
        // detaching a parentless node does nothing
        text.detach().unwrap();
    }
}
