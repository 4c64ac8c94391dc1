use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    error::XmlError,
    verifier::{check_pi_data, check_pi_target},
};

use super::{
    NodeType,
    node::{Node, NodeRef, NodeWeakRef},
};

pub struct ProcessingInstruction {
    parent_node: Option<NodeWeakRef>,
    target: String,
    data: String,
}

/// Wrapper of `Rc<RefCell<ProcessingInstruction>>`.
#[derive(Clone)]
pub struct ProcessingInstructionRef(Rc<RefCell<ProcessingInstruction>>);

impl ProcessingInstructionRef {
    /// # Errors
    /// - `IllegalTarget` if `target` is not an NCName or is `xml` in any case.
    /// - `IllegalData` if `data` contains `?>` or starts with white space.
    pub fn new(target: &str, data: &str) -> Result<Self, XmlError> {
        check_pi_target(target)?;
        check_pi_data(data)?;
        Ok(Self(Rc::new(RefCell::new(ProcessingInstruction {
            parent_node: None,
            target: target.to_owned(),
            data: data.to_owned(),
        }))))
    }

    pub fn target(&self) -> String {
        self.0.borrow().target.clone()
    }

    pub fn set_target(&mut self, target: &str) -> Result<(), XmlError> {
        check_pi_target(target)?;
        self.0.borrow_mut().target = target.to_owned();
        Ok(())
    }

    pub fn set_value(&mut self, data: &str) -> Result<(), XmlError> {
        check_pi_data(data)?;
        self.0.borrow_mut().data = data.to_owned();
        Ok(())
    }
}

impl Node for ProcessingInstructionRef {
    fn node_type(&self) -> NodeType {
        NodeType::ProcessingInstruction
    }

    fn parent_node(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent_node
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    /// The data of this processing instruction, without the target.
    fn value(&self) -> String {
        self.0.borrow().data.clone()
    }

    fn copy(&self) -> Self {
        let pi = self.0.borrow();
        Self(Rc::new(RefCell::new(ProcessingInstruction {
            parent_node: None,
            target: pi.target.clone(),
            data: pi.data.clone(),
        })))
    }

    fn is_same_node(&self, other: &NodeRef) -> bool {
        matches!(other, NodeRef::ProcessingInstruction(other) if Rc::ptr_eq(&self.0, &other.0))
    }
}

impl Debug for ProcessingInstructionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pi = self.0.borrow();
        f.debug_struct("ProcessingInstruction")
            .field("target", &pi.target)
            .field("data", &pi.data)
            .finish()
    }
}

impl_leaf_connection!((ProcessingInstructionRef, ProcessingInstruction));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target() {
        assert!(matches!(
            ProcessingInstructionRef::new("xml", ""),
            Err(XmlError::IllegalTarget { .. })
        ));
        assert!(matches!(
            ProcessingInstructionRef::new("XmL", ""),
            Err(XmlError::IllegalTarget { .. })
        ));
        assert!(matches!(
            ProcessingInstructionRef::new("a:b", ""),
            Err(XmlError::IllegalTarget { .. })
        ));
        let mut pi = ProcessingInstructionRef::new("xml-stylesheet", "href=\"a.css\"").unwrap();
        assert!(pi.set_target("").is_err());
        assert_eq!(pi.target(), "xml-stylesheet");
        pi.set_target("php").unwrap();
        assert_eq!(pi.target(), "php");
    }

    #[test]
    fn test_data() {
        assert!(matches!(
            ProcessingInstructionRef::new("t", "a ?> b"),
            Err(XmlError::IllegalData { .. })
        ));
        assert!(ProcessingInstructionRef::new("t", " leading").is_err());
        let mut pi = ProcessingInstructionRef::new("t", "").unwrap();
        pi.set_value("a ? > b").unwrap();
        assert_eq!(pi.value(), "a ? > b");
        assert!(pi.set_value("\tx").is_err());
        assert_eq!(pi.value(), "a ? > b");
    }
}
