use std::{
    cell::{Ref, RefMut},
    rc::Rc,
};

use crate::{error::XmlError, verifier::check_uri_reference};

use super::{
    NodeType, check_vertical_hierarchy,
    attr::AttrRef,
    element::ElementRef,
    node::{Node, NodeConnection, NodeRef, NodeWeakRef},
};

/// Extra rules for a tree, injected when its parents are constructed.
///
/// Every hook runs after the built-in well-formedness checks passed and before
/// anything is modified. Returning an error cancels the operation.
/// All hooks allow everything by default.
pub trait MutationCheck {
    /// Called before `child` is inserted into `parent` at `position`.
    fn check_insert_child(
        &self,
        _parent: &NodeRef,
        _child: &NodeRef,
        _position: usize,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    /// Called before the child at `position` is removed from `parent`,
    /// including removal by `detach` and by replacement.
    fn check_remove_child(
        &self,
        _parent: &NodeRef,
        _child: &NodeRef,
        _position: usize,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn check_add_attribute(
        &self,
        _element: &ElementRef,
        _attribute: &AttrRef,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn check_remove_attribute(
        &self,
        _element: &ElementRef,
        _attribute: &AttrRef,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn check_add_namespace_declaration(
        &self,
        _element: &ElementRef,
        _prefix: &str,
        _uri: &str,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn check_remove_namespace_declaration(
        &self,
        _element: &ElementRef,
        _prefix: &str,
    ) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Nodes that own an ordered list of children: elements and documents.
///
/// [`ParentNode::insert_child`] is the only way a node enters a child list, and
/// [`ParentNode::remove_child_at`] the only way it leaves one.
/// The other methods are expressed with them, so every structural change
/// is checked exactly once.
#[allow(private_bounds)]
pub trait ParentNode: Node + ParentConnection {
    /// The base URI set explicitly on this node, if any.
    fn actual_base_uri(&self) -> Option<String>;

    /// Insert `child` at `position`, shifting the following children.
    ///
    /// # Errors
    /// - `IndexOutOfBounds` if `position > self.child_count()`.
    /// - `IllegalAdd` or `Cycle` if `child` cannot be placed here.
    /// - `MultipleParent` if `child` already has a parent.
    /// - whatever the injected [`MutationCheck`] rejects.
    fn insert_child(&mut self, child: impl Into<NodeRef>, position: usize) -> Result<(), XmlError> {
        let mut child = child.into();
        let len = self.child_count();
        if position > len {
            return Err(XmlError::IndexOutOfBounds {
                index: position,
                len,
            });
        }
        check_kind(self, &child)?;
        self.check_insertion(&child, position, None)?;
        if child.parent_node().is_some() {
            return Err(XmlError::MultipleParent);
        }
        if let Some(check) = self.mutation_check() {
            check.check_insert_child(&self.clone().into(), &child, position)?;
        }

        child.set_parent_node(Some(self.downgrade_parent()));
        self.children_mut().insert(position, child);
        Ok(())
    }

    fn append_child(&mut self, child: impl Into<NodeRef>) -> Result<(), XmlError> {
        let len = self.child_count();
        self.insert_child(child, len)
    }

    /// Remove the child at `position` and return it without a parent.
    fn remove_child_at(&mut self, position: usize) -> Result<NodeRef, XmlError> {
        let Some(child) = self.child(position) else {
            return Err(XmlError::IndexOutOfBounds {
                index: position,
                len: self.child_count(),
            });
        };
        self.check_removal(&child, None)?;
        if let Some(check) = self.mutation_check() {
            check.check_remove_child(&self.clone().into(), &child, position)?;
        }

        let mut child = self.children_mut().remove(position);
        child.set_parent_node(None);
        Ok(child)
    }

    /// Remove `child` and return it without a parent.
    ///
    /// # Errors
    /// `NoSuchChild` if `child` is not a child of this node.
    fn remove_child(&mut self, child: &NodeRef) -> Result<NodeRef, XmlError> {
        let position = self.index_of(child).ok_or(XmlError::NoSuchChild)?;
        self.remove_child_at(position)
    }

    /// Put `new_child` in the place of `old_child`.
    ///
    /// Both are checked before anything moves, so a rejected replacement
    /// leaves this node unchanged. Replacing a node with itself does nothing.
    fn replace_child(
        &mut self,
        old_child: &NodeRef,
        new_child: impl Into<NodeRef>,
    ) -> Result<(), XmlError> {
        let mut new_child = new_child.into();
        if old_child.is_same_node(&new_child) {
            return Ok(());
        }
        let position = self.index_of(old_child).ok_or(XmlError::NoSuchChild)?;
        check_kind(self, &new_child)?;
        self.check_insertion(&new_child, position, Some(old_child))?;
        if new_child.parent_node().is_some() {
            return Err(XmlError::MultipleParent);
        }
        self.check_removal(old_child, Some(&new_child))?;
        if let Some(check) = self.mutation_check() {
            let this: NodeRef = self.clone().into();
            check.check_remove_child(&this, old_child, position)?;
            check.check_insert_child(&this, &new_child, position)?;
        }

        new_child.set_parent_node(Some(self.downgrade_parent()));
        let mut old_child = std::mem::replace(&mut self.children_mut()[position], new_child);
        old_child.set_parent_node(None);
        Ok(())
    }

    /// The position of `child` in this node, if it is a child of this node.
    fn index_of(&self, child: &NodeRef) -> Option<usize> {
        self.children_ref()
            .iter()
            .position(|node| node.is_same_node(child))
    }

    /// Snapshot of the current children.
    fn children(&self) -> Vec<NodeRef> {
        self.children_ref().clone()
    }

    /// Set the URI of the entity this node was loaded from.
    ///
    /// An empty string clears it.
    ///
    /// # Errors
    /// `MalformedUri` if `uri` is not a URI reference.
    fn set_base_uri(&mut self, uri: &str) -> Result<(), XmlError> {
        check_uri_reference(uri)?;
        self.set_actual_base_uri((!uri.is_empty()).then(|| uri.to_owned()));
        Ok(())
    }
}

fn check_kind<P: ParentNode + ?Sized>(parent: &P, child: &NodeRef) -> Result<(), XmlError> {
    let (parent_type, child_type) = (parent.node_type(), child.node_type());
    if !check_vertical_hierarchy(parent_type, child_type) {
        let reason = match child_type {
            NodeType::Attribute => "attributes are not children; use add_attribute instead".into(),
            NodeType::Namespace => {
                "namespaces are not children; use add_namespace_declaration instead".into()
            }
            _ => format!("a {child_type} cannot be a child of a {parent_type}").into(),
        };
        return Err(XmlError::IllegalAdd { reason });
    }
    Ok(())
}

/// Storage and kind-specific rules behind [`ParentNode`].
pub(crate) trait ParentConnection: Clone + Into<NodeRef> {
    fn children_ref(&self) -> Ref<'_, Vec<NodeRef>>;

    fn children_mut(&self) -> RefMut<'_, Vec<NodeRef>>;

    fn downgrade_parent(&self) -> NodeWeakRef;

    fn mutation_check(&self) -> Option<Rc<dyn MutationCheck>>;

    fn set_actual_base_uri(&mut self, uri: Option<String>);

    /// Rules that depend on this node and its current children,
    /// in addition to the plain parent/child kind table.
    ///
    /// `replacing` is the child that `child` will replace at `position`, if any.
    fn check_insertion(
        &self,
        child: &NodeRef,
        position: usize,
        replacing: Option<&NodeRef>,
    ) -> Result<(), XmlError>;

    /// `replacement` is the node that will take the place of `child`, if any.
    fn check_removal(
        &self,
        _child: &NodeRef,
        _replacement: Option<&NodeRef>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    /// Append without any check. The caller guarantees that the result is well-formed.
    fn fast_append(&mut self, mut child: NodeRef) {
        child.set_parent_node(Some(self.downgrade_parent()));
        self.children_mut().push(child);
    }
}
