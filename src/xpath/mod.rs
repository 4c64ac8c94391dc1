//! The interface between trees and an XPath engine.
//!
//! No engine lives in this crate. An engine implements [`XPathEvaluator`] on top of the
//! read-only accessors of [`Node`](crate::dom::Node) and the namespace lookups of
//! [`ElementRef`], and is invoked through [`NodeRef::query`].

use std::collections::HashMap;

use crate::{
    dom::{ElementRef, NodeRef, XML_XML_NAMESPACE},
    error::XmlError,
    verifier::{check_namespace_uri, check_ncname},
};

/// Bindings of the prefixes an XPath expression uses.
///
/// The `xml` prefix is always bound. A default namespace cannot be bound, because
/// unprefixed names in XPath 1.0 always mean no namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XPathContext {
    namespaces: HashMap<String, String>,
}

impl XPathContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(prefix: &str, uri: &str) -> Result<Self, XmlError> {
        let mut context = Self::new();
        context.add_namespace(prefix, Some(uri))?;
        Ok(context)
    }

    /// Context binding every prefix in scope on `elem`, except the default namespace.
    pub fn from_element(elem: &ElementRef) -> Self {
        let namespaces = elem
            .namespace_nodes()
            .into_iter()
            .map(|ns| (ns.prefix(), ns.uri()))
            .filter(|(prefix, _)| !prefix.is_empty() && prefix != "xml")
            .collect();
        Self { namespaces }
    }

    /// Bind `prefix` to `uri`, or remove its binding if `uri` is `None` or empty.
    ///
    /// # Errors
    /// - `IllegalName` if `prefix` is not an NCName.
    /// - `NamespaceConflict` for the empty prefix, or a binding of `xml` to another URI.
    pub fn add_namespace(&mut self, prefix: &str, uri: Option<&str>) -> Result<(), XmlError> {
        let uri = uri.filter(|uri| !uri.is_empty());
        if prefix.is_empty() {
            if uri.is_none() {
                return Ok(());
            }
            return Err(XmlError::namespace_conflict(
                prefix,
                uri.unwrap_or_default(),
                "XPath cannot bind a default namespace",
            ));
        }
        check_ncname(prefix)?;
        if prefix == "xml" {
            return match uri {
                Some(XML_XML_NAMESPACE) | None => Ok(()),
                Some(uri) => Err(XmlError::namespace_conflict(
                    prefix,
                    uri,
                    "the xml prefix cannot be rebound",
                )),
            };
        }
        match uri {
            Some(uri) => {
                check_namespace_uri(uri)?;
                self.namespaces.insert(prefix.to_owned(), uri.to_owned());
            }
            None => {
                self.namespaces.remove(prefix);
            }
        }
        Ok(())
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_XML_NAMESPACE);
        }
        self.namespaces.get(prefix).map(String::as_str)
    }
}

/// An XPath 1.0 engine.
///
/// Engines only read the tree. The nodes they return must belong to the tree of the
/// context node.
pub trait XPathEvaluator {
    type Error: std::error::Error;

    fn select(
        &self,
        context: &NodeRef,
        expression: &str,
        namespaces: &XPathContext,
    ) -> Result<Vec<NodeRef>, Self::Error>;
}

impl NodeRef {
    /// Evaluate `expression` with `self` as the context node.
    ///
    /// Without `namespaces`, only the `xml` prefix is bound.
    /// The result holds every node once, in the order the engine produced them.
    pub fn query<E: XPathEvaluator>(
        &self,
        evaluator: &E,
        expression: &str,
        namespaces: Option<&XPathContext>,
    ) -> Result<Vec<NodeRef>, E::Error> {
        let empty = XPathContext::new();
        let mut nodes = evaluator.select(self, expression, namespaces.unwrap_or(&empty))?;
        let mut seen: Vec<NodeRef> = Vec::with_capacity(nodes.len());
        nodes.retain(|node| {
            if seen.contains(node) {
                false
            } else {
                seen.push(node.clone());
                true
            }
        });
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Display;

    use crate::dom::{Node, ParentNode};

    use super::*;

    #[derive(Debug)]
    struct Unbound(String);

    impl Display for Unbound {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "unbound prefix '{}'", self.0)
        }
    }

    impl std::error::Error for Unbound {}

    /// Understands `name` and `prefix:name` steps on the child axis, separated by `/`.
    struct ChildSteps;

    impl XPathEvaluator for ChildSteps {
        type Error = Unbound;

        fn select(
            &self,
            context: &NodeRef,
            expression: &str,
            namespaces: &XPathContext,
        ) -> Result<Vec<NodeRef>, Self::Error> {
            let mut current = vec![context.clone()];
            for step in expression.split('/') {
                let (uri, local) = match step.split_once(':') {
                    Some((prefix, local)) => (
                        namespaces
                            .lookup(prefix)
                            .ok_or_else(|| Unbound(prefix.to_owned()))?,
                        local,
                    ),
                    None => ("", step),
                };
                current = current
                    .iter()
                    .filter_map(NodeRef::as_element)
                    .flat_map(|elem| elem.child_elements_by_name(local, uri))
                    .map(NodeRef::from)
                    .collect();
            }
            Ok(current)
        }
    }

    #[test]
    fn test_context() {
        let mut context = XPathContext::with_namespace("p", "http://p.example/").unwrap();
        assert_eq!(context.lookup("p"), Some("http://p.example/"));
        assert_eq!(context.lookup("xml"), Some(XML_XML_NAMESPACE));
        assert!(matches!(
            context.add_namespace("", Some("http://d.example/")),
            Err(XmlError::NamespaceConflict { .. })
        ));
        assert!(context.add_namespace("xml", Some("http://x.example/")).is_err());
        assert!(context.add_namespace("a:b", Some("http://x.example/")).is_err());
        context.add_namespace("p", None).unwrap();
        assert_eq!(context.lookup("p"), None);
    }

    #[test]
    fn test_from_element() {
        let mut root = ElementRef::with_namespace("root", "http://d.example/").unwrap();
        root.add_namespace_declaration("p", "http://p.example/")
            .unwrap();
        let child = ElementRef::with_namespace("q:child", "http://q.example/").unwrap();
        root.append_child(child.clone()).unwrap();

        let context = XPathContext::from_element(&child);
        assert_eq!(context.lookup("p"), Some("http://p.example/"));
        assert_eq!(context.lookup("q"), Some("http://q.example/"));
        assert_eq!(context.lookup(""), None);
    }

    #[test]
    fn test_query() {
        let mut root = ElementRef::new("root").unwrap();
        let mut a = ElementRef::new("a").unwrap();
        a.append_child(ElementRef::with_namespace("p:b", "http://p.example/").unwrap())
            .unwrap();
        a.append_child(ElementRef::new("b").unwrap()).unwrap();
        root.append_child(a).unwrap();
        let root: NodeRef = root.into();

        let namespaces = XPathContext::with_namespace("x", "http://p.example/").unwrap();
        let found = root.query(&ChildSteps, "a/x:b", Some(&namespaces)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_element().unwrap().qualified_name(), "p:b");
        assert_eq!(found[0].parent_node().unwrap().child_count(), 2);

        assert_eq!(root.query(&ChildSteps, "a/b", None).unwrap().len(), 1);
        assert!(root.query(&ChildSteps, "a/x:b", None).is_err());
    }
}
