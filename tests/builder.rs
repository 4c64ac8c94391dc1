use std::{cell::RefCell, error::Error, rc::Rc};

use exom::{
    builder::{Builder, ContentHandler, ParsedAttribute},
    dom::{ElementRef, MutationCheck, Node, NodeRef, ParentNode, TextRef},
    error::XmlError,
};

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl ContentHandler for Recorder {
    fn start_document(&mut self) -> Result<(), XmlError> {
        self.events.push("start".to_owned());
        Ok(())
    }

    fn start_dtd(
        &mut self,
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: &str,
    ) -> Result<(), XmlError> {
        self.events.push(format!(
            "dtd {root_name} {public_id:?} {system_id:?} {internal_subset:?}"
        ));
        Ok(())
    }

    fn start_element(
        &mut self,
        qname: &str,
        uri: &str,
        attributes: &[ParsedAttribute],
        declarations: &[(String, String)],
    ) -> Result<(), XmlError> {
        let attributes = attributes
            .iter()
            .map(|attr| format!("{}={{{}}}{}", attr.qname, attr.uri, attr.value))
            .collect::<Vec<_>>();
        self.events.push(format!(
            "<{qname} {{{uri}}} {attributes:?} {declarations:?}"
        ));
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), XmlError> {
        self.events.push(">".to_owned());
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XmlError> {
        self.events.push(format!("text {text:?}"));
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        self.events.push("cdata".to_owned());
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.events.push(format!("comment {text:?}"));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.events.push(format!("pi {target} {data:?}"));
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        self.events.push("end".to_owned());
        Ok(())
    }
}

#[test]
fn events_arrive_in_document_order() {
    let mut recorder = Recorder::default();
    Builder::new()
        .parse(
            "<!DOCTYPE r PUBLIC '-//X//EN' 'r.dtd' [<!ENTITY e 'x'>]>\
             <r xmlns:p='urn:p' p:a='1&amp;2'><?pi data?><![CDATA[c]]><!--k--></r>",
            &mut recorder,
        )
        .unwrap();
    assert_eq!(
        recorder.events,
        [
            "start",
            "dtd r Some(\"-//X//EN\") Some(\"r.dtd\") \"<!ENTITY e 'x'>\"",
            "<r {} [\"p:a={urn:p}1&2\"] [(\"p\", \"urn:p\")]",
            "pi pi \"data\"",
            "cdata",
            "text \"c\"",
            "comment \"k\"",
            ">",
            "end",
        ]
    );
}

#[test]
fn built_trees_are_ordinary_trees() {
    let doc = Builder::new()
        .build_str("<root><a>1</a><b xml:lang='en'>2</b></root>")
        .unwrap();
    let mut root = doc.root_element().unwrap();
    assert_eq!(root.value(), "12");
    assert!(root.parent_node().unwrap().is_same_node(&doc.clone().into()));

    let b = root.child_elements_by_name("b", "").pop().unwrap();
    assert_eq!(
        b.attribute_value("lang", "http://www.w3.org/XML/1998/namespace")
            .as_deref(),
        Some("en")
    );

    // mutations are checked as usual
    assert_eq!(root.append_child(root.clone()), Err(XmlError::Cycle));
    root.append_child(TextRef::new("3").unwrap()).unwrap();
    assert_eq!(root.to_xml(), "<root><a>1</a><b xml:lang=\"en\">2</b>3</root>");
}

#[test]
fn declarations_implied_by_names_are_not_stored() {
    let doc = Builder::new()
        .build_str("<p:root xmlns:p='urn:p' xmlns:q='urn:q' xmlns:r='urn:r' r:a=''/>")
        .unwrap();
    let mut root = doc.root_element().unwrap();
    assert_eq!(root.namespace_declaration_count(), 3);
    assert_eq!(
        root.to_xml(),
        "<p:root xmlns:p=\"urn:p\" xmlns:q=\"urn:q\" xmlns:r=\"urn:r\" r:a=\"\"/>"
    );

    // the binding of r goes away with the attribute that implies it
    let attr = root.attribute("a", "urn:r").unwrap();
    root.remove_attribute(&attr).unwrap();
    assert_eq!(root.namespace_uri_for_prefix("r"), None);
    assert_eq!(root.local_namespace_uri("q").as_deref(), Some("urn:q"));
    assert_eq!(root.to_xml(), "<p:root xmlns:p=\"urn:p\" xmlns:q=\"urn:q\"/>");
}

#[test]
fn errors_carry_their_location() {
    let mut builder = Builder::new();
    builder.set_base_uri("http://example.com/doc.xml");

    let err = builder.build_str("<a>\n  <b>\n</a>").unwrap_err();
    assert_eq!(err.system_id(), Some("http://example.com/doc.xml"));
    assert_eq!(err.line_number(), 3);
    assert!(err.source().is_some());

    // well-formed for the tokenizer, rejected by the tree
    let err = builder.build_str("<a>\n<?xml-stylesheet href='a'?><?XmL x?></a>").unwrap_err();
    assert_eq!(err.line_number(), 2);
    let cause = err.cause().and_then(|cause| cause.downcast_ref::<XmlError>());
    assert!(matches!(cause, Some(XmlError::IllegalTarget { .. })));

    let err = builder.build_str("<a p:b='1'/>").unwrap_err();
    assert!(err.message().contains("'p'"));
}

#[test]
fn unclosed_elements_are_rejected() {
    let mut builder = Builder::new();
    builder.set_base_uri("http://example.com/doc.xml");
    let err = builder.build_str("<a><b>text").unwrap_err();
    assert_eq!(err.system_id(), Some("http://example.com/doc.xml"));
    assert_eq!(err.line_number(), 1);
    assert_eq!(err.column_number(), 11);
    assert!(err.message().contains("'b'"));

    let mut recorder = Recorder::default();
    assert!(Builder::new().parse("<r>", &mut recorder).is_err());
    assert!(!recorder.events.contains(&"end".to_owned()));
}

#[test]
fn attribute_white_space_becomes_spaces() {
    let doc = Builder::new()
        .build_str("<a tab='x\ty' lines='1\r\n2\n3' refs='&#x9;&#xA;&#xD;'/>")
        .unwrap();
    let root = doc.root_element().unwrap();
    assert_eq!(root.attribute_value("tab", "").as_deref(), Some("x y"));
    assert_eq!(root.attribute_value("lines", "").as_deref(), Some("1 2 3"));
    assert_eq!(root.attribute_value("refs", "").as_deref(), Some("\t\n\r"));

    // references survive a round trip through the serializer
    let reread = Builder::new().build_str(&root.to_xml()).unwrap();
    let reread = reread.root_element().unwrap();
    assert_eq!(reread.attribute_value("refs", "").as_deref(), Some("\t\n\r"));
}

#[test]
fn base_uri_comes_from_the_system_id() {
    let mut builder = Builder::new();
    builder.set_base_uri("http://example.com/dir/doc.xml");
    let doc = builder.build_str("<a><b/></a>").unwrap();
    let b = doc.root_element().unwrap().child(0).unwrap();
    assert_eq!(b.base_uri(), "http://example.com/dir/doc.xml");

    let doc = Builder::new().build_str("<a/>").unwrap();
    assert_eq!(doc.base_uri(), "");
}

#[test]
fn files_are_read_with_their_declared_encoding() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/resources/latin1.xml");
    let doc = Builder::new().build_file(path).unwrap();
    assert!(doc.base_uri().ends_with("latin1.xml"));
    let root = doc.root_element().unwrap();
    assert_eq!(root.attribute_value("name", "").as_deref(), Some("Fran\u{E7}ois"));
    assert_eq!(root.value().trim(), "d\u{E9}j\u{E0} vu");

    assert!(Builder::new().build_file("tests/resources/missing.xml").is_err());
}

struct NoComments {
    rejected: RefCell<usize>,
}

impl MutationCheck for NoComments {
    fn check_insert_child(
        &self,
        _parent: &NodeRef,
        child: &NodeRef,
        _position: usize,
    ) -> Result<(), XmlError> {
        if child.as_comment().is_some() {
            *self.rejected.borrow_mut() += 1;
            return Err(XmlError::IllegalAdd {
                reason: "no comments".into(),
            });
        }
        Ok(())
    }
}

#[test]
fn injected_checks_apply_to_built_documents() {
    let check = Rc::new(NoComments {
        rejected: RefCell::new(0),
    });
    let builder = Builder::with_check(check.clone());
    // building itself is not checked
    let doc = builder.build_str("<a><!--kept--></a>").unwrap();
    let mut root = doc.root_element().unwrap();
    assert_eq!(root.child_count(), 1);

    assert!(root.append_child(exom::dom::CommentRef::new("x").unwrap()).is_err());
    root.append_child(ElementRef::new("b").unwrap()).unwrap();
    assert_eq!(*check.rejected.borrow(), 1);
    assert_eq!(root.to_xml(), "<a><!--kept--><b/></a>");
}
