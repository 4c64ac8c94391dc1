//! Write trees as XML text.
//!
//! [`Serializer`] walks a tree and writes it to any [`Write`] sink in the chosen encoding.
//! Characters the encoding cannot represent are written as character references where
//! XML allows them. Where it does not (names, comments, processing instructions and the
//! document type declaration), serialization fails with
//! [`SerializeError::UnavailableCharacter`].
//!
//! The low-level primitives are public, so that a caller can mix hand-written markup with
//! serialized nodes.
//!
//! ```
//! use exom::dom::ElementRef;
//! use exom::serializer::Serializer;
//!
//! let mut root = ElementRef::new("root").unwrap();
//! root.append_text("caf\u{E9}").unwrap();
//! let mut serializer = Serializer::with_encoding(vec![], "US-ASCII").unwrap();
//! serializer.write_element(&root).unwrap();
//! let out = serializer.into_inner().unwrap();
//! assert_eq!(out, b"<root>caf&#xE9;</root>");
//! ```

mod writer;

use std::{
    borrow::Cow,
    fmt::Display,
    io::{self, Write},
    str::FromStr,
};

use crate::{
    dom::{
        AttrRef, CommentRef, DocumentRef, DocumentTypeRef, ElementRef, NamespaceRef, Node,
        NodeRef, ParentNode, ProcessingInstructionRef, TextRef, XML_XML_NAMESPACE,
    },
    encoding::{XmlCharEncoding, XmlCharEncodingHandler},
};

use writer::TextWriter;

#[derive(Debug)]
pub enum SerializeError {
    Io(io::Error),
    /// `character` is not representable in `encoding`, and the context
    /// does not allow a character reference.
    UnavailableCharacter { character: char, encoding: String },
    UnsupportedEncoding(String),
}

impl Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::UnavailableCharacter {
                character,
                encoding,
            } => write!(
                f,
                "the character U+{:04X} cannot be written in {encoding} here",
                *character as u32
            ),
            Self::UnsupportedEncoding(name) => write!(f, "unsupported encoding '{name}'"),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Line ends written by [`Serializer::break_line`] and in place of line ends in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSeparator {
    Lf,
    Cr,
    CrLf,
}

impl LineSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::CrLf => "\r\n",
        }
    }
}

impl FromStr for LineSeparator {
    type Err = String;

    /// Accept both the characters themselves and the names `LF`, `CR` and `CRLF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "\n" => Ok(Self::Lf),
            "\r" => Ok(Self::Cr),
            "\r\n" => Ok(Self::CrLf),
            s if s.eq_ignore_ascii_case("lf") => Ok(Self::Lf),
            s if s.eq_ignore_ascii_case("cr") => Ok(Self::Cr),
            s if s.eq_ignore_ascii_case("crlf") => Ok(Self::CrLf),
            _ => Err(format!("unknown line separator '{}'", s.escape_debug())),
        }
    }
}

enum Step {
    Open(NodeRef),
    /// The element, and whether its last written child was text.
    Close(ElementRef, bool),
}

pub struct Serializer<W: Write> {
    writer: TextWriter<W>,
    preserve_base_uri: bool,
}

impl<W: Write> Serializer<W> {
    /// Serializer writing UTF-8.
    pub fn new(out: W) -> Self {
        Self::with_handler(out, XmlCharEncodingHandler::new(XmlCharEncoding::UTF8))
    }

    /// # Errors
    /// `UnsupportedEncoding` if `encoding` is not a known encoding name.
    pub fn with_encoding(out: W, encoding: &str) -> Result<Self, SerializeError> {
        let encoding = encoding
            .parse::<XmlCharEncoding>()
            .map_err(|_| SerializeError::UnsupportedEncoding(encoding.to_owned()))?;
        Ok(Self::with_handler(out, XmlCharEncodingHandler::new(encoding)))
    }

    fn with_handler(out: W, handler: XmlCharEncodingHandler) -> Self {
        log::debug!(target: "exom::serializer", "writing {}", handler.name());
        Self {
            writer: TextWriter::new(out, handler),
            preserve_base_uri: false,
        }
    }

    /// The name written in the XML declaration.
    pub fn encoding(&self) -> Cow<'static, str> {
        self.writer.handler().name()
    }

    pub fn indent(&self) -> usize {
        self.writer.indent()
    }

    /// Indent each level of nesting by `indent` spaces. `0` disables indentation.
    ///
    /// While indenting, white space only text nodes are not written,
    /// except inside `xml:space="preserve"`.
    pub fn set_indent(&mut self, indent: usize) {
        self.writer.set_indent(indent);
    }

    pub fn max_length(&self) -> usize {
        self.writer.max_length()
    }

    /// Break lines at white space once they approach `max_length` characters.
    /// `0` disables wrapping.
    ///
    /// This is a preference, not a guarantee: long names and words are never split.
    /// The indentation stops growing at half of `max_length`.
    pub fn set_max_length(&mut self, max_length: usize) {
        self.writer.set_max_length(max_length);
    }

    pub fn line_separator(&self) -> Option<LineSeparator> {
        self.writer.line_separator()
    }

    /// With a separator, line ends in text are written as that separator instead of
    /// being preserved exactly. Without one, `\n` is used between lines.
    pub fn set_line_separator(&mut self, separator: Option<LineSeparator>) {
        self.writer.set_line_separator(separator);
    }

    pub fn preserve_base_uri(&self) -> bool {
        self.preserve_base_uri
    }

    /// Write `xml:base` on elements whose base URI differs from their parent's.
    pub fn set_preserve_base_uri(&mut self, preserve: bool) {
        self.preserve_base_uri = preserve;
    }

    pub fn unicode_normalization(&self) -> bool {
        self.writer.unicode_normalization()
    }

    /// Normalize all text to NFC before it is written.
    pub fn set_unicode_normalization(&mut self, normalize: bool) {
        self.writer.set_unicode_normalization(normalize);
    }

    /// The number of characters written since the last line end.
    pub fn column_number(&self) -> usize {
        self.writer.column()
    }

    pub fn write_document(&mut self, doc: &DocumentRef) -> Result<(), SerializeError> {
        self.write_xml_declaration()?;
        for child in doc.children() {
            self.break_line()?;
            self.write_node(&child)?;
        }
        self.break_line()?;
        self.writer.finish_encoding()?;
        self.flush()
    }

    pub fn write_xml_declaration(&mut self) -> Result<(), SerializeError> {
        let declaration = format!("<?xml version=\"1.0\" encoding=\"{}\"?>", self.encoding());
        self.write_raw(&declaration)
    }

    /// Write any node. Attributes are written as `name="value"`, namespace nodes
    /// as the declaration that binds them.
    pub fn write_node(&mut self, node: &NodeRef) -> Result<(), SerializeError> {
        match node {
            NodeRef::Document(doc) => self.write_document(doc),
            NodeRef::Element(elem) => self.write_element(elem),
            NodeRef::Attribute(attr) => self.write_attribute(attr),
            NodeRef::Namespace(ns) => self.write_namespace(ns),
            NodeRef::Text(text) => self.write_text(text),
            NodeRef::Comment(comment) => self.write_comment(comment),
            NodeRef::ProcessingInstruction(pi) => self.write_processing_instruction(pi),
            NodeRef::DocumentType(doctype) => self.write_document_type(doctype),
        }
    }

    /// Write `elem` and its descendants.
    ///
    /// The output declares every namespace it uses, even if `elem` inherits
    /// the binding from an ancestor.
    pub fn write_element(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        let mut stack = vec![Step::Open(elem.clone().into())];
        let mut depth = 0usize;
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(node) => {
                    let NodeRef::Element(current) = node else {
                        if depth > 0 && self.writer.is_indenting() && node.as_text().is_none() {
                            self.break_line()?;
                        }
                        self.write_node(&node)?;
                        continue;
                    };
                    if depth > 0 && self.writer.is_indenting() {
                        self.break_line()?;
                    }
                    self.writer
                        .push_space(current.attribute_value("space", XML_XML_NAMESPACE).as_deref());
                    let children = self.children_to_write(&current);
                    let top = depth == 0;
                    if children.is_empty() {
                        self.write_tag_start(&current, top)?;
                        self.write_raw("/>")?;
                        self.writer.pop_space();
                        continue;
                    }
                    self.write_tag_start(&current, top)?;
                    self.write_raw(">")?;
                    self.writer.increment_indent();
                    depth += 1;
                    let ends_with_text = matches!(children.last(), Some(NodeRef::Text(_)));
                    stack.push(Step::Close(current, ends_with_text));
                    stack.extend(children.into_iter().rev().map(Step::Open));
                }
                Step::Close(current, ends_with_text) => {
                    self.writer.decrement_indent();
                    if self.writer.is_indenting() && !ends_with_text {
                        self.break_line()?;
                    }
                    self.write_end_tag(&current)?;
                    self.writer.pop_space();
                    depth -= 1;
                }
            }
        }
        Ok(())
    }

    fn children_to_write(&self, elem: &ElementRef) -> Vec<NodeRef> {
        let mut children = elem.children();
        if self.writer.is_indenting() {
            children.retain(|child| !matches!(child, NodeRef::Text(text) if text.is_whitespace()));
        }
        children
    }

    pub fn write_start_tag(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        self.write_tag_start(elem, false)?;
        self.write_raw(">")
    }

    pub fn write_empty_element_tag(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        self.write_tag_start(elem, false)?;
        self.write_raw("/>")
    }

    pub fn write_end_tag(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        self.write_raw(&format!("</{}>", elem.qualified_name()))
    }

    fn write_tag_start(
        &mut self,
        elem: &ElementRef,
        self_contained: bool,
    ) -> Result<(), SerializeError> {
        self.write_raw(&format!("<{}", elem.qualified_name()))?;
        if self_contained {
            self.write_inherited_namespace_declarations(elem)?;
        } else {
            self.write_namespace_declarations(elem)?;
        }
        self.write_attributes(elem)?;
        if self.preserve_base_uri {
            self.write_base_uri(elem)?;
        }
        Ok(())
    }

    pub fn write_attributes(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        for attr in elem.attributes() {
            let name = attr.qualified_name();
            let value = attr.value();
            self.writer
                .write_attribute_separator(name.chars().count() + value.chars().count() + 3)?;
            self.write_attribute(&attr)?;
        }
        Ok(())
    }

    fn write_attribute(&mut self, attr: &AttrRef) -> Result<(), SerializeError> {
        self.write_raw(&attr.qualified_name())?;
        self.write_raw("=\"")?;
        self.write_attribute_value(&attr.value())?;
        self.write_raw("\"")
    }

    /// Write the namespace declarations `elem` needs beyond the bindings in scope
    /// on its parent, including an undeclaration of the default namespace.
    pub fn write_namespace_declarations(
        &mut self,
        elem: &ElementRef,
    ) -> Result<(), SerializeError> {
        let parent = elem.parent_node().and_then(|parent| parent.as_element());
        for index in 0..elem.namespace_declaration_count() {
            let Some(prefix) = elem.namespace_prefix_at(index) else {
                continue;
            };
            let uri = elem.local_namespace_uri(&prefix).unwrap_or_default();
            let inherited = match &parent {
                Some(parent) => parent.namespace_uri_for_prefix(&prefix),
                None => prefix.is_empty().then(String::new),
            };
            if inherited.as_deref() != Some(uri.as_str()) {
                self.write_namespace_declaration(&prefix, &uri)?;
            }
        }
        Ok(())
    }

    /// Declare every binding in scope on `elem`, so that it can be read without its ancestors.
    fn write_inherited_namespace_declarations(
        &mut self,
        elem: &ElementRef,
    ) -> Result<(), SerializeError> {
        if elem.parent_node().and_then(|parent| parent.as_element()).is_none() {
            return self.write_namespace_declarations(elem);
        }
        for ns in elem.namespace_nodes() {
            let prefix = ns.prefix();
            if prefix != "xml" {
                self.write_namespace_declaration(&prefix, &ns.uri())?;
            }
        }
        Ok(())
    }

    fn write_namespace_declaration(
        &mut self,
        prefix: &str,
        uri: &str,
    ) -> Result<(), SerializeError> {
        let name = if prefix.is_empty() {
            "xmlns".to_owned()
        } else {
            format!("xmlns:{prefix}")
        };
        self.writer
            .write_attribute_separator(name.chars().count() + uri.chars().count() + 3)?;
        self.write_raw(&name)?;
        self.write_raw("=\"")?;
        self.write_attribute_value(uri)?;
        self.write_raw("\"")
    }

    fn write_namespace(&mut self, ns: &NamespaceRef) -> Result<(), SerializeError> {
        let prefix = ns.prefix();
        if prefix.is_empty() {
            self.write_raw("xmlns=\"")?;
        } else {
            self.write_raw(&format!("xmlns:{prefix}=\""))?;
        }
        self.write_attribute_value(&ns.uri())?;
        self.write_raw("\"")
    }

    fn write_base_uri(&mut self, elem: &ElementRef) -> Result<(), SerializeError> {
        if elem.attribute("base", XML_XML_NAMESPACE).is_some() {
            return Ok(());
        }
        let base = elem.base_uri();
        let parent_base = match elem.parent_node() {
            Some(NodeRef::Element(parent)) => parent.base_uri(),
            _ => String::new(),
        };
        if !base.is_empty() && base != parent_base {
            self.writer
                .write_attribute_separator(base.len() + "xml:base=\"\"".len())?;
            self.write_raw("xml:base=\"")?;
            self.write_attribute_value(&base)?;
            self.write_raw("\"")?;
        }
        Ok(())
    }

    /// CDATA sections are kept when their content can be written literally,
    /// otherwise they become escaped text.
    fn write_text(&mut self, text: &TextRef) -> Result<(), SerializeError> {
        let value = text.value();
        if text.is_cdata()
            && !value.contains("]]>")
            && !value.contains('\r')
            && self.writer.can_write_literally(&value)
        {
            self.write_raw("<![CDATA[")?;
            self.write_raw(&value)?;
            self.write_raw("]]>")
        } else {
            self.write_escaped(&value)
        }
    }

    fn write_comment(&mut self, comment: &CommentRef) -> Result<(), SerializeError> {
        self.write_raw(&format!("<!--{}-->", comment.value()))
    }

    fn write_processing_instruction(
        &mut self,
        pi: &ProcessingInstructionRef,
    ) -> Result<(), SerializeError> {
        let data = pi.value();
        if data.is_empty() {
            self.write_raw(&format!("<?{}?>", pi.target()))
        } else {
            self.write_raw(&format!("<?{} {data}?>", pi.target()))
        }
    }

    fn write_document_type(&mut self, doctype: &DocumentTypeRef) -> Result<(), SerializeError> {
        self.write_raw(&format!("<!DOCTYPE {}", doctype.root_element_name()))?;
        match (doctype.public_id(), doctype.system_id()) {
            (Some(public_id), Some(system_id)) => {
                self.write_raw(&format!(" PUBLIC \"{public_id}\" {}", quote(&system_id)))?;
            }
            (None, Some(system_id)) => self.write_raw(&format!(" SYSTEM {}", quote(&system_id)))?,
            _ => {}
        }
        let subset = doctype.internal_subset();
        if !subset.is_empty() {
            self.write_raw(" [")?;
            self.break_line()?;
            self.write_raw(&subset)?;
            self.break_line()?;
            self.write_raw("]")?;
        }
        self.write_raw(">")
    }

    /// Write character data with `<`, `>`, `&` and carriage returns escaped,
    /// and unrepresentable characters as references.
    pub fn write_escaped(&mut self, text: &str) -> Result<(), SerializeError> {
        self.writer.write_escaped(text)
    }

    /// Like [`write_escaped`](Self::write_escaped), and also escape `"`, tabs and line ends.
    pub fn write_attribute_value(&mut self, value: &str) -> Result<(), SerializeError> {
        self.writer.write_attribute_value(value)
    }

    /// Write `text` unescaped.
    ///
    /// # Errors
    /// `UnavailableCharacter` if `text` holds a character the encoding cannot represent.
    pub fn write_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.writer.write_raw(text)
    }

    pub fn break_line(&mut self) -> Result<(), SerializeError> {
        self.writer.break_line()
    }

    pub fn flush(&mut self) -> Result<(), SerializeError> {
        self.writer.flush()
    }

    /// Flush everything and return the sink.
    pub fn into_inner(self) -> Result<W, SerializeError> {
        self.writer.into_inner()
    }
}

/// Quote a system literal with whichever quote it does not contain.
fn quote(literal: &str) -> String {
    if literal.contains('"') {
        format!("'{literal}'")
    } else {
        format!("\"{literal}\"")
    }
}

/// Serialize `node` as UTF-8 without indentation or wrapping.
pub(crate) fn node_to_xml(node: &NodeRef) -> String {
    let mut serializer = Serializer::new(vec![]);
    // Writing UTF-8 into a `Vec` cannot fail.
    if serializer.write_node(node).is_err() {
        return String::new();
    }
    serializer
        .into_inner()
        .ok()
        .and_then(|out| String::from_utf8(out).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(doc: &DocumentRef, configure: impl FnOnce(&mut Serializer<Vec<u8>>)) -> String {
        let mut serializer = Serializer::new(vec![]);
        configure(&mut serializer);
        serializer.write_document(doc).unwrap();
        String::from_utf8(serializer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_to_xml() {
        let mut root = ElementRef::new("root").unwrap();
        root.append_child(TextRef::new("a<b").unwrap()).unwrap();
        assert_eq!(root.to_xml(), "<root>a&lt;b</root>");
        assert_eq!(ElementRef::new("x").unwrap().to_xml(), "<x/>");

        let attr = AttrRef::new("a", "1\"2").unwrap();
        assert_eq!(attr.to_xml(), "a=\"1&quot;2\"");
        let pi = ProcessingInstructionRef::new("t", "").unwrap();
        assert_eq!(pi.to_xml(), "<?t?>");
        let comment = CommentRef::new(" c ").unwrap();
        assert_eq!(comment.to_xml(), "<!-- c -->");
        assert_eq!(TextRef::cdata("x]]>y").unwrap().to_xml(), "x]]&gt;y");
        assert_eq!(TextRef::cdata("<x>").unwrap().to_xml(), "<![CDATA[<x>]]>");
    }

    #[test]
    fn test_namespaces() {
        let mut root = ElementRef::with_namespace("root", "http://d.example/").unwrap();
        root.add_namespace_declaration("p", "http://p.example/")
            .unwrap();
        let mut child = ElementRef::with_namespace("p:child", "http://p.example/").unwrap();
        let plain = ElementRef::new("plain").unwrap();
        child.append_child(plain.clone()).unwrap();
        root.append_child(child.clone()).unwrap();
        assert_eq!(
            root.to_xml(),
            "<root xmlns=\"http://d.example/\" xmlns:p=\"http://p.example/\">\
             <p:child><plain xmlns=\"\"/></p:child></root>"
        );
        // a subtree written alone declares what it inherits
        assert_eq!(
            child.to_xml(),
            "<p:child xmlns:p=\"http://p.example/\" xmlns=\"http://d.example/\">\
             <plain xmlns=\"\"/></p:child>"
        );
    }

    #[test]
    fn test_document() {
        let mut root = ElementRef::new("root").unwrap();
        root.append_child(ElementRef::new("a").unwrap()).unwrap();
        root.append_text("  ").unwrap();
        root.append_child(ElementRef::new("b").unwrap()).unwrap();
        let mut doc = DocumentRef::new(root).unwrap();
        doc.set_doc_type(DocumentTypeRef::with_system_id("root", "root.dtd").unwrap())
            .unwrap();

        let out = serialize(&doc, |_| {});
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE root SYSTEM \"root.dtd\">\n\
             <root><a/>  <b/></root>\n"
        );

        let out = serialize(&doc, |s| s.set_indent(2));
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE root SYSTEM \"root.dtd\">\n\
             <root>\n  <a/>\n  <b/>\n</root>\n"
        );
    }

    #[test]
    fn test_preserve_space() {
        let mut root = ElementRef::new("root").unwrap();
        let mut pre = ElementRef::new("pre").unwrap();
        pre.add_attribute(AttrRef::new("xml:space", "preserve").unwrap())
            .unwrap();
        pre.append_text(" ").unwrap();
        pre.append_child(ElementRef::new("b").unwrap()).unwrap();
        root.append_child(pre).unwrap();

        let mut serializer = Serializer::new(vec![]);
        serializer.set_indent(2);
        serializer.write_element(&root).unwrap();
        let out = String::from_utf8(serializer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "<root>\n  <pre xml:space=\"preserve\"> <b/></pre>\n</root>");
    }

    #[test]
    fn test_base_uri() {
        let mut root = ElementRef::new("root").unwrap();
        root.set_base_uri("http://example.com/dir/").unwrap();
        let mut child = ElementRef::new("child").unwrap();
        child.set_base_uri("sub/").unwrap();
        root.append_child(child).unwrap();

        let mut serializer = Serializer::new(vec![]);
        serializer.set_preserve_base_uri(true);
        serializer.write_element(&root).unwrap();
        let out = String::from_utf8(serializer.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "<root xml:base=\"http://example.com/dir/\">\
             <child xml:base=\"http://example.com/dir/sub/\"/></root>"
        );
    }

    #[test]
    fn test_unavailable_character() {
        let mut root = ElementRef::new("r\u{E9}sum\u{E9}").unwrap();
        root.append_text("\u{E9}").unwrap();
        let mut serializer = Serializer::with_encoding(vec![], "ASCII").unwrap();
        assert!(matches!(
            serializer.write_element(&root),
            Err(SerializeError::UnavailableCharacter { character: '\u{E9}', .. })
        ));
        assert!(matches!(
            Serializer::with_encoding(vec![], "no-such-encoding"),
            Err(SerializeError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_line_separator_names() {
        assert_eq!("crlf".parse(), Ok(LineSeparator::CrLf));
        assert_eq!("\r".parse(), Ok(LineSeparator::Cr));
        assert!("x".parse::<LineSeparator>().is_err());
    }
}
