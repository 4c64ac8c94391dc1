//! Build trees from XML text.
//!
//! The text is tokenized by `quick-xml`. Namespaces, the document type declaration
//! and the encoding of byte input are handled here, and the resulting events are
//! delivered to a [`ContentHandler`]. [`TreeBuilder`] is the handler that assembles
//! a [`DocumentRef`].
//!
//! ```
//! use exom::builder::Builder;
//! use exom::dom::Node;
//!
//! let doc = Builder::new().build_str("<root>a&lt;b</root>").unwrap();
//! assert_eq!(doc.root_element().unwrap().value(), "a<b");
//! ```

mod doctype;
mod handler;

use std::{borrow::Cow, error::Error, fs::File, io::Read, path::Path, rc::Rc};

use quick_xml::{
    Reader,
    escape::{EscapeError, unescape},
    events::{BytesStart, Event},
};

use crate::{
    dom::{DocumentRef, MutationCheck, XML_XML_NAMESPACE},
    encoding::{XmlCharEncoding, XmlCharEncodingHandler, detect_encoding},
    error::{ParsingError, XmlError},
    verifier::is_xml_space,
};

pub use handler::{ContentHandler, ParsedAttribute, TreeBuilder};

/// Parser front end producing documents.
///
/// A builder keeps no state between documents and can be reused.
#[derive(Default)]
pub struct Builder {
    system_id: Option<String>,
    check: Option<Rc<dyn MutationCheck>>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose documents consult `check` on every later mutation.
    pub fn with_check(check: Rc<dyn MutationCheck>) -> Self {
        Self {
            system_id: None,
            check: Some(check),
        }
    }

    /// Set the system identifier of the next documents. It becomes their base URI
    /// and is reported in errors.
    pub fn set_base_uri(&mut self, system_id: &str) {
        self.system_id = Some(system_id.to_owned());
    }

    pub fn build_str(&self, xml: &str) -> Result<DocumentRef, ParsingError> {
        let mut handler = TreeBuilder::new(self.system_id.as_deref(), self.check.clone());
        self.parse(xml, &mut handler)?;
        Ok(handler.into_document())
    }

    /// Build from bytes in any supported encoding.
    ///
    /// The encoding is taken from the byte order mark or the first bytes, then from
    /// the encoding declaration, and defaults to UTF-8.
    pub fn build_bytes(&self, bytes: &[u8]) -> Result<DocumentRef, ParsingError> {
        let encoding = match detect_encoding(bytes) {
            Some(encoding) => encoding,
            None => match declared_encoding(bytes) {
                Some(name) => name.parse::<XmlCharEncoding>().map_err(|err| {
                    self.error(format!("unsupported encoding '{name}'"), 1, 1)
                        .with_cause(err)
                })?,
                None => XmlCharEncoding::UTF8,
            },
        };
        log::debug!(target: "exom::builder", "reading {encoding}");
        let xml = XmlCharEncodingHandler::new(encoding)
            .decode(bytes)
            .map_err(|err| {
                self.error(format!("the input is not {encoding}"), 0, 0)
                    .with_cause(err)
            })?;
        self.build_str(&xml)
    }

    pub fn build_reader(&self, mut reader: impl Read) -> Result<DocumentRef, ParsingError> {
        let mut bytes = vec![];
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| self.error("cannot read the input", 0, 0).with_cause(err))?;
        self.build_bytes(&bytes)
    }

    /// Build from a file. Unless a base URI was set, the path is the system identifier.
    pub fn build_file(&self, path: impl AsRef<Path>) -> Result<DocumentRef, ParsingError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            ParsingError::new(format!("cannot open {}", path.display())).with_cause(err)
        })?;
        if self.system_id.is_some() {
            return self.build_reader(file);
        }
        let builder = Builder {
            system_id: Some(path.display().to_string()),
            check: self.check.clone(),
        };
        builder.build_reader(file)
    }

    /// Tokenize `xml` and deliver its events to `handler`.
    pub fn parse(&self, xml: &str, handler: &mut impl ContentHandler) -> Result<(), ParsingError> {
        let xml = normalize_line_ends(xml.strip_prefix('\u{FEFF}').unwrap_or(xml));
        let xml = xml.as_ref();
        let mut reader = Reader::from_str(xml);
        reader.config_mut().expand_empty_elements = true;
        let mut scopes: Vec<Scope> = vec![];

        handler
            .start_document()
            .map_err(|err| self.rejected(xml, 0, err))?;
        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    let (line, column) = location(xml, reader.error_position());
                    return Err(self.error(err.to_string(), line, column).with_cause(err));
                }
            };
            let position = reader.buffer_position();
            let res = match event {
                Event::Start(start) => {
                    self.start_element(xml, position, &start, &mut scopes, handler)
                }
                Event::Empty(start) => self
                    .start_element(xml, position, &start, &mut scopes, handler)
                    .and_then(|_| {
                        scopes.pop();
                        handler
                            .end_element()
                            .map_err(|err| self.rejected(xml, position, err))
                    }),
                Event::End(_) => {
                    scopes.pop();
                    handler
                        .end_element()
                        .map_err(|err| self.rejected(xml, position, err))
                }
                Event::Text(text) => match text.unescape() {
                    Ok(text) => handler
                        .characters(&text)
                        .map_err(|err| self.rejected(xml, position, err)),
                    Err(err) => Err(self.malformed(xml, position, err)),
                },
                Event::CData(cdata) => {
                    let text = self.utf8(xml, position, &cdata)?;
                    handler
                        .start_cdata()
                        .and_then(|_| handler.characters(text))
                        .and_then(|_| handler.end_cdata())
                        .map_err(|err| self.rejected(xml, position, err))
                }
                Event::Comment(comment) => {
                    let text = self.utf8(xml, position, &comment)?;
                    handler
                        .comment(text)
                        .map_err(|err| self.rejected(xml, position, err))
                }
                Event::PI(pi) => {
                    let target = self.utf8(xml, position, pi.target())?;
                    let data = self
                        .utf8(xml, position, pi.content())?
                        .trim_start_matches(is_xml_space);
                    handler
                        .processing_instruction(target, data)
                        .map_err(|err| self.rejected(xml, position, err))
                }
                Event::DocType(dtd) => {
                    let content = self.utf8(xml, position, &dtd)?;
                    match doctype::parse_doctype(content) {
                        Ok(decl) => handler
                            .start_dtd(
                                &decl.name,
                                decl.public_id.as_deref(),
                                decl.system_id.as_deref(),
                                &decl.internal_subset,
                            )
                            .map_err(|err| self.rejected(xml, position, err)),
                        Err(message) => {
                            let (line, column) = location(xml, position);
                            Err(self.error(message, line, column))
                        }
                    }
                }
                // the encoding was chosen before the text was decoded
                Event::Decl(_) => Ok(()),
                Event::Eof => match scopes.last() {
                    Some(scope) => {
                        let (line, column) = location(xml, position);
                        let message = format!("the element '{}' is not closed", scope.qname);
                        Err(self.error(message, line, column))
                    }
                    None => break,
                },
            };
            res?;
        }
        handler
            .end_document()
            .map_err(|err| self.rejected(xml, xml.len() as u64, err))
    }

    fn start_element(
        &self,
        xml: &str,
        position: u64,
        start: &BytesStart<'_>,
        scopes: &mut Vec<Scope>,
        handler: &mut impl ContentHandler,
    ) -> Result<(), ParsingError> {
        let name = start.name();
        let qname = self.utf8(xml, position, name.as_ref())?;
        let mut declarations = vec![];
        let mut attributes = vec![];
        for attr in start.attributes() {
            let attr = attr.map_err(|err| self.malformed(xml, position, err))?;
            let key = self.utf8(xml, position, attr.key.as_ref())?;
            let raw = self.utf8(xml, position, &attr.value)?;
            let value = normalize_attribute_value(raw)
                .map_err(|err| self.malformed(xml, position, err))?;
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push((prefix.to_owned(), value));
            } else {
                attributes.push((key.to_owned(), value));
            }
        }
        scopes.push(Scope {
            qname: qname.to_owned(),
            declarations: declarations.clone(),
        });

        let uri = self.lookup(xml, position, scopes, prefix_of(qname))?;
        let attributes = attributes
            .into_iter()
            .map(|(qname, value)| {
                let uri = match prefix_of(&qname) {
                    "" => String::new(),
                    prefix => self.lookup(xml, position, scopes, prefix)?,
                };
                Ok(ParsedAttribute { qname, uri, value })
            })
            .collect::<Result<Vec<_>, ParsingError>>()?;

        handler
            .start_element(qname, &uri, &attributes, &declarations)
            .map_err(|err| self.rejected(xml, position, err))
    }

    /// The URI bound to `prefix` by the innermost declaration in scope.
    fn lookup(
        &self,
        xml: &str,
        position: u64,
        scopes: &[Scope],
        prefix: &str,
    ) -> Result<String, ParsingError> {
        if prefix == "xml" {
            return Ok(XML_XML_NAMESPACE.to_owned());
        }
        let bound = scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.declarations.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone());
        match bound {
            Some(uri) => Ok(uri),
            None if prefix.is_empty() => Ok(String::new()),
            None => {
                let (line, column) = location(xml, position);
                Err(self.error(format!("the prefix '{prefix}' is not bound"), line, column))
            }
        }
    }

    fn utf8<'a>(&self, xml: &str, position: u64, bytes: &'a [u8]) -> Result<&'a str, ParsingError> {
        std::str::from_utf8(bytes).map_err(|err| self.malformed(xml, position, err))
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ParsingError {
        ParsingError::with_location(message, self.system_id.clone(), line, column)
    }

    fn malformed(
        &self,
        xml: &str,
        position: u64,
        cause: impl Error + Send + Sync + 'static,
    ) -> ParsingError {
        let (line, column) = location(xml, position);
        self.error(cause.to_string(), line, column).with_cause(cause)
    }

    fn rejected(&self, xml: &str, position: u64, cause: XmlError) -> ParsingError {
        log::debug!(target: "exom::builder", "rejected at byte {position}: {cause}");
        self.malformed(xml, position, cause)
    }
}

/// An open element and the namespace declarations of its start tag.
struct Scope {
    qname: String,
    declarations: Vec<(String, String)>,
}

/// Replace `\r\n` and lone `\r` by `\n`, before any markup is recognized.
fn normalize_line_ends(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

/// Turn literal white space of an attribute value into spaces, then expand references.
///
/// Line ends were already normalized, so `\r` only appears through `&#xD;`, which is kept.
fn normalize_attribute_value(raw: &str) -> Result<String, EscapeError> {
    let spaced = raw.replace(['\t', '\n', '\r'], " ");
    Ok(unescape(&spaced)?.into_owned())
}

fn prefix_of(qname: &str) -> &str {
    qname.split_once(':').map_or("", |(prefix, _)| prefix)
}

/// 1-based line and column of the byte offset `position` in `xml`.
fn location(xml: &str, position: u64) -> (usize, usize) {
    let mut position = usize::try_from(position).unwrap_or(xml.len()).min(xml.len());
    while !xml.is_char_boundary(position) {
        position -= 1;
    }
    let before = &xml[..position];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().unwrap_or_default().chars().count() + 1;
    (line, column)
}

/// The encoding name of an XML declaration at the start of ASCII compatible input.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = bytes.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl: String = head[..end].iter().map(|&b| b as char).collect();
    let (_, rest) = decl.split_once("encoding")?;
    let rest = rest.trim_start_matches(is_xml_space).strip_prefix('=')?;
    let rest = rest.trim_start_matches(is_xml_space);
    let quote = rest.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_owned())
}

#[cfg(test)]
mod tests {
    use crate::dom::{Node, ParentNode};

    use super::*;

    #[test]
    fn test_location() {
        let xml = "<a>\n  <b>\u{E9}</b>\n</a>";
        assert_eq!(location(xml, 0), (1, 1));
        assert_eq!(location(xml, 6), (2, 3));
        // inside a multi-byte character
        assert_eq!(location(xml, 10), (2, 6));
        assert_eq!(location(xml, 1000), (3, 5));
    }

    #[test]
    fn test_line_ends() {
        let doc = Builder::new()
            .build_str("<a b='1\r\n2'>x\r\ny\rz&#xD;</a>\r\n")
            .unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.value(), "x\ny\nz\r");
        assert_eq!(root.attribute_value("b", "").as_deref(), Some("1 2"));
        assert!(matches!(normalize_line_ends("a\nb"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_attribute_value_normalization() {
        let doc = Builder::new()
            .build_str("<a b='x\ty\nz' c='&#x9;1&#xA;2&#xD;' d='&lt;\t&amp;'/>")
            .unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.attribute_value("b", "").as_deref(), Some("x y z"));
        assert_eq!(root.attribute_value("c", "").as_deref(), Some("\t1\n2\r"));
        assert_eq!(root.attribute_value("d", "").as_deref(), Some("< &"));
        assert!(normalize_attribute_value("&bogus;").is_err());
    }

    #[test]
    fn test_unclosed_elements() {
        let err = Builder::new().build_str("<a>\n<b>text").unwrap_err();
        assert_eq!(err.line_number(), 2);
        assert!(err.message().contains("'b'"));
        assert!(Builder::new().build_str("<a>").is_err());
        assert!(Builder::new().build_str("<a><b/>").is_err());
    }

    #[test]
    fn test_declared_encoding() {
        assert_eq!(
            declared_encoding(b"<?xml version=\"1.0\" encoding='ISO-8859-1'?><a/>").as_deref(),
            Some("ISO-8859-1")
        );
        assert_eq!(declared_encoding(b"<?xml version=\"1.0\"?><a/>"), None);
        assert_eq!(declared_encoding(b"<a/>"), None);
    }

    #[test]
    fn test_namespaces() {
        let doc = Builder::new()
            .build_str(
                "<root xmlns='http://d.example/' xmlns:p='http://p.example/' p:a='1'>\
                 <p:child xmlns=''><plain/></p:child></root>",
            )
            .unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.namespace_uri(), "http://d.example/");
        assert_eq!(root.attribute_value("a", "http://p.example/").as_deref(), Some("1"));
        let child = root.child_elements()[0].clone();
        assert_eq!(child.namespace_uri(), "http://p.example/");
        let plain = child.child_elements()[0].clone();
        assert_eq!(plain.namespace_uri(), "");
        assert_eq!(plain.qualified_name(), "plain");
    }

    #[test]
    fn test_errors() {
        let mut builder = Builder::new();
        builder.set_base_uri("file:///a.xml");
        let err = builder.build_str("<a>\n<p:b/></a>").unwrap_err();
        assert_eq!(err.system_id(), Some("file:///a.xml"));
        assert_eq!(err.line_number(), 2);

        assert!(builder.build_str("<a></b>").is_err());
        assert!(builder.build_str("").is_err());
        assert!(builder.build_str("<a/><b/>").is_err());
        assert!(builder.build_str("<a>&unknown;</a>").is_err());
        let err = builder.build_str("<a><!----x--></a>").unwrap_err();
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_prolog() {
        let doc = Builder::new()
            .build_str(
                "<?xml version='1.0'?>\n<!DOCTYPE root SYSTEM 'root.dtd'>\n\
                 <?style href='a.css'?>\n<root><![CDATA[<x>]]></root>\n<!-- end -->\n",
            )
            .unwrap();
        assert_eq!(doc.child_count(), 4);
        let doctype = doc.doc_type().unwrap();
        assert_eq!(doctype.root_element_name(), "root");
        assert_eq!(doctype.system_id().as_deref(), Some("root.dtd"));
        let pi = doc.child(1).unwrap().as_processing_instruction().unwrap();
        assert_eq!(pi.target(), "style");
        assert_eq!(pi.value(), "href='a.css'");
        let text = doc.root_element().unwrap().child(0).unwrap().as_text().unwrap();
        assert!(text.is_cdata());
        assert_eq!(text.value(), "<x>");
        assert_eq!(doc.child(3).unwrap().value(), " end ");
        assert_eq!(doc.index_of(&doc.root_element().unwrap().into()), Some(2));
    }

    #[test]
    fn test_bytes() {
        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "<a>\u{E9}</a>".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        let doc = Builder::new().build_bytes(&utf16).unwrap();
        assert_eq!(doc.value(), "\u{E9}");

        let latin1 = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>";
        let doc = Builder::new().build_bytes(latin1).unwrap();
        assert_eq!(doc.value(), "\u{E9}");

        assert!(Builder::new().build_bytes(b"<a>\xE9</a>").is_err());
        assert!(
            Builder::new()
                .build_bytes(b"<?xml version='1.0' encoding='x-unknown'?><a/>")
                .is_err()
        );
    }
}
