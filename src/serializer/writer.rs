//! Character level output: escaping, encoding, line breaking and indentation.

use std::io::Write;

use unicode_normalization::UnicodeNormalization;

use crate::encoding::{EncodingError, XmlCharEncodingHandler};

use super::{LineSeparator, SerializeError};

/// Encoded bytes are handed to the sink once this many are pending.
const FLUSH_THRESHOLD: usize = 4096;

/// Lines are broken at white space once the column comes this close to the maximum length.
const WRAP_MARGIN: usize = 10;

pub(super) struct TextWriter<W: Write> {
    out: W,
    handler: XmlCharEncodingHandler,
    // encoded, not yet written to `out`
    buffer: Vec<u8>,
    bom_pending: bool,
    column: usize,
    // the number of spaces added per level
    indent: usize,
    indent_string: String,
    // levels entered after the indentation reached its cap
    fake_indents: usize,
    max_length: usize,
    line_separator: Option<LineSeparator>,
    normalize: bool,
    // one entry per open element, `true` inside xml:space="preserve"
    preserve_space: Vec<bool>,
}

impl<W: Write> TextWriter<W> {
    pub(super) fn new(out: W, handler: XmlCharEncodingHandler) -> Self {
        Self {
            out,
            handler,
            buffer: vec![],
            bom_pending: true,
            column: 0,
            indent: 0,
            indent_string: String::new(),
            fake_indents: 0,
            max_length: 0,
            line_separator: None,
            normalize: false,
            preserve_space: vec![],
        }
    }

    pub(super) fn handler(&self) -> &XmlCharEncodingHandler {
        &self.handler
    }

    pub(super) fn indent(&self) -> usize {
        self.indent
    }

    pub(super) fn set_indent(&mut self, indent: usize) {
        self.indent = indent;
    }

    pub(super) fn max_length(&self) -> usize {
        self.max_length
    }

    pub(super) fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }

    pub(super) fn line_separator(&self) -> Option<LineSeparator> {
        self.line_separator
    }

    pub(super) fn set_line_separator(&mut self, separator: Option<LineSeparator>) {
        self.line_separator = separator;
    }

    pub(super) fn unicode_normalization(&self) -> bool {
        self.normalize
    }

    pub(super) fn set_unicode_normalization(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    pub(super) fn column(&self) -> usize {
        self.column
    }

    fn preserving(&self) -> bool {
        self.preserve_space.last().copied().unwrap_or(false)
    }

    /// Return `true` if markup is currently laid out on indented lines.
    pub(super) fn is_indenting(&self) -> bool {
        self.indent > 0 && !self.preserving()
    }

    fn is_wrapping(&self) -> bool {
        self.max_length > 0 && !self.preserving()
    }

    /// Return `true` if white space may be changed to lay out the output.
    fn is_adjusting_whitespace(&self) -> bool {
        self.is_indenting() || self.is_wrapping()
    }

    /// Enter an element whose `xml:space` attribute is `space`.
    /// Without the attribute the enclosing setting is kept.
    pub(super) fn push_space(&mut self, space: Option<&str>) {
        let preserve = match space {
            Some("preserve") => true,
            Some("default") => false,
            _ => self.preserving(),
        };
        self.preserve_space.push(preserve);
    }

    pub(super) fn pop_space(&mut self) {
        self.preserve_space.pop();
    }

    pub(super) fn increment_indent(&mut self) {
        if self.indent == 0 {
            return;
        }
        if self.max_length > 0 && self.indent_string.len() + self.indent > self.max_length / 2 {
            self.fake_indents += 1;
            log::debug!(
                target: "exom::serializer",
                "indentation capped at {} columns, {} level(s) not indented",
                self.indent_string.len(),
                self.fake_indents
            );
        } else {
            self.indent_string.extend(std::iter::repeat_n(' ', self.indent));
        }
    }

    pub(super) fn decrement_indent(&mut self) {
        if self.indent == 0 {
            return;
        }
        if self.fake_indents > 0 {
            self.fake_indents -= 1;
        } else {
            let len = self.indent_string.len().saturating_sub(self.indent);
            self.indent_string.truncate(len);
        }
    }

    fn separator(&self) -> &'static str {
        self.line_separator.map_or("\n", |sep| sep.as_str())
    }

    /// Start a new line, then indent it to the current level.
    pub(super) fn break_line(&mut self) -> Result<(), SerializeError> {
        let separator = self.separator();
        self.emit(separator)?;
        let indent = self.indent_string.clone();
        self.emit(&indent)
    }

    /// Return `true` if every character of `text` can be written without a reference.
    pub(super) fn can_write_literally(&self, text: &str) -> bool {
        text.chars().all(|c| !self.handler.must_escape(c))
    }

    fn normalized<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        if self.normalize {
            text.nfc().collect::<String>().into()
        } else {
            text.into()
        }
    }

    /// Write markup that cannot contain references.
    ///
    /// # Errors
    /// `UnavailableCharacter` if some character is not representable in the output encoding.
    /// Nothing is written in that case.
    pub(super) fn write_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        let text = self.normalized(text);
        if let Some(c) = text.chars().find(|&c| !self.handler.can_encode(c)) {
            return Err(SerializeError::UnavailableCharacter {
                character: c,
                encoding: self.handler.name().into_owned(),
            });
        }
        self.emit(&text)
    }

    /// Write character data, escaping markup characters and carriage returns.
    pub(super) fn write_escaped(&mut self, text: &str) -> Result<(), SerializeError> {
        let text = self.normalized(text);
        let mut chars = text.chars().peekable();
        let mut chunk = String::new();
        while let Some(c) = chars.next() {
            match c {
                '<' => chunk.push_str("&lt;"),
                '>' => chunk.push_str("&gt;"),
                '&' => chunk.push_str("&amp;"),
                '\r' | '\n' if self.line_separator.is_some() => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    self.emit(&chunk)?;
                    chunk.clear();
                    self.emit(self.separator())?;
                }
                '\r' => chunk.push_str("&#x0D;"),
                ' ' if self.is_wrapping()
                    && self.column + chunk.chars().count()
                        >= self.max_length.saturating_sub(WRAP_MARGIN) =>
                {
                    self.emit(&chunk)?;
                    chunk.clear();
                    self.break_line()?;
                }
                c if self.handler.must_escape(c) => push_reference(&mut chunk, c),
                c => chunk.push(c),
            }
        }
        self.emit(&chunk)
    }

    /// Write the content of a double-quoted attribute value.
    pub(super) fn write_attribute_value(&mut self, value: &str) -> Result<(), SerializeError> {
        let value = self.normalized(value);
        let mut chunk = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '<' => chunk.push_str("&lt;"),
                '>' => chunk.push_str("&gt;"),
                '&' => chunk.push_str("&amp;"),
                '"' => chunk.push_str("&quot;"),
                '\t' | '\n' if self.is_adjusting_whitespace() => chunk.push(' '),
                '\t' => chunk.push_str("&#x09;"),
                '\n' => chunk.push_str("&#x0A;"),
                '\r' => chunk.push_str("&#x0D;"),
                c if self.handler.must_escape(c) => push_reference(&mut chunk, c),
                c => chunk.push(c),
            }
        }
        self.emit(&chunk)
    }

    /// Separate an attribute of `next_len` characters from the preceding markup,
    /// on a new line if it would not fit on the current one.
    pub(super) fn write_attribute_separator(
        &mut self,
        next_len: usize,
    ) -> Result<(), SerializeError> {
        if self.is_wrapping() && self.column + next_len + 1 > self.max_length {
            self.break_line()
        } else {
            self.emit(" ")
        }
    }

    /// Encode `text`, which is known to be representable, and track the column.
    fn emit(&mut self, text: &str) -> Result<(), SerializeError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.bom_pending {
            self.buffer.extend_from_slice(self.handler.byte_order_mark());
            self.bom_pending = false;
        }
        self.handler
            .encode(text, &mut self.buffer)
            .map_err(|err| self.encoding_error(err))?;
        match text.rfind(['\n', '\r']) {
            Some(pos) => self.column = text[pos + 1..].chars().count(),
            None => self.column += text.chars().count(),
        }
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.out.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn encoding_error(&self, err: EncodingError) -> SerializeError {
        match err {
            EncodingError::Unmappable { c } => SerializeError::UnavailableCharacter {
                character: c,
                encoding: self.handler.name().into_owned(),
            },
            other => SerializeError::Io(std::io::Error::other(other)),
        }
    }

    /// Close the state of a stateful encoder, so that the output so far is complete.
    pub(super) fn finish_encoding(&mut self) -> Result<(), SerializeError> {
        self.handler
            .finish(&mut self.buffer)
            .map_err(|err| self.encoding_error(err))?;
        self.handler = XmlCharEncodingHandler::new(self.handler.encoding());
        Ok(())
    }

    pub(super) fn flush(&mut self) -> Result<(), SerializeError> {
        self.out.write_all(&self.buffer)?;
        self.buffer.clear();
        self.out.flush()?;
        Ok(())
    }

    pub(super) fn into_inner(mut self) -> Result<W, SerializeError> {
        self.finish_encoding()?;
        self.flush()?;
        Ok(self.out)
    }
}

fn push_reference(chunk: &mut String, c: char) {
    chunk.push_str(&format!("&#x{:X};", c as u32));
}

#[cfg(test)]
mod tests {
    use crate::encoding::XmlCharEncoding;

    use super::*;

    fn writer(encoding: XmlCharEncoding) -> TextWriter<Vec<u8>> {
        TextWriter::new(vec![], XmlCharEncodingHandler::new(encoding))
    }

    #[test]
    fn test_escaping() {
        let mut w = writer(XmlCharEncoding::ASCII);
        w.write_escaped("a<b>&c\r\u{E9}\u{1D11E}").unwrap();
        w.write_raw(" ").unwrap();
        w.write_attribute_value("\"\t\n'").unwrap();
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "a&lt;b&gt;&amp;c&#x0D;&#xE9;&#x1D11E; &quot;&#x09;&#x0A;'"
        );
    }

    #[test]
    fn test_attribute_whitespace() {
        let mut w = writer(XmlCharEncoding::UTF8);
        w.set_indent(2);
        w.write_attribute_value("a\tb\nc\rd").unwrap();
        w.push_space(Some("preserve"));
        w.write_raw(" ").unwrap();
        w.write_attribute_value("a\tb\nc").unwrap();
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(out, "a b c&#x0D;d a&#x09;b&#x0A;c");
    }

    #[test]
    fn test_raw_unavailable() {
        let mut w = writer(XmlCharEncoding::ISO8859_1);
        match w.write_raw("caf\u{E9}\u{3042}") {
            Err(SerializeError::UnavailableCharacter {
                character,
                encoding,
            }) => {
                assert_eq!(character, '\u{3042}');
                assert_eq!(encoding, "ISO-8859-1");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(w.column(), 0);
    }

    #[test]
    fn test_line_separator() {
        let mut w = writer(XmlCharEncoding::UTF8);
        w.write_escaped("a\r\nb\rc").unwrap();
        w.set_line_separator(Some(LineSeparator::CrLf));
        w.write_escaped("a\r\nb\rc\nd").unwrap();
        assert_eq!(w.column(), 1);
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(out, "a&#x0D;\nb&#x0D;ca\r\nb\r\nc\r\nd");
    }

    #[test]
    fn test_indent_cap() {
        let mut w = writer(XmlCharEncoding::UTF8);
        w.set_indent(4);
        w.set_max_length(20);
        for _ in 0..5 {
            w.increment_indent();
        }
        // the indentation never exceeds half of the maximum length
        assert_eq!(w.indent_string.len(), 8);
        assert_eq!(w.fake_indents, 3);
        for _ in 0..4 {
            w.decrement_indent();
        }
        assert_eq!(w.indent_string.len(), 4);
        w.break_line().unwrap();
        assert_eq!(w.column(), 4);
    }

    #[test]
    fn test_wrap() {
        let mut w = writer(XmlCharEncoding::UTF8);
        w.set_max_length(20);
        w.write_escaped("aaaa bbbb cccc dddd eeee").unwrap();
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(out, "aaaa bbbb cccc\ndddd eeee");

        let mut w = writer(XmlCharEncoding::UTF8);
        w.set_max_length(20);
        w.push_space(Some("preserve"));
        w.write_escaped("aaaa bbbb cccc dddd eeee").unwrap();
        assert_eq!(w.column(), 24);
    }

    #[test]
    fn test_normalization() {
        let mut w = writer(XmlCharEncoding::ISO8859_1);
        w.set_unicode_normalization(true);
        w.write_escaped("e\u{301}").unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, [0xE9]);
    }
}
