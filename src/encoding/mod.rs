//! Character encodings the serializer can write and the builder can read.
//!
//! Unicode encodings, US-ASCII, ISO-8859-1 and IBM037 are implemented here.
//! The other ISO-8859 parts use byte tables taken from the `encoding_rs` decoders.
//! Everything else `encoding_rs` knows is handled through its encoders, and
//! representability is found by probing them one character at a time.

mod tables;

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt::{Debug, Display},
    str::FromStr,
    sync::OnceLock,
};

use encoding_rs::{EUC_JP, Encoder, EncoderResult, Encoding, ISO_2022_JP, SHIFT_JIS};

use tables::{LatinTable, latin_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    UTF8,
    /// Big-endian, preceded by a byte order mark.
    UTF16,
    UTF16BE,
    UTF16LE,
    /// UCS-4 (UTF-32) in big-endian byte order.
    UCS4,
    /// UTF-16 limited to the Basic Multilingual Plane, big-endian.
    UCS2,
    ASCII,
    ISO8859_1,
    /// ISO-8859-2 to ISO-8859-16, by part number.
    ISO8859(u8),
    /// IBM037, the EBCDIC code page for the US and Canada.
    EBCDIC,
    /// Any other encoding known to `encoding_rs`.
    Other(&'static Encoding),
}

impl XmlCharEncoding {
    /// The name written in the encoding declaration.
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::UTF8 => "UTF-8".into(),
            Self::UTF16 => "UTF-16".into(),
            Self::UTF16BE => "UTF-16BE".into(),
            Self::UTF16LE => "UTF-16LE".into(),
            Self::UCS4 => "ISO-10646-UCS-4".into(),
            Self::UCS2 => "ISO-10646-UCS-2".into(),
            Self::ASCII => "US-ASCII".into(),
            Self::ISO8859_1 => "ISO-8859-1".into(),
            Self::ISO8859(part) => format!("ISO-8859-{part}").into(),
            Self::EBCDIC => "IBM037".into(),
            Self::Other(encoding) => encoding.name().into(),
        }
    }

    fn latin_table(&self) -> Option<&'static LatinTable> {
        let Self::ISO8859(part) = self else {
            return None;
        };
        latin_table(*part)
    }

    /// The encodings whose encoders map some characters to bytes that other
    /// decoders read back as different characters.
    fn is_japanese(&self) -> bool {
        matches!(self, Self::Other(encoding) if [SHIFT_JIS, EUC_JP, ISO_2022_JP].contains(encoding))
    }
}

impl Display for XmlCharEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    /// Encoding names are case-insensitive.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let upper = name.trim().to_uppercase();
        let encoding = match upper.as_str() {
            "UTF-8" | "UTF8" => Self::UTF8,
            "UTF-16" | "UTF16" | "UNICODE" => Self::UTF16,
            "UTF-16BE" | "UTF16BE" => Self::UTF16BE,
            "UTF-16LE" | "UTF16LE" => Self::UTF16LE,
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" | "UTF-32" | "UTF32" | "UTF-32BE" => Self::UCS4,
            "ISO-10646-UCS-2" | "UCS-2" | "UCS2" => Self::UCS2,
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" | "ISO646-US" | "CP367" => Self::ASCII,
            "ISO-8859-1" | "ISO_8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" | "LATIN1" | "L1"
            | "8859_1" | "CP819" => Self::ISO8859_1,
            "IBM037" | "IBM-037" | "CP037" | "CSIBM037" | "EBCDIC-CP-US" | "EBCDIC-CP-CA"
            | "EBCDIC-CP-WT" | "EBCDIC-CP-NL" | "EBCDIC" => Self::EBCDIC,
            _ => {
                let part = ["ISO-8859-", "ISO_8859-", "8859_"]
                    .iter()
                    .find_map(|prefix| upper.strip_prefix(prefix))
                    .and_then(|part| part.parse::<u8>().ok())
                    .filter(|&part| latin_table(part).is_some());
                if let Some(part) = part {
                    Self::ISO8859(part)
                } else {
                    // `encoding_rs` decodes some labels with one encoding and
                    // encodes with another. Those cannot be written faithfully.
                    Encoding::for_label(upper.as_bytes())
                        .filter(|encoding| encoding.output_encoding() == *encoding)
                        .map(Self::Other)
                        .ok_or_else(|| EncodingError::Unsupported {
                            name: name.to_owned(),
                        })?
                }
            }
        };
        Ok(encoding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The byte sequence at `offset` cannot be decoded.
    Malformed { offset: usize },
    /// The character `c` has no representation in the target encoding.
    Unmappable { c: char },
    /// The encoding is not known.
    Unsupported { name: String },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encoding Error: ")?;
        match self {
            Self::Malformed { offset } => write!(f, "Malformed byte sequence occurs at {offset}"),
            Self::Unmappable { c } => write!(f, "Unmappable character '{c}'"),
            Self::Unsupported { name } => write!(f, "Unsupported encoding '{name}'"),
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Byte of IBM037 for each character it can represent.
fn ebcdic_reverse() -> &'static HashMap<char, u8> {
    static REVERSE: OnceLock<HashMap<char, u8>> = OnceLock::new();
    REVERSE.get_or_init(|| {
        tables::IBM037
            .iter()
            .enumerate()
            .filter_map(|(byte, &code)| Some((char::from_u32(code as u32)?, byte as u8)))
            .collect()
    })
}

/// IBM037 byte for NEL (U+0085).
///
/// Some EBCDIC codecs swap NEL and LF. The byte is written explicitly
/// so that line ends survive either way.
const EBCDIC_NEL: u8 = 0x15;

/// Stateful encoder and decoder for one [`XmlCharEncoding`].
pub struct XmlCharEncodingHandler {
    encoding: XmlCharEncoding,
    /// Only for [`XmlCharEncoding::Other`].
    encoder: Option<Encoder>,
}

impl XmlCharEncodingHandler {
    pub fn new(encoding: XmlCharEncoding) -> Self {
        let encoder = match encoding {
            XmlCharEncoding::Other(encoding) => Some(encoding.new_encoder()),
            _ => None,
        };
        Self { encoding, encoder }
    }

    pub fn encoding(&self) -> XmlCharEncoding {
        self.encoding
    }

    pub fn name(&self) -> Cow<'static, str> {
        self.encoding.name()
    }

    /// Return `true` if `c` can be written literally in this encoding.
    pub fn can_encode(&self, c: char) -> bool {
        match self.encoding {
            XmlCharEncoding::UTF8
            | XmlCharEncoding::UTF16
            | XmlCharEncoding::UTF16BE
            | XmlCharEncoding::UTF16LE
            | XmlCharEncoding::UCS4 => true,
            XmlCharEncoding::UCS2 => (c as u32) <= 0xFFFF,
            XmlCharEncoding::ASCII => c.is_ascii(),
            XmlCharEncoding::ISO8859_1 => (c as u32) <= 0xFF,
            XmlCharEncoding::ISO8859(_) => self.encode_latin(c).is_some(),
            XmlCharEncoding::EBCDIC => c == '\u{85}' || ebcdic_reverse().contains_key(&c),
            XmlCharEncoding::Other(encoding) => probe(encoding, c),
        }
    }

    /// Return `true` if `c` must be written as a character reference in text.
    ///
    /// This covers characters that cannot be encoded, and characters some
    /// Japanese decoders do not read back as the character that was written.
    pub fn must_escape(&self, c: char) -> bool {
        if self.encoding.is_japanese()
            && matches!(c, '\u{A5}' | '\u{203E}' | '\u{2014}' | '\u{2015}')
        {
            return true;
        }
        !self.can_encode(c)
    }

    /// Bytes written once before anything else.
    pub fn byte_order_mark(&self) -> &'static [u8] {
        match self.encoding {
            XmlCharEncoding::UTF16 => &[0xFE, 0xFF],
            _ => &[],
        }
    }

    /// Append `src` to `out` in this encoding.
    ///
    /// # Errors
    /// `Unmappable` for the first character that [`can_encode`](Self::can_encode) rejects.
    /// The characters before it are already appended.
    pub fn encode(&mut self, src: &str, out: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self.encoding {
            XmlCharEncoding::UTF8 => out.extend_from_slice(src.as_bytes()),
            XmlCharEncoding::UTF16 | XmlCharEncoding::UTF16BE => {
                src.encode_utf16()
                    .for_each(|unit| out.extend_from_slice(&unit.to_be_bytes()));
            }
            XmlCharEncoding::UTF16LE => {
                src.encode_utf16()
                    .for_each(|unit| out.extend_from_slice(&unit.to_le_bytes()));
            }
            XmlCharEncoding::UCS4 => {
                src.chars()
                    .for_each(|c| out.extend_from_slice(&(c as u32).to_be_bytes()));
            }
            XmlCharEncoding::UCS2 => {
                for c in src.chars() {
                    let code =
                        u16::try_from(c as u32).map_err(|_| EncodingError::Unmappable { c })?;
                    out.extend_from_slice(&code.to_be_bytes());
                }
            }
            XmlCharEncoding::ASCII => {
                for c in src.chars() {
                    if !c.is_ascii() {
                        return Err(EncodingError::Unmappable { c });
                    }
                    out.push(c as u8);
                }
            }
            XmlCharEncoding::ISO8859_1 => {
                for c in src.chars() {
                    let byte = u8::try_from(c as u32).map_err(|_| EncodingError::Unmappable { c })?;
                    out.push(byte);
                }
            }
            XmlCharEncoding::ISO8859(_) => {
                for c in src.chars() {
                    out.push(self.encode_latin(c).ok_or(EncodingError::Unmappable { c })?);
                }
            }
            XmlCharEncoding::EBCDIC => {
                let reverse = ebcdic_reverse();
                for c in src.chars() {
                    let byte = if c == '\u{85}' {
                        EBCDIC_NEL
                    } else {
                        *reverse.get(&c).ok_or(EncodingError::Unmappable { c })?
                    };
                    out.push(byte);
                }
            }
            XmlCharEncoding::Other(_) => self.encode_with_encoding_rs(src, out, false)?,
        }
        Ok(())
    }

    /// Append whatever a stateful encoder still owes, such as the escape sequence
    /// that returns ISO-2022-JP to ASCII.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), EncodingError> {
        if matches!(self.encoding, XmlCharEncoding::Other(_)) {
            self.encode_with_encoding_rs("", out, true)?;
        }
        Ok(())
    }

    fn encode_latin(&self, c: char) -> Option<u8> {
        self.encoding.latin_table()?.encode(c)
    }

    fn encode_with_encoding_rs(
        &mut self,
        src: &str,
        out: &mut Vec<u8>,
        last: bool,
    ) -> Result<(), EncodingError> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        let start = out.len();
        let capacity = encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .ok_or(EncodingError::Other {
                msg: "input is too long to encode".into(),
            })?;
        out.resize(start + capacity, 0);
        let (result, _, written) =
            encoder.encode_from_utf8_without_replacement(src, &mut out[start..], last);
        out.truncate(start + written);
        match result {
            EncoderResult::InputEmpty => Ok(()),
            EncoderResult::Unmappable(c) => Err(EncodingError::Unmappable { c }),
            EncoderResult::OutputFull => Err(EncodingError::Other {
                msg: "the output buffer is too short".into(),
            }),
        }
    }

    /// Decode a whole document written in this encoding.
    ///
    /// A leading byte order mark is removed.
    pub fn decode(&self, src: &[u8]) -> Result<String, EncodingError> {
        match self.encoding {
            XmlCharEncoding::UTF8 => {
                let src = src.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(src);
                String::from_utf8(src.to_vec()).map_err(|err| EncodingError::Malformed {
                    offset: err.utf8_error().valid_up_to(),
                })
            }
            XmlCharEncoding::UTF16 => match src {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes, 2),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes, 2),
                _ => decode_utf16(src, u16::from_be_bytes, 0),
            },
            XmlCharEncoding::UTF16BE | XmlCharEncoding::UCS2 => {
                let (src, skipped) = match src {
                    [0xFE, 0xFF, rest @ ..] => (rest, 2),
                    _ => (src, 0),
                };
                decode_utf16(src, u16::from_be_bytes, skipped)
            }
            XmlCharEncoding::UTF16LE => {
                let (src, skipped) = match src {
                    [0xFF, 0xFE, rest @ ..] => (rest, 2),
                    _ => (src, 0),
                };
                decode_utf16(src, u16::from_le_bytes, skipped)
            }
            XmlCharEncoding::UCS4 => {
                if src.len() % 4 != 0 {
                    return Err(EncodingError::Malformed {
                        offset: src.len() / 4 * 4,
                    });
                }
                src.chunks_exact(4)
                    .enumerate()
                    .map(|(i, chunk)| {
                        let code = chunk.iter().fold(0u32, |s, &v| (s << 8) | v as u32);
                        char::from_u32(code).ok_or(EncodingError::Malformed { offset: i * 4 })
                    })
                    .collect()
            }
            XmlCharEncoding::ASCII => src
                .iter()
                .enumerate()
                .map(|(offset, &b)| {
                    b.is_ascii()
                        .then_some(b as char)
                        .ok_or(EncodingError::Malformed { offset })
                })
                .collect(),
            XmlCharEncoding::ISO8859_1 => Ok(src.iter().map(|&b| b as char).collect()),
            XmlCharEncoding::ISO8859(_) => {
                let Some(table) = self.encoding.latin_table() else {
                    return Err(EncodingError::Unsupported {
                        name: self.name().into_owned(),
                    });
                };
                src.iter()
                    .enumerate()
                    .map(|(offset, &b)| table.decode(b).ok_or(EncodingError::Malformed { offset }))
                    .collect()
            }
            XmlCharEncoding::EBCDIC => src
                .iter()
                .enumerate()
                .map(|(offset, &b)| {
                    char::from_u32(tables::IBM037[b as usize] as u32)
                        .ok_or(EncodingError::Malformed { offset })
                })
                .collect(),
            XmlCharEncoding::Other(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(src)
                .map(Cow::into_owned)
                .ok_or(EncodingError::Malformed { offset: 0 }),
        }
    }
}

impl Debug for XmlCharEncodingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlCharEncodingHandler")
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Encode `c` alone with a fresh encoder and check that it came out as itself.
///
/// Encoders that replace instead of failing emit `?` for unknown characters.
fn probe(encoding: &'static Encoding, c: char) -> bool {
    let mut encoder = encoding.new_encoder();
    let mut src = [0; 4];
    let src = c.encode_utf8(&mut src);
    let mut dst = [0; 16];
    let (result, _, written) = encoder.encode_from_utf8_without_replacement(src, &mut dst, true);
    match result {
        EncoderResult::InputEmpty => c == '?' || &dst[..written] != b"?",
        EncoderResult::Unmappable(_) | EncoderResult::OutputFull => false,
    }
}

fn decode_utf16(
    src: &[u8],
    from_bytes: fn([u8; 2]) -> u16,
    skipped: usize,
) -> Result<String, EncodingError> {
    if src.len() % 2 != 0 {
        return Err(EncodingError::Malformed {
            offset: skipped + src.len() - 1,
        });
    }
    let units = src.chunks_exact(2).map(|chunk| from_bytes([chunk[0], chunk[1]]));
    let mut decoded = String::with_capacity(src.len() / 2);
    let mut offset = skipped;
    for c in char::decode_utf16(units) {
        let c = c.map_err(|_| EncodingError::Malformed { offset })?;
        offset += c.len_utf16() * 2;
        decoded.push(c);
    }
    Ok(decoded)
}

/// Guess the encoding family of a document from its first bytes.
///
/// Returns `None` when the document starts with an ASCII-compatible encoding
/// and only its declaration can tell which one.
pub fn detect_encoding(input: &[u8]) -> Option<XmlCharEncoding> {
    match input {
        [0x00, 0x00, 0x00, 0x3C, ..] | [0x00, 0x00, 0xFE, 0xFF, ..] => Some(XmlCharEncoding::UCS4),
        [0x4C, 0x6F, 0xA7, 0x94, ..] => Some(XmlCharEncoding::EBCDIC),
        [0x3C, 0x00, 0x3F, 0x00, ..] | [0xFF, 0xFE, ..] => Some(XmlCharEncoding::UTF16LE),
        [0x00, 0x3C, 0x00, 0x3F, ..] | [0xFE, 0xFF, ..] => Some(XmlCharEncoding::UTF16BE),
        [0xEF, 0xBB, 0xBF, ..] => Some(XmlCharEncoding::UTF8),
        _ => None,
    }
}
