//! Stateless checks for names, character data and URI references.
//!
//! Name character classes follow the productions [4] and [4a] of
//! XML 1.0 Fifth Edition. All functions report the first violation found.

use crate::{error::XmlError, uri::XmlURI};

/// `NameStartChar` without `':'`.
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | 'a'..='z'
        | '_'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}'
    )
}

/// `NameChar` without `':'`.
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-'
            | '.'
            | '0'..='9'
            | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}'
        )
}

/// `Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
///
/// Surrogates cannot appear in a `char`, so they need no check here.
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}'
    )
}

/// `S ::= (#x20 | #x9 | #xD | #xA)+`
pub fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// ASCII letters only. Used by the URI utilities.
pub fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`, excluding the first character.
pub fn is_scheme_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// Check that `name` is a non-colonized name.
pub fn check_ncname(name: &str) -> Result<(), XmlError> {
    // fast path for pure ASCII names
    if name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name[1..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        return Ok(());
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(XmlError::illegal_name(name, "NCNames cannot be empty"));
    };
    if first == ':' {
        return Err(XmlError::illegal_name(
            name,
            "NCNames cannot contain colons",
        ));
    }
    if !is_name_start_char(first) {
        return Err(XmlError::illegal_name(
            name,
            format!("NCNames cannot start with the character {:#X}", first as u32),
        ));
    }
    for c in chars {
        if c == ':' {
            return Err(XmlError::illegal_name(
                name,
                "NCNames cannot contain colons",
            ));
        }
        if !is_name_char(c) {
            return Err(XmlError::illegal_name(
                name,
                format!("NCNames cannot contain the character {:#X}", c as u32),
            ));
        }
    }
    Ok(())
}

/// Check that `name` matches the `Name` production, colons allowed.
pub fn check_xml_name(name: &str) -> Result<(), XmlError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(XmlError::illegal_name(name, "XML names cannot be empty"));
    };
    if first != ':' && !is_name_start_char(first) {
        return Err(XmlError::illegal_name(
            name,
            format!("XML names cannot start with the character {:#X}", first as u32),
        ));
    }
    if let Some(c) = chars.find(|&c| c != ':' && !is_name_char(c)) {
        return Err(XmlError::illegal_name(
            name,
            format!("XML names cannot contain the character {:#X}", c as u32),
        ));
    }
    Ok(())
}

/// Split a qualified name on its first colon and check both parts as NCNames.
///
/// Returns `(prefix, local_name)`. The prefix is empty for unprefixed names.
pub fn split_qname(qname: &str) -> Result<(&str, &str), XmlError> {
    match qname.split_once(':') {
        Some((prefix, local)) => {
            if prefix.is_empty() {
                return Err(XmlError::illegal_name(
                    qname,
                    "qualified names cannot start with a colon",
                ));
            }
            check_ncname(prefix)?;
            if local.contains(':') {
                return Err(XmlError::illegal_name(
                    qname,
                    "qualified names cannot contain more than one colon",
                ));
            }
            check_ncname(local)?;
            Ok((prefix, local))
        }
        None => {
            check_ncname(qname)?;
            Ok(("", qname))
        }
    }
}

/// Check that every character of `data` is allowed in an XML document.
pub fn check_character_data(data: &str) -> Result<(), XmlError> {
    if let Some(c) = data.chars().find(|&c| !is_xml_char(c)) {
        return Err(XmlError::illegal_data(
            data,
            format!("{:#X} is not allowed in XML content", c as u32),
        ));
    }
    Ok(())
}

/// Text content follows the same rules as any other character data.
pub fn check_pcdata(data: &str) -> Result<(), XmlError> {
    check_character_data(data)
}

/// Comment content may not contain `--`, nor start or end with `-`.
pub fn check_comment(data: &str) -> Result<(), XmlError> {
    check_character_data(data)?;
    if data.contains("--") {
        return Err(XmlError::illegal_data(data, "comment data contains '--'"));
    }
    if data.starts_with('-') {
        return Err(XmlError::illegal_data(data, "comment data starts with '-'"));
    }
    if data.ends_with('-') {
        return Err(XmlError::illegal_data(data, "comment data ends with '-'"));
    }
    Ok(())
}

/// A processing instruction target is an NCName other than `xml` in any case.
pub fn check_pi_target(target: &str) -> Result<(), XmlError> {
    if target.eq_ignore_ascii_case("xml") {
        return Err(XmlError::IllegalTarget {
            target: target.to_owned(),
            reason: "the target 'xml' is reserved for the XML declaration".into(),
        });
    }
    check_ncname(target).map_err(|err| match err {
        XmlError::IllegalName { name, reason } => XmlError::IllegalTarget {
            target: name,
            reason,
        },
        other => other,
    })
}

/// Processing instruction data may not contain `?>` or start with white space.
pub fn check_pi_data(data: &str) -> Result<(), XmlError> {
    check_character_data(data)?;
    if data.contains("?>") {
        return Err(XmlError::illegal_data(
            data,
            "processing instruction data contains '?>'",
        ));
    }
    if data.starts_with(is_xml_space) {
        return Err(XmlError::illegal_data(
            data,
            "processing instruction data starts with white space",
        ));
    }
    Ok(())
}

/// Check `uri` against the `URI-reference` production of RFC 3986.
///
/// Characters outside ASCII are accepted where RFC 3987 accepts them,
/// so IRIs pass as well.
pub fn check_uri_reference(uri: &str) -> Result<(), XmlError> {
    if XmlURI::parse(uri).is_none() {
        return Err(XmlError::MalformedUri {
            uri: uri.to_owned(),
            reason: "not a URI reference".into(),
        });
    }
    Ok(())
}

/// Same as [`check_uri_reference`], and additionally requires a scheme.
pub fn check_absolute_uri_reference(uri: &str) -> Result<(), XmlError> {
    let Some(parsed) = XmlURI::parse(uri) else {
        return Err(XmlError::MalformedUri {
            uri: uri.to_owned(),
            reason: "not a URI reference".into(),
        });
    };
    if parsed.scheme().is_none() {
        return Err(XmlError::MalformedUri {
            uri: uri.to_owned(),
            reason: "missing scheme in absolute URI reference".into(),
        });
    }
    Ok(())
}

/// Namespace names are either empty or absolute URI references.
pub fn check_namespace_uri(uri: &str) -> Result<(), XmlError> {
    if uri.is_empty() {
        return Ok(());
    }
    check_absolute_uri_reference(uri)
}

/// `PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]`
pub fn check_public_id(id: &str) -> Result<(), XmlError> {
    if let Some(c) = id.chars().find(|&c| {
        !(c.is_ascii_alphanumeric()
            || matches!(
                c,
                ' ' | '\r'
                    | '\n'
                    | '-'
                    | '\''
                    | '('
                    | ')'
                    | '+'
                    | ','
                    | '.'
                    | '/'
                    | ':'
                    | '='
                    | '?'
                    | ';'
                    | '!'
                    | '*'
                    | '#'
                    | '@'
                    | '$'
                    | '_'
                    | '%'
            ))
    }) {
        return Err(XmlError::illegal_data(
            id,
            format!("{:#X} is not allowed in public identifiers", c as u32),
        ));
    }
    Ok(())
}

/// A system literal can be quoted only if it does not contain both quote kinds,
/// and must not carry a fragment identifier.
pub fn check_system_literal(literal: &str) -> Result<(), XmlError> {
    check_character_data(literal)?;
    if literal.contains('"') && literal.contains('\'') {
        return Err(XmlError::illegal_data(
            literal,
            "system literals cannot contain both single and double quotes",
        ));
    }
    if literal.contains('#') {
        return Err(XmlError::MalformedUri {
            uri: literal.to_owned(),
            reason: "system literals cannot contain fragment identifiers".into(),
        });
    }
    Ok(())
}
