//! Split the body of a `<!DOCTYPE ...>` declaration into its parts.

use crate::verifier::is_xml_space;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(super) struct DoctypeDecl {
    pub(super) name: String,
    pub(super) public_id: Option<String>,
    pub(super) system_id: Option<String>,
    /// Without the brackets and the white space around the declarations.
    pub(super) internal_subset: String,
}

/// `content` is everything between `<!DOCTYPE` and the closing `>`.
pub(super) fn parse_doctype(content: &str) -> Result<DoctypeDecl, String> {
    let mut rest = content.trim_start_matches(is_xml_space);
    let name_end = rest
        .find(|c: char| is_xml_space(c) || c == '[')
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_end);
    if name.is_empty() {
        return Err("the document type declaration has no name".to_owned());
    }
    rest = tail.trim_start_matches(is_xml_space);

    let mut decl = DoctypeDecl {
        name: name.to_owned(),
        ..Default::default()
    };
    if let Some(tail) = rest.strip_prefix("PUBLIC") {
        let (public_id, tail) = quoted(tail)?;
        let (system_id, tail) = quoted(tail)?;
        decl.public_id = Some(public_id.to_owned());
        decl.system_id = Some(system_id.to_owned());
        rest = tail;
    } else if let Some(tail) = rest.strip_prefix("SYSTEM") {
        let (system_id, tail) = quoted(tail)?;
        decl.system_id = Some(system_id.to_owned());
        rest = tail;
    }
    rest = rest.trim_start_matches(is_xml_space);

    if let Some(tail) = rest.strip_prefix('[') {
        let end = tail
            .rfind(']')
            .ok_or_else(|| "the internal subset is not closed".to_owned())?;
        decl.internal_subset = tail[..end].trim_matches(is_xml_space).to_owned();
        rest = &tail[end + 1..];
    }
    if !rest.trim_matches(is_xml_space).is_empty() {
        return Err(format!(
            "unexpected '{}' in the document type declaration",
            rest.trim_matches(is_xml_space)
        ));
    }
    Ok(decl)
}

/// Read a literal in single or double quotes after optional white space.
fn quoted(s: &str) -> Result<(&str, &str), String> {
    let s = s.trim_start_matches(is_xml_space);
    let mut chars = s.chars();
    let quote = match chars.next() {
        Some(quote @ ('"' | '\'')) => quote,
        _ => return Err("a quoted literal is expected".to_owned()),
    };
    let body = &s[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| "the literal is not closed".to_owned())?;
    Ok((&body[..end], &body[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_doctype() {
        let decl = parse_doctype(" html").unwrap();
        assert_eq!(decl.name, "html");
        assert_eq!(decl.system_id, None);

        let decl = parse_doctype(
            " html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" 'http://www.w3.org/x.dtd'",
        )
        .unwrap();
        assert_eq!(
            decl.public_id.as_deref(),
            Some("-//W3C//DTD XHTML 1.0 Strict//EN")
        );
        assert_eq!(decl.system_id.as_deref(), Some("http://www.w3.org/x.dtd"));

        let decl = parse_doctype("root SYSTEM \"a.dtd\" [\n<!ELEMENT root (#PCDATA)>\n]").unwrap();
        assert_eq!(decl.internal_subset, "<!ELEMENT root (#PCDATA)>");

        let decl = parse_doctype("root[<!ATTLIST root a CDATA \"]\">]").unwrap();
        assert_eq!(decl.internal_subset, "<!ATTLIST root a CDATA \"]\">");
    }

    #[test]
    fn test_malformed_doctype() {
        assert!(parse_doctype("  ").is_err());
        assert!(parse_doctype("root SYSTEM").is_err());
        assert!(parse_doctype("root SYSTEM \"a.dtd").is_err());
        assert!(parse_doctype("root [ <!ELEMENT root EMPTY>").is_err());
        assert!(parse_doctype("root junk").is_err());
    }
}
