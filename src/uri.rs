//! Provide methods and data structures for handling URIs.
//!
//! Parsing follows the RFC 3986 grammar. Characters outside ASCII are accepted
//! wherever RFC 3987 allows `ucschar`, so IRIs can be used as base URIs and
//! namespace names. Resolution follows section 5.2 of RFC 3986.

use std::fmt::Display;

use crate::verifier::{is_alpha, is_scheme_character};

// `pct-encoded   = "%" HEXDIG HEXDIG`
fn starts_with_pct_encoded(p: &str) -> bool {
    let p = p.as_bytes();
    p.len() >= 3 && p[0] == b'%' && p[1].is_ascii_hexdigit() && p[2].is_ascii_hexdigit()
}

// `iunreserved   = ALPHA / DIGIT / "-" / "." / "_" / "~" / ucschar`
fn starts_with_unreserved(p: &str) -> bool {
    p.starts_with(|c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~') || is_ucschar(c)
    })
}

// `sub-delims    = "!" / "$" / "&" / "'" / "(" / ")" / "*" / "+" / "," / ";" / "="`
fn starts_with_sub_delims(p: &str) -> bool {
    p.starts_with(['!', '$', '&', '(', ')', '*', '+', ',', ';', '=', '\''])
}

// `pchar         = unreserved / pct-encoded / sub-delims / ":" / "@"`
fn starts_with_pchar(p: &str) -> bool {
    starts_with_unreserved(p)
        || starts_with_pct_encoded(p)
        || starts_with_sub_delims(p)
        || p.starts_with([':', '@'])
}

fn is_ucschar(c: char) -> bool {
    matches!(c,
        '\u{A0}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFEF}'
        | '\u{10000}'..='\u{EFFFD}'
    )
}

/// Skip one already-matched unit: three bytes for `%HH`, one character otherwise.
fn skip_one(s: &str) -> &str {
    if s.starts_with('%') {
        &s[3..]
    } else {
        let len = s.chars().next().map_or(0, char::len_utf8);
        &s[len..]
    }
}

/// A parsed URI reference. Each component is kept exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlURI {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl XmlURI {
    /// Parse a `URI-reference`.
    ///
    /// Returns `None` if `s` does not match the grammar.
    pub fn parse(s: &str) -> Option<Self> {
        let mut uri = Self::default();
        if uri.parse3986_uri(s).is_some() {
            return Some(uri);
        }
        let mut uri = Self::default();
        uri.parse3986_relative_ref(s)?;
        Some(uri)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns `true` if the reference has a scheme.
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    /// A URI with a scheme whose path does not start with `/` and no authority,
    /// such as `urn:isbn:0451450523` or `mailto:a@example.com`.
    pub fn is_opaque(&self) -> bool {
        self.scheme.is_some() && self.authority.is_none() && !self.path.starts_with('/')
    }

    /// Recompose the components as described in section 5.3 of RFC 3986.
    pub fn save(&self) -> String {
        let mut ret = String::new();
        if let Some(scheme) = self.scheme.as_deref() {
            ret.push_str(scheme);
            ret.push(':');
        }
        if let Some(authority) = self.authority.as_deref() {
            ret.push_str("//");
            ret.push_str(authority);
        }
        ret.push_str(&self.path);
        if let Some(query) = self.query.as_deref() {
            ret.push('?');
            ret.push_str(query);
        }
        if let Some(fragment) = self.fragment.as_deref() {
            ret.push('#');
            ret.push_str(fragment);
        }
        ret
    }

    /// ```text
    /// scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
    /// ```
    fn parse3986_scheme<'a>(&mut self, s: &'a str) -> Option<&'a str> {
        if !s.starts_with(is_alpha) {
            return None;
        }
        let rem = s.trim_start_matches(is_scheme_character);
        self.scheme = Some(s[..s.len() - rem.len()].to_owned());
        Some(rem)
    }

    /// ```text
    /// authority     = [ userinfo "@" ] host [ ":" port ]
    /// userinfo      = *( unreserved / pct-encoded / sub-delims / ":" )
    /// host          = IP-literal / IPv4address / reg-name
    /// reg-name      = *( unreserved / pct-encoded / sub-delims )
    /// port          = *DIGIT
    /// ```
    fn parse3986_authority<'a>(&mut self, s: &'a str) -> Option<&'a str> {
        let mut cur = s;
        // userinfo, if followed by '@'
        let mut user = cur;
        while starts_with_unreserved(user)
            || starts_with_pct_encoded(user)
            || starts_with_sub_delims(user)
            || user.starts_with(':')
        {
            user = skip_one(user);
        }
        if let Some(rem) = user.strip_prefix('@') {
            cur = rem;
        }
        // host
        if let Some(rem) = cur.strip_prefix('[') {
            let (literal, rem) = rem.split_once(']')?;
            if literal.is_empty()
                || !literal
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() || matches!(c, ':' | '.' | 'v' | 'V'))
            {
                return None;
            }
            cur = rem;
        } else {
            while starts_with_unreserved(cur)
                || starts_with_pct_encoded(cur)
                || starts_with_sub_delims(cur)
            {
                cur = skip_one(cur);
            }
        }
        // port
        if let Some(rem) = cur.strip_prefix(':') {
            cur = rem.trim_start_matches(|c: char| c.is_ascii_digit());
        }
        self.authority = Some(s[..s.len() - cur.len()].to_owned());
        Some(cur)
    }

    /// ```text
    /// segment       = *pchar
    /// ```
    /// The first segment of a relative path must not contain a colon
    /// when `first_no_colon` is set.
    fn parse3986_path<'a>(&mut self, s: &'a str, first_no_colon: bool) -> Option<&'a str> {
        let mut cur = s;
        let mut in_first = !s.starts_with('/');
        loop {
            if let Some(rem) = cur.strip_prefix('/') {
                cur = rem;
                in_first = false;
            } else if starts_with_pchar(cur) {
                if first_no_colon && in_first && cur.starts_with(':') {
                    return None;
                }
                cur = skip_one(cur);
            } else {
                break;
            }
        }
        self.path = s[..s.len() - cur.len()].to_owned();
        Some(cur)
    }

    /// ```text
    /// query         = *( pchar / "/" / "?" )
    /// fragment      = *( pchar / "/" / "?" )
    /// ```
    fn parse3986_query_like(s: &str) -> (&str, &str) {
        let mut cur = s;
        while starts_with_pchar(cur) || cur.starts_with(['/', '?']) {
            cur = skip_one(cur);
        }
        (&s[..s.len() - cur.len()], cur)
    }

    fn parse3986_tail<'a>(&mut self, mut s: &'a str) -> Option<&'a str> {
        if let Some(rem) = s.strip_prefix('?') {
            let (query, rem) = Self::parse3986_query_like(rem);
            self.query = Some(query.to_owned());
            s = rem;
        }
        if let Some(rem) = s.strip_prefix('#') {
            let (fragment, rem) = Self::parse3986_query_like(rem);
            self.fragment = Some(fragment.to_owned());
            s = rem;
        }
        s.is_empty().then_some(s)
    }

    /// ```text
    /// URI           = scheme ":" hier-part [ "?" query ] [ "#" fragment ]
    /// hier-part     = "//" authority path-abempty
    ///               / path-absolute
    ///               / path-rootless
    ///               / path-empty
    /// ```
    fn parse3986_uri<'a>(&mut self, s: &'a str) -> Option<&'a str> {
        let mut s = self.parse3986_scheme(s)?;
        s = s.strip_prefix(':')?;
        if let Some(rem) = s.strip_prefix("//") {
            s = self.parse3986_authority(rem)?;
            if !s.is_empty() && !s.starts_with(['/', '?', '#']) {
                return None;
            }
        }
        s = self.parse3986_path(s, false)?;
        self.parse3986_tail(s)
    }

    /// ```text
    /// relative-ref  = relative-part [ "?" query ] [ "#" fragment ]
    /// relative-part = "//" authority path-abempty
    ///               / path-absolute
    ///               / path-noscheme
    ///               / path-empty
    /// ```
    fn parse3986_relative_ref<'a>(&mut self, mut s: &'a str) -> Option<&'a str> {
        if let Some(rem) = s.strip_prefix("//") {
            s = self.parse3986_authority(rem)?;
            if !s.is_empty() && !s.starts_with(['/', '?', '#']) {
                return None;
            }
        }
        s = self.parse3986_path(s, true)?;
        self.parse3986_tail(s)
    }
}

impl Display for XmlURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.save())
    }
}

/// Returns `true` if `uri` parses and has a scheme.
pub fn is_absolute(uri: &str) -> bool {
    XmlURI::parse(uri).is_some_and(|uri| uri.is_absolute())
}

/// Computes the target URI of `reference` against `base`,
/// following section 5.2 of RFC 3986.
///
/// Returns `None` if either string is not a URI reference.
pub fn build_uri(reference: &str, base: &str) -> Option<String> {
    let refe = XmlURI::parse(reference)?;
    if refe.scheme.is_some() {
        return Some(XmlURI {
            path: remove_dot_segments(&refe.path),
            ..refe
        }
        .save());
    }
    let bas = XmlURI::parse(base)?;

    let mut res = XmlURI {
        scheme: bas.scheme.clone(),
        fragment: refe.fragment.clone(),
        ..Default::default()
    };
    if refe.authority.is_some() {
        res.authority = refe.authority.clone();
        res.path = remove_dot_segments(&refe.path);
        res.query = refe.query.clone();
    } else {
        res.authority = bas.authority.clone();
        if refe.path.is_empty() {
            res.path = bas.path.clone();
            res.query = refe.query.clone().or_else(|| bas.query.clone());
        } else {
            if refe.path.starts_with('/') {
                res.path = remove_dot_segments(&refe.path);
            } else {
                res.path = remove_dot_segments(&merge_paths(&bas, &refe.path));
            }
            res.query = refe.query.clone();
        }
    }
    Some(res.save())
}

/// Best-effort resolution: falls back to the unresolved `reference`.
pub fn resolve(base: &str, reference: &str) -> String {
    if base.is_empty() {
        return reference.to_owned();
    }
    build_uri(reference, base).unwrap_or_else(|| reference.to_owned())
}

// 5.2.3. Merge Paths
fn merge_paths(base: &XmlURI, reference: &str) -> String {
    if base.authority.is_some() && base.path.is_empty() {
        return format!("/{reference}");
    }
    match base.path.rfind('/') {
        Some(pos) => format!("{}{reference}", &base.path[..=pos]),
        None => reference.to_owned(),
    }
}

/// 5.2.4. Remove Dot Segments
///
/// Relative paths keep leading `..` segments that cannot be removed.
pub fn remove_dot_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut output: Vec<&str> = vec![];
    let mut segments = path.split('/').peekable();
    if absolute {
        segments.next();
    }
    let mut trailing_slash = false;
    while let Some(seg) = segments.next() {
        let last = segments.peek().is_none();
        match seg {
            "." => trailing_slash = last,
            ".." => {
                if output.last().is_some_and(|&s| s != "..") {
                    output.pop();
                } else if !absolute {
                    output.push("..");
                }
                trailing_slash = last;
            }
            seg => {
                output.push(seg);
                trailing_slash = false;
            }
        }
    }
    let mut ret = String::with_capacity(path.len());
    if absolute {
        ret.push('/');
    }
    ret.push_str(&output.join("/"));
    if trailing_slash && !ret.is_empty() && !ret.ends_with('/') {
        ret.push('/');
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_components() {
        let uri = XmlURI::parse("http://user@example.com:8080/a/b?q=1#frag").unwrap();
        assert_eq!(uri.scheme(), Some("http"));
        assert_eq!(uri.authority(), Some("user@example.com:8080"));
        assert_eq!(uri.path(), "/a/b");
        assert_eq!(uri.query(), Some("q=1"));
        assert_eq!(uri.fragment(), Some("frag"));
        assert_eq!(uri.save(), "http://user@example.com:8080/a/b?q=1#frag");

        let uri = XmlURI::parse("urn:isbn:0451450523").unwrap();
        assert!(uri.is_opaque());
        let uri = XmlURI::parse("../a").unwrap();
        assert!(!uri.is_absolute());
        assert_eq!(uri.path(), "../a");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(XmlURI::parse("a b").is_none());
        assert!(XmlURI::parse("%4").is_none());
        assert!(XmlURI::parse("http://[::1").is_none());
        assert!(XmlURI::parse("a#b#c").is_none());
        assert!(XmlURI::parse("http://ex ample.com/").is_none());
    }

    #[test]
    fn test_resolve_rfc3986_examples() {
        let base = "http://a/b/c/d;p?q";
        let cases = [
            ("g:h", "g:h"),
            ("g", "http://a/b/c/g"),
            ("./g", "http://a/b/c/g"),
            ("g/", "http://a/b/c/g/"),
            ("/g", "http://a/g"),
            ("//g", "http://g"),
            ("?y", "http://a/b/c/d;p?y"),
            ("g?y", "http://a/b/c/g?y"),
            ("#s", "http://a/b/c/d;p?q#s"),
            ("g#s", "http://a/b/c/g#s"),
            (";x", "http://a/b/c/;x"),
            ("", "http://a/b/c/d;p?q"),
            (".", "http://a/b/c/"),
            ("./", "http://a/b/c/"),
            ("..", "http://a/b/"),
            ("../", "http://a/b/"),
            ("../g", "http://a/b/g"),
            ("../..", "http://a/"),
            ("../../g", "http://a/g"),
            ("../../../g", "http://a/g"),
            ("/./g", "http://a/g"),
            ("g.", "http://a/b/c/g."),
            ("g/../h", "http://a/b/c/h"),
        ];
        for (reference, expected) in cases {
            assert_eq!(resolve(base, reference), expected, "{reference}");
        }
    }

    #[test]
    fn test_resolve_falls_back() {
        assert_eq!(resolve("", "a/b"), "a/b");
        assert_eq!(resolve("http://a/", "a b"), "a b");
        assert_eq!(resolve("dir/file.xml", "other.xml"), "dir/other.xml");
    }

    #[test]
    fn test_remove_dot_segments() {
        assert_eq!(remove_dot_segments("/a/b/c/./../../g"), "/a/g");
        assert_eq!(remove_dot_segments("mid/content=5/../6"), "mid/6");
        assert_eq!(remove_dot_segments("../a"), "../a");
        assert_eq!(remove_dot_segments("/.."), "/");
    }
}
