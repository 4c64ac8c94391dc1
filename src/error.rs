//! Error types shared by the tree, the builder and the serializer.
//!
//! There are two families.
//! [`XmlError`] reports an attempt to break the well-formedness of a tree. It is raised
//! before anything is modified, so the tree is always left as it was.
//! [`ParsingError`] reports a broken input document and carries where it happened.

use std::{borrow::Cow, error::Error, fmt::Display};

/// A rejected tree operation.
///
/// Every variant is raised before the tree is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// A name is not a legal XML name, NCName or QName.
    IllegalName {
        name: String,
        reason: Cow<'static, str>,
    },
    /// Character data contains characters or substrings XML does not allow there.
    IllegalData {
        data: String,
        reason: Cow<'static, str>,
    },
    /// A processing instruction target is reserved or malformed.
    IllegalTarget {
        target: String,
        reason: Cow<'static, str>,
    },
    /// A URI reference does not match RFC 3986 syntax.
    MalformedUri {
        uri: String,
        reason: Cow<'static, str>,
    },
    /// A prefix would be bound to two URIs on the same element,
    /// or a reserved prefix/URI is misused.
    NamespaceConflict {
        prefix: String,
        uri: String,
        reason: Cow<'static, str>,
    },
    /// The node already has a parent.
    MultipleParent,
    /// The node would become its own ancestor.
    Cycle,
    /// A node of this kind cannot be placed here.
    IllegalAdd { reason: Cow<'static, str> },
    /// The node is not a child of the parent it was looked up in.
    NoSuchChild,
    /// The attribute does not belong to the element it was looked up in.
    NoSuchAttribute,
    /// The element already carries an attribute with the same expanded name.
    DuplicateAttribute { local_name: String, uri: String },
    /// A child position is outside of `0..=len`.
    IndexOutOfBounds { index: usize, len: usize },
    /// The operation would leave the document without exactly one root element.
    Wellformedness { reason: Cow<'static, str> },
}

impl XmlError {
    pub(crate) fn illegal_name(name: &str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalName {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_data(data: &str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalData {
            data: data.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn namespace_conflict(
        prefix: &str,
        uri: &str,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::NamespaceConflict {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_add(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalAdd {
            reason: reason.into(),
        }
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalName { name, reason } => write!(f, "illegal name '{name}': {reason}"),
            Self::IllegalData { data, reason } => write!(f, "illegal data '{data}': {reason}"),
            Self::IllegalTarget { target, reason } => {
                write!(f, "illegal processing instruction target '{target}': {reason}")
            }
            Self::MalformedUri { uri, reason } => write!(f, "malformed URI '{uri}': {reason}"),
            Self::NamespaceConflict {
                prefix,
                uri,
                reason,
            } => write!(f, "namespace conflict for prefix '{prefix}' ({uri}): {reason}"),
            Self::MultipleParent => write!(f, "the node already has a parent"),
            Self::Cycle => write!(f, "cannot add a node to itself or to one of its descendants"),
            Self::IllegalAdd { reason } => write!(f, "illegal add: {reason}"),
            Self::NoSuchChild => write!(f, "the node is not a child of this parent"),
            Self::NoSuchAttribute => write!(f, "the attribute is not attached to this element"),
            Self::DuplicateAttribute { local_name, uri } => {
                write!(f, "an attribute {{{uri}}}{local_name} already exists")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "position {index} is out of range 0..={len}")
            }
            Self::Wellformedness { reason } => write!(f, "not well-formed: {reason}"),
        }
    }
}

impl Error for XmlError {}

/// Returned by [`ParsingError::init_cause`] when the cause was already set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CauseAlreadySet;

impl Display for CauseAlreadySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the cause of this error can only be set once")
    }
}

impl Error for CauseAlreadySet {}

/// A malformed input document, or a failure while reading it.
#[derive(Debug)]
pub struct ParsingError {
    message: String,
    system_id: Option<String>,
    /// 1-based, 0 if unknown.
    line: usize,
    /// 1-based, 0 if unknown.
    column: usize,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ParsingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            system_id: None,
            line: 0,
            column: 0,
            cause: None,
        }
    }

    pub fn with_location(
        message: impl Into<String>,
        system_id: Option<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            message: message.into(),
            system_id,
            line,
            column,
            cause: None,
        }
    }

    /// This error with `cause` attached. Only for errors that have no cause yet.
    pub(crate) fn with_cause(
        mut self,
        cause: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn line_number(&self) -> usize {
        self.line
    }

    pub fn column_number(&self) -> usize {
        self.column
    }

    /// Attach the underlying cause.
    ///
    /// The cause can be set only once.
    /// Because `cause` is moved in, an error can never become its own cause.
    pub fn init_cause(
        &mut self,
        cause: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Result<(), CauseAlreadySet> {
        if self.cause.is_some() {
            return Err(CauseAlreadySet);
        }
        self.cause = Some(cause.into());
        Ok(())
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(system_id) = self.system_id.as_deref() {
            write!(f, "{system_id}:")?;
        }
        if self.line > 0 {
            write!(f, "{}:{}: ", self.line, self.column)?;
        }
        write!(f, "{}", self.message)
    }
}

impl Error for ParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

impl From<XmlError> for ParsingError {
    fn from(value: XmlError) -> Self {
        ParsingError::new(value.to_string()).with_cause(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_is_single_assignment() {
        let mut err = ParsingError::new("broken");
        assert!(err.init_cause(XmlError::Cycle).is_ok());
        assert_eq!(
            err.init_cause(XmlError::MultipleParent),
            Err(CauseAlreadySet)
        );
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), XmlError::Cycle.to_string());
    }

    #[test]
    fn test_parsing_error_display() {
        let err = ParsingError::with_location("unexpected EOF", Some("a.xml".into()), 3, 7);
        assert_eq!(err.to_string(), "a.xml:3:7: unexpected EOF");
        assert_eq!(err.line_number(), 3);
        assert_eq!(err.column_number(), 7);
        let err = ParsingError::new("no root");
        assert_eq!(err.to_string(), "no root");
    }

    #[test]
    fn test_from_xml_error_keeps_cause() {
        let err: ParsingError = XmlError::illegal_name("1a", "bad start").into();
        assert!(err.cause().is_some());
        assert!(err.message().contains("1a"));
    }

    #[test]
    fn test_with_cause_then_init_cause() {
        let mut err = ParsingError::new("broken").with_cause(XmlError::Cycle);
        assert_eq!(err.init_cause(XmlError::Cycle), Err(CauseAlreadySet));
        assert!(matches!(
            err.cause().and_then(|cause| cause.downcast_ref::<XmlError>()),
            Some(XmlError::Cycle)
        ));
    }
}
