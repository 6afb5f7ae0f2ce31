use std::fmt::Display;

use binspect_schema::SpecError;

/// An error raised while building or querying a data tree
///
/// The kinds are deliberately coarse and user-visible: data errors mean the
/// bytes do not match the schema; range, type and reference errors mean the
/// query asked something the (valid) tree cannot answer. Each carries the
/// canonical path of the offending node when one exists.
#[derive(Debug)]
pub enum Error {
    /// Query text itself failed to compile
    Spec(SpecError),
    /// Bytes inconsistent with the schema
    Data {
        /// Path of the node being materialized
        path: String,
        /// What went wrong
        message: String,
    },
    /// A nonexistent path on a valid tree: missing field or index out of bounds
    Range {
        /// Path of the node the query was made on
        path: String,
        /// What was asked for
        message: String,
    },
    /// An operation applied to the wrong kind of node
    Type {
        /// Path of the node the operation was applied to
        path: String,
        /// What was attempted
        message: String,
    },
    /// An identifier that resolves to nothing in scope
    Reference {
        /// The unresolvable name
        name: String,
    },
}

/// Coarse classification of an [`Error`], for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Spec`]
    Spec,
    /// See [`Error::Data`]
    Data,
    /// See [`Error::Range`]
    Range,
    /// See [`Error::Type`]
    Type,
    /// See [`Error::Reference`]
    Reference,
}

impl Error {
    pub(crate) fn data(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Data {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn range(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Range {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn type_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Type {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn reference(name: impl Into<String>) -> Self {
        Error::Reference { name: name.into() }
    }

    /// Which of the five user-visible kinds this error is
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Spec(_) => ErrorKind::Spec,
            Error::Data { .. } => ErrorKind::Data,
            Error::Range { .. } => ErrorKind::Range,
            Error::Type { .. } => ErrorKind::Type,
            Error::Reference { .. } => ErrorKind::Reference,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let at = |f: &mut std::fmt::Formatter<'_>, path: &str| {
            if path.is_empty() {
                Ok(())
            } else {
                write!(f, " at \"{path}\"")
            }
        };
        match self {
            Error::Spec(e) => write!(f, "{e}"),
            Error::Data { path, message } => {
                write!(f, "data error: {message}")?;
                at(f, path)
            }
            Error::Range { path, message } => {
                write!(f, "range error: {message}")?;
                at(f, path)
            }
            Error::Type { path, message } => {
                write!(f, "type error: {message}")?;
                at(f, path)
            }
            Error::Reference { name } => {
                write!(f, "reference to undefined name \"{name}\"")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<SpecError> for Error {
    fn from(e: SpecError) -> Self {
        Error::Spec(e)
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
