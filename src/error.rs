use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parser::{Location, Span};

/// Result type for jfront operations
pub type Result<T> = std::result::Result<T, Error>;

/// Diagnostic categories surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lexical,
    Grammar,
    ClassNotFound,
    FieldNotFound,
    MethodNotFound,
    SymbolNotFound,
    TypeError,
    CyclicDependency,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Lexical => "lexical error",
            ErrorKind::Grammar => "syntax error",
            ErrorKind::ClassNotFound => "class not found",
            ErrorKind::FieldNotFound => "field not found",
            ErrorKind::MethodNotFound => "method not found",
            ErrorKind::SymbolNotFound => "cannot find symbol",
            ErrorKind::TypeError => "type error",
            ErrorKind::CyclicDependency => "cyclic dependency",
            ErrorKind::Internal => "internal compiler error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located compiler diagnostic, optionally caused by a failure in a dependency
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<PathBuf>,
    pub location: Option<Location>,
    pub cause: Option<Box<SyntaxError>>,
}

impl SyntaxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            location: None,
            cause: None,
        }
    }

    /// The innermost error of the causal chain
    pub fn root_cause(&self) -> &SyntaxError {
        let mut current = self;
        while let Some(cause) = current.cause.as_deref() {
            current = cause;
        }
        current
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file.display())?;
        }
        if let Some(location) = &self.location {
            write!(f, "{}:", location)?;
        }
        if self.file.is_some() || self.location.is_some() {
            f.write_str(" ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, "\n  caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyntaxError {}

/// Error types for the jfront compiler
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Syntax(SyntaxError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Malformed class file {path}: {source}")]
    ClassFormat {
        path: PathBuf,
        #[source]
        source: crate::common::classfile::ClassFormatError,
    },
}

impl Error {
    pub fn syntax(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Syntax(SyntaxError::new(kind, message))
    }

    pub fn lexical(message: impl Into<String>, location: Location) -> Self {
        let mut err = SyntaxError::new(ErrorKind::Lexical, message);
        err.location = Some(location);
        Self::Syntax(err)
    }

    pub fn grammar(message: impl Into<String>, location: Location) -> Self {
        let mut err = SyntaxError::new(ErrorKind::Grammar, message);
        err.location = Some(location);
        Self::Syntax(err)
    }

    pub fn class_not_found(name: impl fmt::Display) -> Self {
        Self::syntax(ErrorKind::ClassNotFound, format!("cannot find class '{}'", name))
    }

    pub fn field_not_found(name: &str, owner: impl fmt::Display) -> Self {
        Self::syntax(
            ErrorKind::FieldNotFound,
            format!("cannot find field '{}' in '{}'", name, owner),
        )
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::syntax(ErrorKind::MethodNotFound, message)
    }

    pub fn symbol_not_found(name: &str) -> Self {
        Self::syntax(ErrorKind::SymbolNotFound, format!("cannot find symbol '{}'", name))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::syntax(ErrorKind::TypeError, message)
    }

    pub fn cyclic(message: impl Into<String>) -> Self {
        Self::syntax(ErrorKind::CyclicDependency, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::syntax(ErrorKind::Internal, message)
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Diagnostic category, if this is a compiler diagnostic
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Syntax(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn as_syntax(&self) -> Option<&SyntaxError> {
        match self {
            Error::Syntax(err) => Some(err),
            _ => None,
        }
    }

    /// Wrap a failure raised while compiling `dependency` on behalf of another unit
    pub fn in_dependency(self, dependency: impl fmt::Display) -> Self {
        match self {
            Error::Syntax(inner) => {
                let mut outer = SyntaxError::new(
                    inner.kind,
                    format!("while compiling dependency '{}': {}", dependency, inner.message),
                );
                outer.cause = Some(Box::new(inner));
                Error::Syntax(outer)
            }
            other => other,
        }
    }

    fn with_location(mut self, location: Location) -> Self {
        if let Error::Syntax(err) = &mut self {
            if err.location.is_none() && !location.is_synthetic() {
                err.location = Some(location);
            }
        }
        self
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        if let Error::Syntax(err) = &mut self {
            if err.file.is_none() {
                err.file = Some(file.to_path_buf());
            }
        }
        self
    }
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Error::Syntax(err)
    }
}

/// Attach position information to errors that do not carry any yet
pub trait ResultExt<T> {
    fn at(self, span: Span) -> Result<T>;
    fn in_file(self, file: &Path) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn at(self, span: Span) -> Result<T> {
        self.map_err(|e| e.with_location(span.start))
    }

    fn in_file(self, file: &Path) -> Result<T> {
        self.map_err(|e| e.with_file(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_attached_only_once() {
        let first = Span::single(Location::new(3, 7, 40));
        let second = Span::single(Location::new(9, 1, 90));
        let err: Result<()> = Err(Error::symbol_not_found("x"));
        let err = err.at(first).at(second).unwrap_err();
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.location, Some(first.start));
        assert_eq!(syntax.kind, ErrorKind::SymbolNotFound);
    }

    #[test]
    fn test_dependency_chain_display() {
        let mut inner = SyntaxError::new(ErrorKind::TypeError, "bad operand");
        inner.file = Some(PathBuf::from("b/B.java"));
        inner.location = Some(Location::new(2, 5, 0));
        let err = Error::from(inner)
            .in_dependency("b.B")
            .with_file(Path::new("a/A.java"))
            .with_location(Location::new(4, 9, 0));
        let text = err.to_string();
        assert!(text.starts_with("a/A.java:4:9: type error: while compiling dependency 'b.B'"), "{text}");
        assert!(text.contains("caused by: b/B.java:2:5: type error: bad operand"), "{text}");
        assert_eq!(err.as_syntax().unwrap().root_cause().message, "bad operand");
    }
}
