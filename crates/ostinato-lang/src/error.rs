//! Error types for ostinato-lang.

use std::path::PathBuf;
use thiserror::Error;

/// What made a source unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Generic,
    UnknownSection,
    ImportNotFound,
    ImportTooDeep,
}

/// A structured diagnostic pointing into a source file. Lines are 1-based.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub file: Option<PathBuf>,
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}: {}", file.display(), self.line, self.message),
            None => write!(f, "{}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            kind: ParseErrorKind::Generic,
            file: None,
            line,
            message: message.into(),
        }
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Error type for source loading.
#[derive(Error, Debug)]
pub enum LangError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl LangError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LangError::Io {
            path: path.into(),
            source,
        }
    }
}
