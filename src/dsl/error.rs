//! Error types for the patch parser.

use thiserror::Error;

use super::parser::Rule;

/// Whether the text failed the grammar or a semantic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Semantic,
}

/// A parse failure with the 1-based line it was found on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub kind: ErrorKind,
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
            kind: ErrorKind::Syntax,
        }
    }

    pub fn semantic(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
            kind: ErrorKind::Semantic,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let line = match err.line_col {
            pest::error::LineColLocation::Pos((line, _)) => line,
            pest::error::LineColLocation::Span((line, _), _) => line,
        };
        ParseError::syntax(err.to_string(), line)
    }
}
