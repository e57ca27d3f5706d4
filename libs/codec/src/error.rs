//! Codec errors
//!
//! Error handling for s-expression parsing. Each variant carries the byte
//! offset where parsing stopped so a malformed payload can be diagnosed
//! from the log line alone. Parsing never panics on untrusted input.

use thiserror::Error;

/// Payload parsing errors with positional context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload was empty or all whitespace
    #[error("Empty payload: expected a (command …) list")]
    Empty,

    /// Payload did not start with an opening parenthesis
    #[error("Expected '(' at offset {offset}, got {found:?}")]
    ExpectedList { offset: usize, found: char },

    /// A list was opened but never closed
    #[error("Unterminated list: {open} unclosed '(' at end of payload")]
    UnterminatedList { open: usize },

    /// Input continued after the top-level list closed
    #[error("Trailing input at offset {offset}: {found:?}")]
    TrailingInput { offset: usize, found: String },

    /// The top-level list had no command symbol
    #[error("Missing command: first element of the payload list must be a symbol")]
    MissingCommand,

    /// The command position held a nested list instead of a symbol
    #[error("Invalid command: first element of the payload list is a list, not a symbol")]
    CommandNotSymbol,

    /// A tag was not of the `key=value` form
    #[error("Invalid tag {tag:?}: expected key=value")]
    InvalidTag { tag: String },
}

impl CodecError {
    pub fn expected_list(offset: usize, found: char) -> Self {
        Self::ExpectedList { offset, found }
    }

    pub fn trailing_input(offset: usize, found: impl Into<String>) -> Self {
        Self::TrailingInput {
            offset,
            found: found.into(),
        }
    }

    pub fn invalid_tag(tag: impl Into<String>) -> Self {
        Self::InvalidTag { tag: tag.into() }
    }
}

/// Result type alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
