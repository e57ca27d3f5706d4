//! S-expression payload parser and generator
//!
//! Every Hive payload is one parenthesized list whose first element is the
//! command symbol and whose remaining elements are the arguments, each a
//! bare symbol or a nested list. [`parse`] and [`generate`] are exact
//! inverses for any well-formed payload, which the announcement round-trip
//! tests rely on.
//!
//! Symbols are any run of characters excluding whitespace and parentheses,
//! so topic paths (`ns/host/1234`), protocols (`hive/test:0`) and tags
//! (`key=value`) all pass through untouched. There is no quoting or escape
//! mechanism; the grammar is deliberately as small as the wire needs.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for parsing operations
pub type ParseResult<T> = CodecResult<T>;

/// One element of a payload list: a bare symbol or a nested list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Symbol(String),
    List(Vec<Term>),
}

impl Term {
    /// Convenience constructor for a symbol term
    pub fn symbol(s: impl Into<String>) -> Self {
        Term::Symbol(s.into())
    }

    /// Convenience constructor for a list term
    pub fn list(items: impl Into<Vec<Term>>) -> Self {
        Term::List(items.into())
    }

    /// The symbol text, if this term is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Term::Symbol(s) => Some(s.as_str()),
            Term::List(_) => None,
        }
    }

    /// The list items, if this term is a list
    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::Symbol(_) => None,
            Term::List(items) => Some(items.as_slice()),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Symbol(s) => f.write_str(s),
            Term::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parse a payload into its command symbol and argument terms
///
/// The payload must be exactly one top-level list with a leading symbol:
/// `(primary started ns/service/registrar 12345)` parses to
/// `("primary", [started, ns/service/registrar, 12345])`. Anything else
/// is a [`CodecError`]; callers treat malformed protocol traffic as
/// ignorable, so no partial result is ever returned.
pub fn parse(payload: &str) -> ParseResult<(String, Vec<Term>)> {
    let mut cursor = Cursor::new(payload);
    cursor.skip_whitespace();

    match cursor.peek() {
        None => return Err(CodecError::Empty),
        Some('(') => {}
        Some(other) => return Err(CodecError::expected_list(cursor.offset(), other)),
    }

    let mut items = cursor.parse_list()?;
    cursor.skip_whitespace();
    if let Some(extra) = cursor.peek() {
        return Err(CodecError::trailing_input(
            cursor.offset(),
            extra.to_string(),
        ));
    }

    if items.is_empty() {
        return Err(CodecError::MissingCommand);
    }
    let command = match items.remove(0) {
        Term::Symbol(s) => s,
        Term::List(_) => return Err(CodecError::CommandNotSymbol),
    };
    Ok((command, items))
}

/// Serialize a command and arguments back into payload text
///
/// Exact inverse of [`parse`] for well-formed input.
pub fn generate(command: &str, arguments: &[Term]) -> String {
    let mut out = String::with_capacity(2 + command.len() + 8 * arguments.len());
    out.push('(');
    out.push_str(command);
    for argument in arguments {
        out.push(' ');
        out.push_str(&argument.to_string());
    }
    out.push(')');
    out
}

/// Character cursor over the payload text
struct Cursor<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Parse a list body; the cursor is positioned on the opening '('
    fn parse_list(&mut self) -> ParseResult<Vec<Term>> {
        let open = self.offset();
        self.advance(); // consume '('

        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(CodecError::UnterminatedList { open }),
                Some(')') => {
                    self.advance();
                    return Ok(items);
                }
                Some('(') => items.push(Term::List(self.parse_list()?)),
                Some(_) => items.push(Term::Symbol(self.parse_symbol())),
            }
        }
    }

    fn parse_symbol(&mut self) -> String {
        let start = self.offset();
        while matches!(self.peek(), Some(c) if !c.is_whitespace() && c != '(' && c != ')') {
            self.advance();
        }
        self.input[start..self.offset()].to_string()
    }
}
