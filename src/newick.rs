//! Extended Newick reading and writing.
//!
//! The reader produces a flat list of raw nodes; reticulation occurrences
//! (`#H1` style tags) are kept per occurrence and merged later by
//! [`crate::model::Network`]. Branch lengths, support values and `[...]`
//! comments are validated and then discarded: only topology and leaf labels
//! matter to the engines.
//!
//! # Example
//! ```text
//! ((a,(b)#H1),(#H1,c));
//!
//!   occurrence 1 of H1: internal, child b
//!   occurrence 2 of H1: leaf, no children
//! ```

use crate::error::FormatError;
use std::borrow::Cow;

/// One node occurrence as written in the string.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawNode {
    pub label: Option<String>,
    pub tag: Option<String>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawTree {
    pub nodes: Vec<RawNode>,
    pub root: usize,
}

/// Parse a single `;`-terminated (extended) Newick string.
pub(crate) fn parse_raw(text: &str) -> Result<RawTree, FormatError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
        nodes: Vec::new(),
    };

    parser.skip_trivia()?;
    if parser.at_end() {
        return Err(FormatError::EmptyInput);
    }
    if parser.peek() == Some(';') {
        return Err(FormatError::NoLabelledLeaf);
    }

    let root = parser.subtree()?;
    parser.skip_trivia()?;
    match parser.peek() {
        Some(';') => parser.pos += 1,
        Some(')') => return Err(FormatError::UnbalancedBrackets(parser.pos)),
        Some(ch) => {
            return Err(FormatError::UnexpectedCharacter {
                ch,
                position: parser.pos,
            });
        }
        None => return Err(FormatError::MissingSemicolon),
    }

    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(FormatError::TrailingInput(parser.pos));
    }

    Ok(RawTree {
        nodes: parser.nodes,
        root,
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    nodes: Vec<RawNode>,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Skip whitespace and `[...]` comments.
    fn skip_trivia(&mut self) -> Result<(), FormatError> {
        loop {
            self.skip_whitespace();
            if self.peek() != Some('[') {
                return Ok(());
            }
            let start = self.pos;
            while self.peek().is_some_and(|c| c != ']') {
                self.pos += 1;
            }
            if self.at_end() {
                return Err(FormatError::UnterminatedComment(start));
            }
            self.pos += 1;
        }
    }

    fn subtree(&mut self) -> Result<usize, FormatError> {
        self.skip_trivia()?;
        let mut children = Vec::new();

        if self.peek() == Some('(') {
            let open = self.pos;
            self.pos += 1;
            loop {
                children.push(self.subtree()?);
                self.skip_trivia()?;
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(';') | None => return Err(FormatError::UnbalancedBrackets(open)),
                    Some(ch) => {
                        return Err(FormatError::UnexpectedCharacter {
                            ch,
                            position: self.pos,
                        });
                    }
                }
            }
        }

        let (label, tag) = self.name()?;
        self.branch_fields()?;

        let id = self.nodes.len();
        self.nodes.push(RawNode {
            label,
            tag,
            children,
        });
        Ok(id)
    }

    /// Read an optional node name, splitting off a reticulation tag.
    fn name(&mut self) -> Result<(Option<String>, Option<String>), FormatError> {
        self.skip_trivia()?;

        if self.peek() == Some('\'') {
            let start = self.pos;
            self.pos += 1;
            let mut label = String::new();
            loop {
                match self.peek() {
                    None => return Err(FormatError::UnterminatedQuote(start)),
                    Some('\'') if self.chars.get(self.pos + 1) == Some(&'\'') => {
                        label.push('\'');
                        self.pos += 2;
                    }
                    Some('\'') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => {
                        label.push(c);
                        self.pos += 1;
                    }
                }
            }
            // A quoted label may still carry an unquoted tag: 'a b'#H1
            let (_, tag) = self.unquoted_name()?;
            return Ok((non_empty(label), tag));
        }

        self.unquoted_name()
    }

    fn unquoted_name(&mut self) -> Result<(Option<String>, Option<String>), FormatError> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || "(),:;[]'".contains(c) {
                break;
            }
            raw.push(c);
            self.pos += 1;
        }

        match raw.split_once('#') {
            None => Ok((non_empty(raw), None)),
            Some((label, tag)) => {
                if tag.is_empty() {
                    return Err(FormatError::EmptyReticulationTag(raw.clone()));
                }
                Ok((non_empty(label.to_string()), Some(tag.to_string())))
            }
        }
    }

    /// Consume `:length[:support[:probability]]`, validating each non-empty field.
    fn branch_fields(&mut self) -> Result<(), FormatError> {
        self.skip_trivia()?;
        while self.peek() == Some(':') {
            self.pos += 1;
            self.skip_whitespace();
            let start = self.pos;
            let mut value = String::new();
            while let Some(c) = self.peek() {
                if c.is_whitespace() || "(),:;[".contains(c) {
                    break;
                }
                value.push(c);
                self.pos += 1;
            }
            if !value.is_empty() && value.parse::<f64>().is_err() {
                return Err(FormatError::InvalidBranchLength {
                    value,
                    position: start,
                });
            }
            self.skip_trivia()?;
        }
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Quote a label for Newick output when it contains structural characters.
pub fn quote_label(label: &str) -> Cow<'_, str> {
    let needs_quotes = label.is_empty()
        || label
            .chars()
            .any(|c| c.is_whitespace() || "(),:;[]'#".contains(c));
    if needs_quotes {
        Cow::Owned(format!("'{}'", label.replace('\'', "''")))
    } else {
        Cow::Borrowed(label)
    }
}

/// Split a text holding several `;`-terminated statements into statements.
///
/// Semicolons inside quotes or comments do not terminate a statement. A
/// trailing fragment without `;` is returned as-is so the caller can report it.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut in_comment = false;

    for c in text.chars() {
        current.push(c);
        match c {
            '\'' if !in_comment => in_quote = !in_quote,
            '[' if !in_quote => in_comment = true,
            ']' if !in_quote => in_comment = false,
            ';' if !in_quote && !in_comment => {
                out.push(std::mem::take(&mut current).trim().to_string());
            }
            _ => {}
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}
