//! Lexer for the tag query language.
//!
//! Four symbols are recognised by literal prefix match before any word
//! scanning: `-` (negate), `~` (or), `((` (open group) and `))` (close
//! group). Everything else that is not whitespace is a word, which ends at
//! the next whitespace or at the next position where a symbol starts. The
//! token grammar lives in `query.pest`.

use std::fmt;

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pairs;
use pest_derive::Parser;

use crate::error::{Result, TagbooruError};

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryGrammar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Less,
    Or,
    Open,
    Close,
    Word,
    Eof,
}

pub const SYMBOL_LESS: &str = "-";
pub const SYMBOL_OR: &str = "~";
pub const SYMBOL_OPEN: &str = "((";
pub const SYMBOL_CLOSE: &str = "))";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the token in the query.
    pub offset: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Word => write!(f, "word `{}`", self.text),
            TokenKind::Eof => write!(f, "end of query"),
            _ => write!(f, "`{}`", self.text),
        }
    }
}

pub struct Lexer<'q> {
    pairs: Pairs<'q, Rule>,
    end: usize,
}

impl<'q> Lexer<'q> {
    pub fn new(input: &'q str) -> Result<Self> {
        let pairs = QueryGrammar::parse(Rule::tokens, input).map_err(|e| {
            let offset = match e.location {
                InputLocation::Pos(offset) => offset,
                InputLocation::Span((start, _)) => start,
            };
            TagbooruError::Parse {
                token: input.get(offset..).unwrap_or_default().to_string(),
                context: "query",
                offset,
            }
        })?;
        Ok(Self {
            pairs,
            end: input.len(),
        })
    }

    /// Next token. Once the input is exhausted this keeps returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        let Some(pair) = self.pairs.next() else {
            return Token {
                kind: TokenKind::Eof,
                text: String::new(),
                offset: self.end,
            };
        };
        let kind = match pair.as_rule() {
            Rule::less => TokenKind::Less,
            Rule::or => TokenKind::Or,
            Rule::open => TokenKind::Open,
            Rule::close => TokenKind::Close,
            Rule::word => TokenKind::Word,
            _ => TokenKind::Eof,
        };
        Token {
            kind,
            text: pair.as_str().to_string(),
            offset: pair.as_span().start(),
        }
    }
}

/// Whether `text` lexes back as exactly one word.
pub fn is_single_word(text: &str) -> bool {
    match Lexer::new(text) {
        Ok(mut lexer) => {
            let first = lexer.next_token();
            first.kind == TokenKind::Word
                && first.text == text
                && lexer.next_token().kind == TokenKind::Eof
        }
        Err(_) => false,
    }
}
