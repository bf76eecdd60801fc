//! Recursive-descent parser for the tag query language.
//!
//! ```text
//! query     := condition EOF
//! condition := term*
//! term      := "~"* (group | negation | WORD)
//! negation  := "-" (group | WORD)
//! group     := "((" condition "))"
//! ```
//!
//! A term preceded by `~` joins the condition's or-list, every other term
//! its and-list. Nested groups are parsed by the same parser, so the outer
//! condition resumes right after the group's `))`.

use crate::ast::{Condition, Node};
use crate::error::{Result, TagbooruError};
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse a whole query. The root is always a `Node::Condition`.
pub fn parse(query: &str) -> Result<Node> {
    Parser::new(query)?.parse()
}

pub struct Parser<'q> {
    lexer: Lexer<'q>,
    lookahead: Option<Token>,
}

impl<'q> Parser<'q> {
    pub fn new(query: &'q str) -> Result<Self> {
        Ok(Self {
            lexer: Lexer::new(query)?,
            lookahead: None,
        })
    }

    pub fn parse(mut self) -> Result<Node> {
        let root = self.parse_condition(TokenKind::Eof)?;
        Ok(Node::Condition(root))
    }

    fn next(&mut self) -> Token {
        self.lookahead
            .take()
            .unwrap_or_else(|| self.lexer.next_token())
    }

    fn peek(&mut self) -> &Token {
        let lexer = &mut self.lexer;
        self.lookahead.get_or_insert_with(|| lexer.next_token())
    }

    fn unexpected<T>(token: &Token, context: &'static str) -> Result<T> {
        Err(TagbooruError::Parse {
            token: token.to_string(),
            context,
            offset: token.offset,
        })
    }

    /// Terms up to and including `ender` (`Eof` for the query, `Close`
    /// for a group).
    fn parse_condition(&mut self, ender: TokenKind) -> Result<Condition> {
        let context = if ender == TokenKind::Eof { "query" } else { "clause" };
        let mut condition = Condition::default();
        let mut or_next = false;

        loop {
            let kind = self.peek().kind;
            if kind == ender {
                let token = self.next();
                if or_next {
                    return Self::unexpected(&token, "or-term, expected word or clause");
                }
                return Ok(condition);
            }

            let node = match kind {
                TokenKind::Or => {
                    self.next();
                    or_next = true;
                    continue;
                }
                TokenKind::Word => Node::Word(self.next().text),
                TokenKind::Open => {
                    self.next();
                    Node::Condition(self.parse_condition(TokenKind::Close)?)
                }
                TokenKind::Less => {
                    self.next();
                    self.parse_negation()?
                }
                TokenKind::Eof | TokenKind::Close => {
                    let token = self.next();
                    return Self::unexpected(&token, context);
                }
            };

            if or_next {
                condition.or.push(node);
                or_next = false;
            } else {
                condition.and.push(node);
            }
        }
    }

    fn parse_negation(&mut self) -> Result<Node> {
        let token = self.next();
        match token.kind {
            TokenKind::Word => Ok(Node::negate(Node::Word(token.text))),
            TokenKind::Open => Ok(Node::negate(Node::Condition(
                self.parse_condition(TokenKind::Close)?,
            ))),
            _ => Self::unexpected(&token, "negation, expected word or clause"),
        }
    }
}
