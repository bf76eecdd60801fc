//! Query syntax tree.
//!
//! Nodes own their children outright, so `Clone` is a deep copy. The
//! `Display` form is itself valid query text: reparsing it yields a tree
//! that selects the same posts (wrapped in one more group).

use std::fmt;

use crate::lexer::{SYMBOL_CLOSE, SYMBOL_LESS, SYMBOL_OPEN, SYMBOL_OR};

pub const DIRECTIVE_BASELINE: &str = "baseline:";
pub const DIRECTIVE_REGEX: &str = "regex:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Condition(Condition),
    Negation(Box<Node>),
    Word(String),
}

/// `(and[0] ∧ and[1] ∧ …) ∧ (or[0] ∨ or[1] ∨ …)`. An empty condition
/// matches every post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    pub and: Vec<Node>,
    pub or: Vec<Node>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty()
    }
}

/// What a word asks for once its prefix is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Tag(&'a str),
    Baseline(&'a str),
    Regex(&'a str),
}

impl Node {
    pub fn word(word: impl Into<String>) -> Self {
        Node::Word(word.into())
    }

    pub fn negate(node: Node) -> Self {
        Node::Negation(Box::new(node))
    }
}

pub fn directive(word: &str) -> Directive<'_> {
    if let Some(name) = word.strip_prefix(DIRECTIVE_BASELINE) {
        Directive::Baseline(name)
    } else if let Some(pattern) = word.strip_prefix(DIRECTIVE_REGEX) {
        Directive::Regex(pattern)
    } else {
        Directive::Tag(word)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SYMBOL_OPEN}")?;
        for term in &self.and {
            write!(f, " {term}")?;
        }
        for term in &self.or {
            write!(f, " {SYMBOL_OR}{term}")?;
        }
        write!(f, " {SYMBOL_CLOSE}")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Condition(condition) => condition.fmt(f),
            Node::Negation(inner) => write!(f, "{SYMBOL_LESS}{inner}"),
            Node::Word(word) => write!(f, "{word}"),
        }
    }
}
