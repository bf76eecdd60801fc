//! Lowering of query trees into post streams.

use regex::Regex;
use tracing::warn;

use crate::ast::{Condition, Directive, Node, directive};
use crate::baseline::Baselines;
use crate::cancel::CancelToken;
use crate::compose::{complement, intersection, union};
use crate::error::{Result, TagbooruError};
use crate::index::{IndexCache, IndexKey};
use crate::lexer::{SYMBOL_OR, is_single_word};
use crate::parse::parse;
use crate::stream::PostStream;

/// How many `baseline:`/`regex:` expansions may nest inside each other.
pub const MAX_EXPANSION_DEPTH: usize = 16;

/// A `regex:` matching more tags than this is served by one merging stage
/// instead of a stage per tag.
pub const MAX_EXPANSION_STAGES: usize = 64;

pub struct Evaluator<'a> {
    cache: &'a IndexCache,
    baselines: &'a dyn Baselines,
}

impl<'a> Evaluator<'a> {
    pub fn new(cache: &'a IndexCache, baselines: &'a dyn Baselines) -> Self {
        Self { cache, baselines }
    }

    /// Parse and lower `query`. Only errors in `query` itself and
    /// `regex:` patterns matching no tag are returned; every other failure
    /// surfaces through the token's failure scope while streaming.
    pub fn stream(&self, token: &CancelToken, query: &str) -> Result<PostStream> {
        self.expand(token, query, 0)
    }

    fn expand(&self, token: &CancelToken, query: &str, depth: usize) -> Result<PostStream> {
        let root = parse(query)?;
        self.lower(token, &root, depth)
    }

    pub fn lower(&self, token: &CancelToken, node: &Node, depth: usize) -> Result<PostStream> {
        match node {
            Node::Condition(condition) => self.lower_condition(token, condition, depth),
            Node::Negation(inner) => {
                let subset = self.lower(token, inner, depth)?;
                Ok(complement(token, subset, self.every_post(token)))
            }
            Node::Word(word) => match directive(word) {
                Directive::Tag(tag) => Ok(self.cache.stream_for(token, IndexKey::tag(tag))),
                Directive::Baseline(name) => Ok(self.baseline(token, name, depth)),
                Directive::Regex(pattern) => self.regex(token, pattern, depth),
            },
        }
    }

    fn every_post(&self, token: &CancelToken) -> PostStream {
        self.cache.stream_for(token, IndexKey::All)
    }

    fn lower_condition(
        &self,
        token: &CancelToken,
        condition: &Condition,
        depth: usize,
    ) -> Result<PostStream> {
        if condition.is_empty() {
            return Ok(self.every_post(token));
        }
        let mut operands = condition
            .and
            .iter()
            .map(|node| self.lower(token, node, depth))
            .collect::<Result<Vec<_>>>()?;
        if !condition.or.is_empty() {
            let alternatives = condition
                .or
                .iter()
                .map(|node| self.lower(token, node, depth))
                .collect::<Result<Vec<_>>>()?;
            operands.push(union(token, alternatives));
        }
        Ok(intersection(token, operands))
    }

    /// Any failure to read or parse the stored query is logged and the
    /// directive matches nothing.
    fn baseline(&self, token: &CancelToken, name: &str, depth: usize) -> PostStream {
        if depth >= MAX_EXPANSION_DEPTH {
            warn!(baseline = name, depth, "expansion too deep, matching nothing");
            return PostStream::empty();
        }
        let expanded = self
            .baselines
            .read(name)
            .and_then(|query| self.expand(token, &query, depth + 1));
        match expanded {
            Ok(stream) => stream,
            Err(e) => {
                warn!(baseline = name, error = %e, "baseline failed, matching nothing");
                PostStream::empty()
            }
        }
    }

    /// ORs together every known tag matching `pattern`. A pattern that
    /// matches no tag is an error; compile and I/O failures match nothing.
    fn regex(&self, token: &CancelToken, pattern: &str, depth: usize) -> Result<PostStream> {
        if depth >= MAX_EXPANSION_DEPTH {
            warn!(pattern, depth, "expansion too deep, matching nothing");
            return Ok(PostStream::empty());
        }
        let tags = Regex::new(pattern)
            .map_err(TagbooruError::from)
            .and_then(|regex| self.cache.matching_tag_names(token, &regex));
        let tags = match tags {
            Ok(tags) => tags,
            Err(TagbooruError::Cancelled) => return Ok(PostStream::empty()),
            Err(e) => {
                warn!(pattern, error = %e, "regex failed, matching nothing");
                return Ok(PostStream::empty());
            }
        };
        if tags.is_empty() {
            return Err(TagbooruError::PatternNoMatch(pattern.to_string()));
        }
        if tags.len() > MAX_EXPANSION_STAGES {
            return Ok(self.cache.stream_for_any(token, tags));
        }
        // names that would not lex back as one word are read directly
        let (words, literal): (Vec<String>, Vec<String>) =
            tags.into_iter().partition(|tag| is_single_word(tag));
        let mut alternatives: Vec<PostStream> = literal
            .into_iter()
            .map(|tag| self.cache.stream_for(token, IndexKey::tag(tag)))
            .collect();
        if !words.is_empty() {
            let query: String = words
                .iter()
                .map(|tag| format!("{SYMBOL_OR}{tag} "))
                .collect();
            match self.expand(token, &query, depth + 1) {
                Ok(stream) => alternatives.push(stream),
                Err(e @ TagbooruError::PatternNoMatch(_)) => return Err(e),
                Err(e) => {
                    warn!(pattern, error = %e, "regex expansion failed, matching nothing");
                    return Ok(PostStream::empty());
                }
            }
        }
        Ok(union(token, alternatives))
    }
}
