//! Pattern Compiler: phrase definition → compiled matcher
//!
//! One place decides what "whole word" means for every rule in the system:
//! a match may not be preceded or followed by a letter, digit or underscore.
//! Literal and token phrases get that boundary; regex phrases are used as
//! written.
//!
//! # Usage
//! ```rust,ignore
//! let p = compile("cat", MatchKind::Literal, false)?;
//! assert!(p.is_match("a cat!")?);
//! assert!(!p.is_match("concatenate")?);
//! ```

pub mod token;

pub use token::contains_tokens;

use crate::error::{CompileError, PatternError};
use fancy_regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const BOUNDARY_BEFORE: &str = r"(?<![\p{L}\p{N}_])";
const BOUNDARY_AFTER: &str = r"(?![\p{L}\p{N}_])";

/// Cap on backtracking steps per match attempt for user-supplied patterns.
const BACKTRACK_LIMIT: usize = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Literal,
    Regex,
    Token,
}

impl MatchKind {
    /// Kind of a stored phrase: the regex flag wins, then placeholder syntax.
    pub fn classify(phrase: &str, regex: bool) -> Self {
        if regex {
            Self::Regex
        } else if contains_tokens(phrase) {
            Self::Token
        } else {
            Self::Literal
        }
    }
}

/// A match span in byte offsets of the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A compiled phrase.
#[derive(Debug, Clone)]
pub enum Pattern {
    Compiled(Regex),
    /// Never matches (token phrase without a body)
    Inert,
}

impl Pattern {
    pub fn find(&self, text: &str) -> Result<Option<Span>, PatternError> {
        match self {
            Pattern::Compiled(re) => re
                .find(text)
                .map(|m| m.map(|m| Span { start: m.start(), end: m.end() }))
                .map_err(|e| PatternError(e.to_string())),
            Pattern::Inert => Ok(None),
        }
    }

    /// Every match, leftmost first, non-overlapping.
    pub fn find_all(&self, text: &str) -> Result<Vec<Span>, PatternError> {
        match self {
            Pattern::Compiled(re) => {
                let mut out = Vec::new();
                for m in re.find_iter(text) {
                    let m = m.map_err(|e| PatternError(e.to_string()))?;
                    out.push(Span { start: m.start(), end: m.end() });
                }
                Ok(out)
            }
            Pattern::Inert => Ok(Vec::new()),
        }
    }

    pub fn is_match(&self, text: &str) -> Result<bool, PatternError> {
        match self {
            Pattern::Compiled(re) => re.is_match(text).map_err(|e| PatternError(e.to_string())),
            Pattern::Inert => Ok(false),
        }
    }

    pub fn is_inert(&self) -> bool {
        matches!(self, Pattern::Inert)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Compiled(re) => re.as_str(),
            Pattern::Inert => "",
        }
    }
}

fn build(source: &str) -> Result<Regex, CompileError> {
    RegexBuilder::new(source)
        .backtrack_limit(BACKTRACK_LIMIT)
        .build()
        .map_err(|e| CompileError::InvalidRegex { pattern: source.to_string(), reason: e.to_string() })
}

fn with_flags(body: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        body.to_string()
    } else {
        format!("(?i){}", body)
    }
}

fn bounded(body: &str) -> String {
    format!("{}(?:{}){}", BOUNDARY_BEFORE, body, BOUNDARY_AFTER)
}

/// Compile a phrase into a pattern.
///
/// - regex: the phrase is the pattern body, rejected if the engine rejects it
/// - literal: escaped and wrapped in word boundaries
/// - token: placeholders expanded, wrapped in word boundaries; a phrase that
///   leaves no body compiles to [`Pattern::Inert`]
pub fn compile(phrase: &str, kind: MatchKind, case_sensitive: bool) -> Result<Pattern, CompileError> {
    if phrase.is_empty() {
        return Err(CompileError::EmptyPhrase);
    }
    let source = match kind {
        MatchKind::Regex => with_flags(phrase, case_sensitive),
        MatchKind::Literal => with_flags(&bounded(&fancy_regex::escape(phrase)), case_sensitive),
        MatchKind::Token => match token::compile_token_body(phrase) {
            Some(body) => with_flags(&bounded(&body), case_sensitive),
            None => return Ok(Pattern::Inert),
        },
    };
    let re = build(&source)?;
    if kind == MatchKind::Regex {
        // dry run: patterns that blow the backtrack limit on trivial input are useless
        re.is_match("").map_err(|e| CompileError::InvalidRegex { pattern: phrase.to_string(), reason: e.to_string() })?;
    }
    Ok(Pattern::Compiled(re))
}

/// Compile with the kind inferred from the stored flags.
pub fn compile_phrase(phrase: &str, regex: bool, case_sensitive: bool) -> Result<Pattern, CompileError> {
    compile(phrase, MatchKind::classify(phrase, regex), case_sensitive)
}
