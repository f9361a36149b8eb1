//! Error types shared across the crate.
//!
//! Every failure here is recoverable: rule compilation errors drop a rule,
//! store errors degrade to an empty index, and rewrite errors are mapped to
//! "return the original content" at the render boundary.

use thiserror::Error;

/// A phrase could not be turned into a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("phrase is empty")]
    EmptyPhrase,
    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// The regex engine gave up while matching (backtrack limit and friends).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pattern evaluation failed: {0}")]
pub struct PatternError(pub String);

/// Markup the parser could only read by repairing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed markup: {0}")]
    Malformed(String),
}

/// Persistent store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to (de)serialize `{key}`: {reason}")]
    Serde { key: String, reason: String },
    #[error("unsupported rule record version {0}")]
    UnsupportedVersion(u32),
}

/// Anything that aborts a single rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An import payload that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("import payload must be a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Store(#[from] StoreError),
}
