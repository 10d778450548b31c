//! Errors raised while building, mutating, streaming, or persisting a chain.
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("the node already contains this attribute: {0}")]
    DuplicateAttribute(String),
    #[error("{node} nodes cannot hold {attribute} attributes")]
    IncompatibleAttribute {
        node: &'static str,
        attribute: &'static str,
    },
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("misplaced node: {0}")]
    MisplacedNode(String),
    #[error("file unavailable: {}: {reason}", path.display())]
    FileUnavailable { path: PathBuf, reason: String },
    #[error("stream interrupted while reading {}: {reason}", path.display())]
    StreamInterrupted { path: PathBuf, reason: String },
    #[error("word counts are still being calculated")]
    StillCalculating,
    #[error("invalid chain file: {0}")]
    InvalidPersistedChain(String),
    #[error("{context}: {reason}")]
    Io { context: String, reason: String },
}

impl ChainError {
    pub(crate) fn io(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ChainError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }
}
