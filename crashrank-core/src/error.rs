//! Error types shared by the core and its collaborators

use thiserror::Error;

use crate::types::{GroupError, ItemId};

/// A judge call that did not produce a usable ordering.
///
/// Every variant counts as one failed evaluation; none of them is fatal to a run.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge failed: {0}")]
    Failed(String),

    #[error("judge output is not a valid ordering: {0}")]
    InvalidOutput(String),

    #[error("ordering rejected: {0}")]
    InvalidOrdering(#[from] GroupError),

    #[error("could not resolve item {id}: {reason}")]
    Unresolved { id: ItemId, reason: String },

    #[error("judge panicked: {0}")]
    Panicked(String),
}

/// Problems listing or resolving items
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("item source unavailable: {0}")]
    Unavailable(String),

    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage failures. Always fatal to a run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}
