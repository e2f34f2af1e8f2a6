//! Run-level errors
//!
//! Judge failures never show up here: they are counted, not raised.

use crashrank_core::{GroupError, ItemId, PersistenceError, SourceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("item source failure: {0}")]
    Source(#[from] SourceError),

    #[error("need at least 2 items to rank, found {found}")]
    InsufficientItems { found: usize },

    #[error("proposed group is invalid: {0}")]
    InvalidGroup(#[from] GroupError),

    #[error("item {0} is already in flight")]
    InFlightViolation(ItemId),

    #[error("worker pool error: {0}")]
    Pool(String),
}
