//! Items, judgments and ordinal observations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Identifier of an item, unique within a run
pub type ItemId = String;

/// Smallest group a judge is ever asked to order
pub const MIN_GROUP_SIZE: usize = 2;

/// Largest configurable group size
pub const MAX_GROUP_SIZE: usize = 7;

/// A unit being ranked (a crash report).
///
/// The payload is an opaque reference resolved by the item source; the core
/// never looks inside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub payload: String,
    pub discovered_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// What a judge returns for one group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    /// Group ids reordered most to least exploitable
    pub ordered_ids: Vec<ItemId>,
    pub rationale: String,
    pub raw_output: String,
}

/// Problems with a group or an ordering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("group is empty")]
    Empty,

    #[error("duplicate id in group: {0}")]
    Duplicate(ItemId),

    #[error("ordering has {got} ids, group has {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("ordering contains id not in group: {0}")]
    Foreign(ItemId),
}

/// Check that `ids` is non-empty and free of duplicates
pub fn validate_group(ids: &[ItemId]) -> Result<(), GroupError> {
    if ids.is_empty() {
        return Err(GroupError::Empty);
    }
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(GroupError::Duplicate(id.clone()));
        }
    }
    Ok(())
}

/// Result of judging one comparison group. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrdinalObservation {
    /// Ids ordered most to least exploitable
    pub ordered_ids: Vec<ItemId>,
    pub rationale: String,
    pub raw_output: String,
    pub timestamp: DateTime<Utc>,
    pub judge_id: String,
}

impl OrdinalObservation {
    /// Build an observation from a judgment on `group`.
    ///
    /// The judgment's ordering must be a permutation of the group.
    pub fn from_judgment(
        group: &[ItemId],
        judgment: Judgment,
        judge_id: &str,
    ) -> Result<Self, GroupError> {
        validate_group(group)?;
        validate_group(&judgment.ordered_ids)?;

        if judgment.ordered_ids.len() != group.len() {
            return Err(GroupError::LengthMismatch {
                expected: group.len(),
                got: judgment.ordered_ids.len(),
            });
        }
        if let Some(foreign) = judgment.ordered_ids.iter().find(|id| !group.contains(id)) {
            return Err(GroupError::Foreign(foreign.clone()));
        }

        Ok(Self {
            ordered_ids: judgment.ordered_ids,
            rationale: judgment.rationale,
            raw_output: judgment.raw_output,
            timestamp: Utc::now(),
            judge_id: judge_id.to_string(),
        })
    }

    /// Build an observation directly from an ordering (replay, tests)
    pub fn from_ordering(ordered_ids: Vec<ItemId>, judge_id: &str) -> Result<Self, GroupError> {
        validate_group(&ordered_ids)?;
        Ok(Self {
            ordered_ids,
            rationale: String::new(),
            raw_output: String::new(),
            timestamp: Utc::now(),
            judge_id: judge_id.to_string(),
        })
    }

    /// Number of ids in the judged group
    pub fn group_size(&self) -> usize {
        self.ordered_ids.len()
    }
}
