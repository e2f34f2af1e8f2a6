//! Versioned resume format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::rating::RatingState;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to continue a run exactly where it stopped
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub ratings: RatingState,
    /// Successful evaluations folded into `ratings`
    pub completed: u64,
    /// Failed evaluations (each consumed a budget unit)
    pub failed: u64,
    /// Budget left when the snapshot was taken
    pub budget_remaining: u64,
}

impl RunSnapshot {
    pub fn new(ratings: RatingState, completed: u64, failed: u64, budget_remaining: u64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            ratings,
            completed,
            failed,
            budget_remaining,
        }
    }

    /// Budget units already spent
    pub fn consumed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Reject snapshots written by an incompatible format
    pub fn check_version(&self) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}
