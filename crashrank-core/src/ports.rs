//! Collaborator traits at the boundary of the ranking engine
//!
//! Item sources and judges are shared with worker threads and must be
//! `Send + Sync`. Persistence is only ever touched by the controller.

use std::collections::BTreeSet;

use crate::error::{JudgeError, PersistenceError, SourceError};
use crate::snapshot::RunSnapshot;
use crate::types::{Item, ItemId, Judgment, OrdinalObservation};

/// Enumerates the id universe and resolves ids to items
pub trait ItemSource: Send + Sync {
    /// All item ids; called once at startup
    fn list_ids(&self) -> Result<BTreeSet<ItemId>, SourceError>;

    /// Resolve one id; called by workers per dispatch
    fn resolve(&self, id: &str) -> Result<Item, SourceError>;
}

/// External oracle that orders a group by exploitability
pub trait Judge: Send + Sync {
    /// Identity tag recorded on every observation
    fn judge_id(&self) -> &str;

    /// Order `group` most to least exploitable. Blocking; may fail.
    fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError>;
}

/// Durable storage for observations and snapshots
pub trait Persistence {
    /// Append one observation to the log
    fn append_observation(&mut self, observation: &OrdinalObservation) -> Result<(), PersistenceError>;

    /// Every logged observation, in append order
    fn load_observations(&self) -> Result<Vec<OrdinalObservation>, PersistenceError>;

    /// Replace the stored snapshot. Saving the same snapshot twice is harmless.
    fn save_snapshot(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError>;

    /// The stored snapshot, if any
    fn load_snapshot(&self) -> Result<Option<RunSnapshot>, PersistenceError>;

    /// Human-readable location of the snapshot (path, key, ...)
    fn snapshot_location(&self) -> String;
}
