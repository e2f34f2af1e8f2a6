//! crashrank Adapters - Concrete collaborators for the ranking engine
//!
//! - DirectoryItemSource: crash files discovered under a directory
//! - JsonlPersistence: append-only observation log plus atomic snapshot file
//! - Judges: simulated (ground truth + noise), fixed order, external command

pub mod judges;
mod source;
mod storage;

pub use judges::{load_truth, random_truth, CommandJudge, FixedJudge, FixedOrder, SimulatedJudge};
pub use source::{DirectoryItemSource, DEFAULT_PATTERN};
pub use storage::{JsonlPersistence, OBSERVATIONS_FILE, SNAPSHOT_FILE};
