//! crashrank Core - Skill model and shared types
//!
//! This crate provides the pieces every other crate builds on:
//! - Items and ordinal observations (what a judge produced)
//! - Gaussian helper math for the two-player skill update
//! - RatingStore: per-item skill beliefs plus derived counters
//! - RunSnapshot: the versioned resume format
//! - Collaborator traits (item source, judge, persistence)
//!
//! Nothing in here performs I/O or spawns threads.

pub mod error;
pub mod gaussian;
pub mod ports;
pub mod rating;
pub mod snapshot;
pub mod types;

// Re-exports for convenient access
pub use error::{JudgeError, PersistenceError, SourceError};
pub use ports::{ItemSource, Judge, Persistence};
pub use rating::{
    default_weight, DerivedStats, RatingConfig, RatingState, RatingStore, SkillBelief,
    StandingRow,
};
pub use snapshot::{RunSnapshot, SNAPSHOT_VERSION};
pub use types::{
    validate_group, GroupError, Item, ItemId, Judgment, OrdinalObservation, MAX_GROUP_SIZE,
    MIN_GROUP_SIZE,
};
