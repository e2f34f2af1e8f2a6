//! crashrank Tournament - Concurrent ranking runs
//!
//! This crate drives a ranking run end to end:
//! - Run configuration and validation
//! - Group selection strategies (random, uncertainty-seeded, least-runs)
//! - Failure abort policy
//! - Bounded worker pool and the single-writer controller loop
//! - Run reports and log replay
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: TournamentController::run (orchestration)
//! - Level 2: restore, dispatch, consume, drain (phases)
//! - Level 3: propose, evaluate_group, check (steps)
//! - Level 4: utilities, configuration

mod abort;
mod cancel;
mod config;
mod controller;
mod error;
mod in_flight;
mod pool;
mod replay;
mod report;
mod selector;

pub use abort::{AbortPolicy, AbortReason};
pub use cancel::CancellationToken;
pub use config::{SelectorConfig, SelectorKind, TournamentConfig};
pub use controller::{Progress, TournamentController};
pub use error::TournamentError;
pub use in_flight::InFlightSet;
pub use pool::{evaluate_group, Completion, WorkerPool};
pub use replay::{max_divergence, replay};
pub use report::{RunOutcome, RunReport};
pub use selector::{
    build_selector, selector_rng, GroupSelector, LeastRunsSelector, RandomSelector,
    UncertaintySelector,
};
