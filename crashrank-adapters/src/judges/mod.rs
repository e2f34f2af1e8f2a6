//! Judge implementations
//!
//! - SimulatedJudge: ground-truth scores perturbed by noise, for experiments
//! - FixedJudge: deterministic order, a dummy oracle for wiring tests
//! - CommandJudge: delegates to an external program (e.g. an LLM agent)

mod command;
mod fixed;
mod simulated;

pub use command::{parse_judge_output, CommandJudge};
pub use fixed::{FixedJudge, FixedOrder};
pub use simulated::{load_truth, random_truth, SimulatedJudge};
