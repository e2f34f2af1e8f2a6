//! Run outcome and final report

use chrono::{DateTime, Utc};
use crashrank_core::StandingRow;
use serde::{Deserialize, Serialize};

use crate::abort::AbortReason;

/// How a run ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Budget spent and all work drained
    Completed,
    /// Failure thresholds tripped; state stays resumable
    Aborted(AbortReason),
    /// Stopped by the user
    Interrupted,
    /// No group could be formed and nothing was in flight
    Exhausted,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::Exhausted)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => f.write_str("completed"),
            RunOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
            RunOutcome::Interrupted => f.write_str("interrupted"),
            RunOutcome::Exhausted => f.write_str("exhausted (no group could be formed)"),
        }
    }
}

/// Result of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Final standings sorted by mu (descending)
    pub standings: Vec<StandingRow>,
    /// Successful evaluations, including those restored from a snapshot
    pub completed: u64,
    /// Failed evaluations, including those restored from a snapshot
    pub failed: u64,
    /// Evaluations restored from a snapshot at startup
    pub resumed_from: u64,
    /// Results that arrived after the stop decision and were dropped
    pub discarded: u64,
    /// Groups still running when the drain grace period ran out
    pub abandoned: u64,
    pub budget: u64,
    pub budget_remaining: u64,
    pub snapshot_location: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Top-ranked item
    pub fn leader(&self) -> Option<&StandingRow> {
        self.standings.first()
    }

    /// Top N items
    pub fn top_n(&self, n: usize) -> &[StandingRow] {
        let n = n.min(self.standings.len());
        &self.standings[..n]
    }

    /// Evaluations performed by this invocation (excludes restored ones)
    pub fn evaluated_this_run(&self) -> u64 {
        (self.completed + self.failed).saturating_sub(self.resumed_from)
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
