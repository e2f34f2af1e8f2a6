//! Failure abort policy
//!
//! A pure function of the consumed/failed counters, evaluated after every
//! consumed result. The first matching rule wins.

use serde::{Deserialize, Serialize};

/// Why a run was aborted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Every one of the first results failed
    EarlyFailures { failed: u64 },
    /// Failure rate over the threshold once enough results are in
    FailureRate { failed: u64, consumed: u64 },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::EarlyFailures { failed } => {
                write!(f, "first {} evaluations all failed", failed)
            }
            AbortReason::FailureRate { failed, consumed } => write!(
                f,
                "{} of {} evaluations failed ({:.1}%)",
                failed,
                consumed,
                100.0 * *failed as f64 / *consumed as f64
            ),
        }
    }
}

/// Abort thresholds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AbortPolicy {
    /// Abort when exactly this many results are in and all failed
    pub early_window: u64,
    /// Failure-rate rule applies from this many consumed results on
    pub late_min_consumed: u64,
    /// Abort when failed/consumed exceeds this
    pub late_max_failure_rate: f64,
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self {
            early_window: 4,
            late_min_consumed: 50,
            late_max_failure_rate: 0.2,
        }
    }
}

impl AbortPolicy {
    /// Policy that never aborts
    pub fn never() -> Self {
        Self {
            early_window: 0,
            late_min_consumed: u64::MAX,
            late_max_failure_rate: 1.0,
        }
    }

    /// Whether dispatch must wait while the early window is still all failures.
    ///
    /// Until the first success, no more than `early_window` groups are ever
    /// dispatched, so a judge that always fails is called exactly that often.
    pub fn holds_dispatch(&self, consumed: u64, failed: u64, dispatched: u64) -> bool {
        self.early_window > 0
            && consumed < self.early_window
            && failed == consumed
            && dispatched >= self.early_window
    }

    pub fn check(&self, consumed: u64, failed: u64) -> Option<AbortReason> {
        if self.early_window > 0 && consumed == self.early_window && failed == consumed {
            return Some(AbortReason::EarlyFailures { failed });
        }
        if consumed >= self.late_min_consumed
            && consumed > 0
            && failed as f64 / consumed as f64 > self.late_max_failure_rate
        {
            return Some(AbortReason::FailureRate { failed, consumed });
        }
        None
    }
}
