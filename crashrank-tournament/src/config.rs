//! Configuration types for ranking runs
//!
//! Level 4 - Utilities and configuration

use crashrank_core::{default_weight, RatingConfig, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TournamentError;

/// Group selection strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKind {
    /// Uniform sample of the eligible ids
    Random,
    /// Seed on the most uncertain item, fill with close competitors
    #[default]
    Uncertainty,
    /// Prefer the least evaluated items
    LeastRuns,
}

impl std::fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SelectorKind::Random => "random",
            SelectorKind::Uncertainty => "uncertainty",
            SelectorKind::LeastRuns => "least-runs",
        };
        f.write_str(name)
    }
}

/// Selector configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub kind: SelectorKind,
    /// Maximum |mu - mu_seed| for uncertainty-seeded fill
    pub delta_mu: f64,
    /// Items at or over this many evaluations are skipped when alternatives exist
    pub max_evals_per_item: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            kind: SelectorKind::Uncertainty,
            delta_mu: 3.0,
            max_evals_per_item: None,
        }
    }
}

impl SelectorConfig {
    pub fn random() -> Self {
        Self {
            kind: SelectorKind::Random,
            ..Default::default()
        }
    }

    pub fn uncertainty(delta_mu: f64) -> Self {
        Self {
            kind: SelectorKind::Uncertainty,
            delta_mu,
            ..Default::default()
        }
    }

    pub fn least_runs() -> Self {
        Self {
            kind: SelectorKind::LeastRuns,
            ..Default::default()
        }
    }

    /// Set per-item evaluation cap
    pub fn with_max_evals(mut self, cap: u64) -> Self {
        self.max_evals_per_item = Some(cap);
        self
    }
}

/// Run configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Group size k
    pub group_size: usize,
    /// Per-observation weight (None = 1/(k-1))
    pub weight: Option<f64>,
    /// Total judge calls for the run, including those of resumed runs
    pub budget: u64,
    /// Snapshot every N consumed results
    pub snapshot_every: u64,
    /// Worker count W (max groups in flight)
    pub workers: usize,
    /// Rating environment
    pub rating: RatingConfig,
    /// Group selection
    pub selector: SelectorConfig,
    /// Uniformly random groups dispatched before the selector takes over
    pub seed_groups: u64,
    /// Seed for selector randomness
    pub seed: u64,
    /// How long in-flight work may finish after a stop before it is abandoned
    pub drain_grace_ms: u64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            group_size: 4,
            weight: None,
            budget: 100,
            snapshot_every: 10,
            workers: 4,
            rating: RatingConfig::default(),
            selector: SelectorConfig::default(),
            seed_groups: 20,
            seed: 42,
            drain_grace_ms: 30_000,
        }
    }
}

impl TournamentConfig {
    /// Create config with group size and budget
    pub fn new(group_size: usize, budget: u64) -> Self {
        Self {
            group_size,
            budget,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_seed_groups(mut self, groups: u64) -> Self {
        self.seed_groups = groups;
        self
    }

    /// Whether dispatch number `seq` belongs to the random seed phase
    pub fn in_seed_phase(&self, seq: u64) -> bool {
        seq < self.seed_groups
    }

    pub fn with_rating(mut self, rating: RatingConfig) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// Weight applied to an observation of `group_size` ids
    pub fn weight_for(&self, group_size: usize) -> f64 {
        self.weight.unwrap_or_else(|| default_weight(group_size))
    }

    /// Reject configurations a run cannot start with
    pub fn validate(&self) -> Result<(), TournamentError> {
        let invalid = |msg: String| Err(TournamentError::Config(msg));

        if !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&self.group_size) {
            return invalid(format!(
                "group size must be between {} and {}, got {}",
                MIN_GROUP_SIZE, MAX_GROUP_SIZE, self.group_size
            ));
        }
        if self.workers == 0 {
            return invalid("worker count must be at least 1".to_string());
        }
        if self.budget == 0 {
            return invalid("budget must be at least 1".to_string());
        }
        if self.snapshot_every == 0 {
            return invalid("snapshot cadence must be at least 1".to_string());
        }
        if let Some(weight) = self.weight {
            if !(weight.is_finite() && weight > 0.0 && weight <= 1.0) {
                return invalid(format!("weight must be in (0, 1], got {}", weight));
            }
        }
        if !(self.selector.delta_mu.is_finite() && self.selector.delta_mu >= 0.0) {
            return invalid(format!("delta_mu must be non-negative, got {}", self.selector.delta_mu));
        }
        self.rating.validate().map_err(TournamentError::Config)
    }
}
