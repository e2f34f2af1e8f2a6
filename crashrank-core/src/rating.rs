//! RatingStore - Gaussian skill beliefs with k-way to pairwise decomposition
//!
//! A k-way ordering `[c1, .., ck]` is folded in as the k-1 adjacent outcomes
//! `c1 > c2`, `c2 > c3`, .., applied one after another with the two-player
//! TrueSkill rule. Each sub-update is scaled by a weight (default `1/(k-1)`)
//! so one k-way judgment never carries more confidence than k-1 independent
//! pairwise calls would.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::gaussian::{draw_margin, v_win, w_win};
use crate::types::{ItemId, OrdinalObservation};

/// Default weight for a k-way observation
pub fn default_weight(group_size: usize) -> f64 {
    if group_size < 2 {
        1.0
    } else {
        1.0 / (group_size - 1) as f64
    }
}

/// Rating environment, fixed for the lifetime of a store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Prior mean
    pub mu: f64,
    /// Prior standard deviation
    pub sigma: f64,
    /// Performance standard deviation
    pub beta: f64,
    /// Dynamics factor added to the variance before every sub-update
    pub tau: f64,
    /// Draw probability of the environment (shapes the win margin only)
    pub draw_probability: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        let mu = 25.0;
        let sigma = mu / 3.0;
        Self {
            mu,
            sigma,
            beta: sigma / 2.0,
            tau: sigma / 100.0,
            draw_probability: 0.10,
        }
    }
}

impl RatingConfig {
    /// Environment with a custom prior; beta and tau follow the prior sigma
    pub fn with_prior(mu: f64, sigma: f64) -> Self {
        Self {
            mu,
            sigma,
            beta: sigma / 2.0,
            tau: sigma / 100.0,
            ..Default::default()
        }
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_draw_probability(mut self, draw_probability: f64) -> Self {
        self.draw_probability = draw_probability;
        self
    }

    /// Prior belief handed to ids the store has never seen
    pub fn prior(&self) -> SkillBelief {
        SkillBelief {
            mu: self.mu,
            sigma: self.sigma,
        }
    }

    /// Check the environment is usable; returns a description of the first problem
    pub fn validate(&self) -> Result<(), String> {
        if !self.mu.is_finite() {
            return Err(format!("prior mu must be finite, got {}", self.mu));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(format!("prior sigma must be positive, got {}", self.sigma));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(format!("beta must be positive, got {}", self.beta));
        }
        if !(self.tau.is_finite() && self.tau >= 0.0) {
            return Err(format!("tau must be non-negative, got {}", self.tau));
        }
        if !(0.0..1.0).contains(&self.draw_probability) {
            return Err(format!(
                "draw probability must be in [0, 1), got {}",
                self.draw_probability
            ));
        }
        Ok(())
    }
}

/// Gaussian skill estimate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillBelief {
    pub mu: f64,
    pub sigma: f64,
}

/// Counters derived from the applied observations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStats {
    /// Groups this item appeared in
    pub evals: u64,
    /// Co-members ranked below this item, summed over groups
    pub wins: u64,
    /// Co-members it could have beaten, summed over groups
    pub possible_wins: u64,
    /// Sum of 1-based rank positions
    pub rank_sum: u64,
}

impl DerivedStats {
    /// Fraction of possible wins achieved (0.0 when never compared)
    pub fn win_rate(&self) -> f64 {
        if self.possible_wins == 0 {
            0.0
        } else {
            self.wins as f64 / self.possible_wins as f64
        }
    }

    /// Average 1-based rank position (0.0 when never compared)
    pub fn avg_rank(&self) -> f64 {
        if self.evals == 0 {
            0.0
        } else {
            self.rank_sum as f64 / self.evals as f64
        }
    }

    fn record(&mut self, position: usize, group_size: usize) {
        self.evals += 1;
        self.wins += (group_size - position - 1) as u64;
        self.possible_wins += (group_size - 1) as u64;
        self.rank_sum += (position + 1) as u64;
    }
}

/// Serializable rating state (beliefs + stats), ordered by id
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingState {
    pub beliefs: BTreeMap<ItemId, SkillBelief>,
    pub stats: BTreeMap<ItemId, DerivedStats>,
}

/// One row of the ranked view
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub id: ItemId,
    pub mu: f64,
    pub sigma: f64,
    pub evals: u64,
    pub win_rate: f64,
    pub avg_rank: f64,
}

/// Per-item skill beliefs and derived counters
#[derive(Clone, Debug)]
pub struct RatingStore {
    config: RatingConfig,
    draw_margin: f64,
    beliefs: FxHashMap<ItemId, SkillBelief>,
    stats: FxHashMap<ItemId, DerivedStats>,
}

impl RatingStore {
    pub fn new(config: RatingConfig) -> Self {
        let draw_margin = draw_margin(config.draw_probability, config.beta);
        Self {
            config,
            draw_margin,
            beliefs: FxHashMap::default(),
            stats: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Fold one observation into the store.
    ///
    /// Applies the k-1 adjacent sub-updates in rank order, each scaled by
    /// `weight`. Orderings with fewer than two ids carry no information and
    /// are ignored.
    pub fn update(&mut self, observation: &OrdinalObservation, weight: f64) {
        let ordered = &observation.ordered_ids;
        if ordered.len() < 2 {
            tracing::debug!("Skipping update: need at least 2 items, got {}", ordered.len());
            return;
        }

        let group_size = ordered.len();
        for (position, id) in ordered.iter().enumerate() {
            self.stats
                .entry(id.clone())
                .or_default()
                .record(position, group_size);
        }

        for pair in ordered.windows(2) {
            self.rate_pair(&pair[0], &pair[1], weight);
        }
    }

    /// Fold one observation with the default `1/(k-1)` weight
    pub fn update_default(&mut self, observation: &OrdinalObservation) {
        let weight = default_weight(observation.group_size());
        self.update(observation, weight);
    }

    /// Two-player update, `winner` ranked above `loser`
    fn rate_pair(&mut self, winner: &str, loser: &str, weight: f64) {
        let w = self.belief(winner);
        let l = self.belief(loser);
        let (new_w, new_l) = self.rate_1vs1(w, l, weight);

        tracing::debug!(
            "{} beats {}: {:.2}->{:.2} (σ {:.2}->{:.2}) / {:.2}->{:.2} (σ {:.2}->{:.2})",
            winner, loser, w.mu, new_w.mu, w.sigma, new_w.sigma, l.mu, new_l.mu, l.sigma, new_l.sigma
        );

        self.beliefs.insert(winner.to_string(), new_w);
        self.beliefs.insert(loser.to_string(), new_l);
    }

    fn rate_1vs1(&self, winner: SkillBelief, loser: SkillBelief, weight: f64) -> (SkillBelief, SkillBelief) {
        let tau2 = self.config.tau * self.config.tau;
        let var_w = winner.sigma * winner.sigma + tau2;
        let var_l = loser.sigma * loser.sigma + tau2;

        let c2 = 2.0 * self.config.beta * self.config.beta + var_w + var_l;
        let c = c2.sqrt();
        let t = (winner.mu - loser.mu) / c;
        let margin = self.draw_margin / c;

        let v = v_win(t, margin);
        let w = w_win(t, margin);

        let post_mu_w = winner.mu + var_w / c * v;
        let post_mu_l = loser.mu - var_l / c * v;
        let post_var_w = var_w * (1.0 - var_w / c2 * w);
        let post_var_l = var_l * (1.0 - var_l / c2 * w);

        let fold = |mu: f64, var: f64, post_mu: f64, post_var: f64| SkillBelief {
            mu: mu + weight * (post_mu - mu),
            sigma: (var + weight * (post_var - var)).max(0.0).sqrt(),
        };

        (
            fold(winner.mu, var_w, post_mu_w, post_var_w),
            fold(loser.mu, var_l, post_mu_l, post_var_l),
        )
    }

    /// Current belief, prior for unseen ids
    pub fn belief(&self, id: &str) -> SkillBelief {
        self.beliefs
            .get(id)
            .copied()
            .unwrap_or_else(|| self.config.prior())
    }

    pub fn score(&self, id: &str) -> f64 {
        self.belief(id).mu
    }

    pub fn uncertainty(&self, id: &str) -> f64 {
        self.belief(id).sigma
    }

    pub fn stats(&self, id: &str) -> DerivedStats {
        self.stats.get(id).copied().unwrap_or_default()
    }

    pub fn eval_count(&self, id: &str) -> u64 {
        self.stats(id).evals
    }

    pub fn win_rate(&self, id: &str) -> f64 {
        self.stats(id).win_rate()
    }

    pub fn avg_rank(&self, id: &str) -> f64 {
        self.stats(id).avg_rank()
    }

    /// Number of ids with a non-prior belief
    pub fn rated_count(&self) -> usize {
        self.beliefs.len()
    }

    /// Export the full state
    pub fn snapshot(&self) -> RatingState {
        RatingState {
            beliefs: self.beliefs.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            stats: self.stats.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Replace the full state (no merge)
    pub fn restore(&mut self, state: &RatingState) {
        self.beliefs = state.beliefs.iter().map(|(k, v)| (k.clone(), *v)).collect();
        self.stats = state.stats.iter().map(|(k, v)| (k.clone(), *v)).collect();
    }

    /// Ranked view over `ids`, highest mu first, ties broken by id
    pub fn standings<'a, I>(&self, ids: I) -> Vec<StandingRow>
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let mut rows: Vec<StandingRow> = ids
            .into_iter()
            .map(|id| {
                let belief = self.belief(id);
                let stats = self.stats(id);
                StandingRow {
                    id: id.clone(),
                    mu: belief.mu,
                    sigma: belief.sigma,
                    evals: stats.evals,
                    win_rate: stats.win_rate(),
                    avg_rank: stats.avg_rank(),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.mu.partial_cmp(&a.mu)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }
}

impl Default for RatingStore {
    fn default() -> Self {
        Self::new(RatingConfig::default())
    }
}
