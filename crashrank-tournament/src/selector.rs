//! Group selection strategies
//!
//! Level 3 - Steps
//!
//! Selectors are stateless. All randomness comes from the rng handed in by
//! the controller, which derives one ChaCha stream per dispatch so that a
//! resumed run replays the exact sequence of an uninterrupted one.

use crashrank_core::{ItemId, RatingStore, MIN_GROUP_SIZE};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{SelectorConfig, SelectorKind};

/// Proposes the next comparison group
pub trait GroupSelector: Send {
    fn name(&self) -> &'static str;

    /// Pick up to `k` distinct ids from `eligible` (sorted, none in flight).
    ///
    /// Returns `None` when fewer than 2 ids are eligible.
    fn propose(
        &self,
        eligible: &[ItemId],
        k: usize,
        ratings: &RatingStore,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<ItemId>>;
}

/// Rng for the `dispatch_seq`-th proposal of a run seeded with `seed`
pub fn selector_rng(seed: u64, dispatch_seq: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(dispatch_seq);
    rng
}

/// Build the selector named by the configuration
pub fn build_selector(config: &SelectorConfig) -> Box<dyn GroupSelector> {
    match config.kind {
        SelectorKind::Random => Box::new(RandomSelector),
        SelectorKind::Uncertainty => Box::new(UncertaintySelector {
            delta_mu: config.delta_mu,
            max_evals_per_item: config.max_evals_per_item,
        }),
        SelectorKind::LeastRuns => Box::new(LeastRunsSelector),
    }
}

fn group_len(eligible: usize, k: usize) -> Option<usize> {
    if eligible < MIN_GROUP_SIZE {
        None
    } else {
        Some(k.max(MIN_GROUP_SIZE).min(eligible))
    }
}

// ============================================================================
// Random baseline
// ============================================================================

/// Uniform sample without replacement
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl GroupSelector for RandomSelector {
    fn name(&self) -> &'static str {
        "random"
    }

    fn propose(
        &self,
        eligible: &[ItemId],
        k: usize,
        _ratings: &RatingStore,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<ItemId>> {
        let size = group_len(eligible.len(), k)?;
        Some(eligible.choose_multiple(rng, size).cloned().collect())
    }
}

// ============================================================================
// Uncertainty-seeded active selection
// ============================================================================

/// Seeds on the most uncertain item and fills the group with items of
/// similar score, where a comparison is most informative.
#[derive(Clone, Copy, Debug)]
pub struct UncertaintySelector {
    pub delta_mu: f64,
    pub max_evals_per_item: Option<u64>,
}

impl UncertaintySelector {
    fn is_capped(&self, id: &str, ratings: &RatingStore) -> bool {
        self.max_evals_per_item
            .map_or(false, |cap| ratings.eval_count(id) >= cap)
    }
}

impl GroupSelector for UncertaintySelector {
    fn name(&self) -> &'static str {
        "uncertainty"
    }

    fn propose(
        &self,
        eligible: &[ItemId],
        k: usize,
        ratings: &RatingStore,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<ItemId>> {
        let size = group_len(eligible.len(), k)?;

        let (open, capped): (Vec<&ItemId>, Vec<&ItemId>) =
            eligible.iter().partition(|id| !self.is_capped(id, ratings));
        let seed_candidates = if open.is_empty() { &capped } else { &open };

        // Highest sigma, first in id order on ties
        let mut seed = seed_candidates[0];
        let mut seed_sigma = ratings.uncertainty(seed);
        for &id in seed_candidates.iter().skip(1) {
            let sigma = ratings.uncertainty(id);
            if sigma > seed_sigma {
                seed = id;
                seed_sigma = sigma;
            }
        }
        let seed_mu = ratings.score(seed);
        let needed = size - 1;

        let mut pool: Vec<&ItemId> = open.iter().copied().filter(|id| *id != seed).collect();
        if pool.len() < needed {
            pool.extend(capped.iter().copied().filter(|id| *id != seed));
        }

        let distance = |id: &ItemId| (ratings.score(id) - seed_mu).abs();
        let (near, far): (Vec<&ItemId>, Vec<&ItemId>) =
            pool.into_iter().partition(|id| distance(*id) <= self.delta_mu);

        let mut group: Vec<ItemId> = Vec::with_capacity(size);
        group.push(seed.clone());

        if near.len() >= needed {
            group.extend(near.choose_multiple(rng, needed).map(|id| (*id).clone()));
        } else {
            group.extend(near.iter().map(|id| (*id).clone()));
            let mut far = far;
            far.sort_by(|a, b| {
                distance(*a)
                    .partial_cmp(&distance(*b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            group.extend(far.into_iter().take(needed - near.len()).cloned());
        }

        group.shuffle(rng);
        Some(group)
    }
}

// ============================================================================
// Least-runs
// ============================================================================

/// Prefers the ids with the fewest evaluations, random within equal counts
#[derive(Clone, Copy, Debug, Default)]
pub struct LeastRunsSelector;

impl GroupSelector for LeastRunsSelector {
    fn name(&self) -> &'static str {
        "least-runs"
    }

    fn propose(
        &self,
        eligible: &[ItemId],
        k: usize,
        ratings: &RatingStore,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<ItemId>> {
        let size = group_len(eligible.len(), k)?;

        let mut candidates: Vec<&ItemId> = eligible.iter().collect();
        candidates.shuffle(rng);
        candidates.sort_by_key(|id| ratings.eval_count(id));

        let mut group: Vec<ItemId> = candidates.into_iter().take(size).cloned().collect();
        group.shuffle(rng);
        Some(group)
    }
}
