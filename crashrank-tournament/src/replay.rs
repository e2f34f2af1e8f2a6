//! Rebuild ratings from an observation log
//!
//! The controller logs observations in the order it applies them, so
//! replaying a complete log with the same weights reproduces the ratings of
//! the run exactly.

use crashrank_core::{OrdinalObservation, RatingStore};
use tracing::info;

use crate::config::TournamentConfig;

/// Apply `observations` in order to a fresh store built from `config`
pub fn replay(observations: &[OrdinalObservation], config: &TournamentConfig) -> RatingStore {
    let mut store = RatingStore::new(config.rating.clone());
    for observation in observations {
        store.update(observation, config.weight_for(observation.group_size()));
    }
    info!(
        "Replayed {} observations over {} items",
        observations.len(),
        store.rated_count()
    );
    store
}

/// Largest |mu| or |sigma| difference between two stores over the ids either has rated
pub fn max_divergence(a: &RatingStore, b: &RatingStore) -> f64 {
    let a_state = a.snapshot();
    let b_state = b.snapshot();
    a_state
        .beliefs
        .keys()
        .chain(b_state.beliefs.keys())
        .map(|id| {
            let x = a.belief(id);
            let y = b.belief(id);
            (x.mu - y.mu).abs().max((x.sigma - y.sigma).abs())
        })
        .fold(0.0, f64::max)
}
