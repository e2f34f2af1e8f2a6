//! Ids assigned to dispatched-but-unconsumed groups

use crashrank_core::{validate_group, ItemId};
use rustc_hash::FxHashSet;

use crate::error::TournamentError;

/// Tracks in-flight ids. An id belongs to at most one in-flight group.
#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: FxHashSet<ItemId>,
    groups: usize,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a freshly dispatched group; rejects duplicates and ids already in flight
    pub fn admit(&mut self, group: &[ItemId]) -> Result<(), TournamentError> {
        validate_group(group)?;
        if let Some(busy) = group.iter().find(|id| self.ids.contains(*id)) {
            return Err(TournamentError::InFlightViolation(busy.clone()));
        }
        self.ids.extend(group.iter().cloned());
        self.groups += 1;
        Ok(())
    }

    /// Release a consumed group
    pub fn release(&mut self, group: &[ItemId]) {
        for id in group {
            self.ids.remove(id);
        }
        self.groups = self.groups.saturating_sub(1);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of in-flight groups
    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Number of in-flight ids
    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups == 0
    }

    /// Ids of `universe` not in flight, in universe order
    pub fn eligible(&self, universe: &[ItemId]) -> Vec<ItemId> {
        universe
            .iter()
            .filter(|id| !self.ids.contains(*id))
            .cloned()
            .collect()
    }
}
