//! Deterministic judge ordering every group by id

use crashrank_core::{Item, ItemId, Judge, JudgeError, Judgment};
use serde::{Deserialize, Serialize};

/// Order produced by [`FixedJudge`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixedOrder {
    /// Smallest id first
    #[default]
    Lexicographic,
    /// Largest id first
    Reverse,
}

/// Orders every group by id
#[derive(Clone, Debug, Default)]
pub struct FixedJudge {
    order: FixedOrder,
}

impl FixedJudge {
    pub fn new(order: FixedOrder) -> Self {
        Self { order }
    }
}

impl Judge for FixedJudge {
    fn judge_id(&self) -> &str {
        "fixed"
    }

    fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError> {
        if group.is_empty() {
            return Err(JudgeError::Failed("cannot evaluate an empty group".to_string()));
        }
        let mut ordered: Vec<ItemId> = group.iter().map(|item| item.id.clone()).collect();
        ordered.sort();
        if self.order == FixedOrder::Reverse {
            ordered.reverse();
        }
        Ok(Judgment {
            raw_output: ordered.join(" > "),
            rationale: format!("fixed {:?} order", self.order).to_lowercase(),
            ordered_ids: ordered,
        })
    }
}
