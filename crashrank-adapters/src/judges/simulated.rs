//! Simulated judge: ground truth plus multiplicative Gaussian noise

use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use crashrank_core::{Item, ItemId, Judge, JudgeError, Judgment};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Orders groups by true score perturbed with noise proportional to the score
pub struct SimulatedJudge {
    truth: HashMap<ItemId, f64>,
    noise: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedJudge {
    /// `noise` is clamped to [0, 1]; 0 reproduces the ground truth exactly
    pub fn new(truth: HashMap<ItemId, f64>, noise: f64, seed: u64) -> Self {
        Self {
            truth,
            noise: noise.clamp(0.0, 1.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn noise(&self) -> f64 {
        self.noise
    }

    pub fn truth(&self) -> &HashMap<ItemId, f64> {
        &self.truth
    }

    fn true_score(&self, id: &str) -> f64 {
        self.truth.get(id).copied().unwrap_or(0.0)
    }

    fn noisy_score(&self, score: f64, rng: &mut ChaCha8Rng) -> f64 {
        if self.noise == 0.0 {
            return score;
        }
        score + gaussian(rng) * score.abs() * self.noise
    }
}

/// Standard normal sample (Box-Muller)
fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl Judge for SimulatedJudge {
    fn judge_id(&self) -> &str {
        "simulated"
    }

    fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError> {
        if group.is_empty() {
            return Err(JudgeError::Failed("cannot evaluate an empty group".to_string()));
        }

        let mut scored: Vec<(&Item, f64)> = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| JudgeError::Failed("judge rng poisoned".to_string()))?;
            group
                .iter()
                .map(|item| (item, self.noisy_score(self.true_score(&item.id), &mut rng)))
                .collect()
        };
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut raw_output = String::from("Simulated judge evaluation:\n");
        for (i, (item, score)) in scored.iter().enumerate() {
            raw_output.push_str(&format!(
                "{}. {}: {:.3} (true: {:.3})\n",
                i + 1,
                item.id,
                score,
                self.true_score(&item.id)
            ));
        }

        let (top, top_score) = scored[0];
        let rationale = format!(
            "{} scored {:.3} (ground truth {:.3})",
            top.id,
            top_score,
            self.true_score(&top.id)
        );

        Ok(Judgment {
            ordered_ids: scored.iter().map(|(item, _)| item.id.clone()).collect(),
            rationale,
            raw_output,
        })
    }
}

/// Uniform [0, 1) ground truth per id, reproducible for a seed
pub fn random_truth<'a, I>(ids: I, seed: u64) -> HashMap<ItemId, f64>
where
    I: IntoIterator<Item = &'a ItemId>,
{
    let mut sorted: Vec<&ItemId> = ids.into_iter().collect();
    sorted.sort();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    sorted.into_iter().map(|id| (id.clone(), rng.gen::<f64>())).collect()
}

/// Ground truth from a JSON object mapping id to score
pub fn load_truth(path: &Path) -> Result<HashMap<ItemId, f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ground truth {}", path.display()))?;
    let truth: HashMap<ItemId, f64> = serde_json::from_str(&text)
        .with_context(|| format!("invalid ground truth JSON in {}", path.display()))?;
    Ok(truth)
}
