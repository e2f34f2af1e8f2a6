//! Replay command - rebuild ratings from the observation log
//!
//! Useful after changing rating parameters, or to check that a snapshot
//! agrees with the log it was built from.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use crashrank_adapters::JsonlPersistence;
use crashrank_core::{Persistence, StandingRow};
use crashrank_tournament::{max_divergence, replay, TournamentConfig};

use crate::output;

/// Divergence below this is reported as a match
const MATCH_TOLERANCE: f64 = 1e-9;

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct ReplayArgs {
    /// Output directory of a previous run
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// JSON file with the run configuration (rating parameters, weight)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Weight of each observation [default: 1/(k-1)]
    #[arg(long)]
    pub weight: Option<f64>,

    /// Rows in the table
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Print standings as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ReplaySummary {
    observations: usize,
    /// Largest mu/sigma difference to the stored snapshot, if one exists
    snapshot_divergence: Option<f64>,
    standings: Vec<StandingRow>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

pub fn run(args: ReplayArgs) -> Result<()> {
    let config = load_config(&args)?;
    config.validate()?;

    let storage = JsonlPersistence::open_existing(&args.output_dir)?;
    let observations = storage
        .load_observations()
        .with_context(|| format!("failed to read {}", storage.observations_path().display()))?;
    if observations.is_empty() {
        bail!("no observations in {}", storage.observations_path().display());
    }

    let store = replay(&observations, &config);
    let rated = store.snapshot();
    let standings = store.standings(rated.beliefs.keys());

    let snapshot_divergence = match storage.load_snapshot()? {
        Some(snapshot) => {
            snapshot.check_version()?;
            let mut saved = crashrank_core::RatingStore::new(config.rating.clone());
            saved.restore(&snapshot.ratings);
            Some(max_divergence(&store, &saved))
        }
        None => None,
    };

    let summary = ReplaySummary {
        observations: observations.len(),
        snapshot_divergence,
        standings,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary).context("failed to encode standings")?);
    } else {
        print_replay(&summary, args.top);
    }
    Ok(())
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn load_config(args: &ReplayArgs) -> Result<TournamentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config JSON in {}", path.display()))?
        }
        None => TournamentConfig::default(),
    };
    if let Some(weight) = args.weight {
        config.weight = Some(weight);
    }
    Ok(config)
}

fn print_replay(summary: &ReplaySummary, top: usize) {
    println!(
        "Replayed {} observations over {} items",
        summary.observations,
        summary.standings.len()
    );
    match summary.snapshot_divergence {
        Some(d) if d <= MATCH_TOLERANCE => println!("Snapshot: matches the log"),
        Some(d) => println!(
            "Snapshot: differs from the log (max |d mu|, |d sigma| = {:.6}); the log may hold \
             observations past the last snapshot, or parameters differ",
            d
        ),
        None => println!("Snapshot: none"),
    }
    println!();
    print!("{}", output::standings_table(&summary.standings, top));
}
