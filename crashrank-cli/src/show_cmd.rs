//! Show command - print the standings stored in a snapshot

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use crashrank_adapters::JsonlPersistence;
use crashrank_core::{Persistence, RatingConfig, RatingStore, RunSnapshot, StandingRow};

use crate::output;

#[derive(Args)]
pub struct ShowArgs {
    /// Output directory of a previous run
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Rows in the table
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Print standings as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SnapshotView {
    saved_at: String,
    completed: u64,
    failed: u64,
    budget_remaining: u64,
    standings: Vec<StandingRow>,
}

pub fn run(args: ShowArgs) -> Result<()> {
    let storage = JsonlPersistence::open_existing(&args.output_dir)?;
    let Some(snapshot) = storage.load_snapshot()? else {
        bail!("no snapshot at {}", storage.snapshot_path().display());
    };
    snapshot.check_version()?;

    let view = view_of(&snapshot);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("Snapshot saved {}", view.saved_at);
        println!(
            "Evaluations: {} succeeded, {} failed, budget remaining {}",
            view.completed, view.failed, view.budget_remaining
        );
        println!();
        print!("{}", output::standings_table(&view.standings, args.top));
    }
    Ok(())
}

fn view_of(snapshot: &RunSnapshot) -> SnapshotView {
    // Standings only read stored beliefs, so the prior here never shows
    let mut store = RatingStore::new(RatingConfig::default());
    store.restore(&snapshot.ratings);

    SnapshotView {
        saved_at: snapshot.saved_at.to_rfc3339(),
        completed: snapshot.completed,
        failed: snapshot.failed,
        budget_remaining: snapshot.budget_remaining,
        standings: store.standings(snapshot.ratings.beliefs.keys()),
    }
}
