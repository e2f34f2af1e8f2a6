//! Run command - rank a crash directory, resuming from the last snapshot
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_config(), open_storage(), build_judge(), report()
//! - Level 3: progress callback, milestone leaders
//! - Level 4: argument enums and conversions

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use crashrank_adapters::{
    load_truth, random_truth, CommandJudge, DirectoryItemSource, FixedJudge, FixedOrder,
    JsonlPersistence, SimulatedJudge, DEFAULT_PATTERN,
};
use crashrank_core::{ItemId, ItemSource, Judge};
use crashrank_tournament::{
    CancellationToken, Progress, RunOutcome, RunReport, SelectorKind, TournamentConfig,
    TournamentController,
};

use crate::output::{self, RunProgress};

/// Log the current leaders every this many successful evaluations
const MILESTONE_EVERY: u64 = 50;
const MILESTONE_LEADERS: usize = 5;

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SelectorArg {
    Random,
    Uncertainty,
    LeastRuns,
}

impl From<SelectorArg> for SelectorKind {
    fn from(arg: SelectorArg) -> Self {
        match arg {
            SelectorArg::Random => SelectorKind::Random,
            SelectorArg::Uncertainty => SelectorKind::Uncertainty,
            SelectorArg::LeastRuns => SelectorKind::LeastRuns,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum JudgeArg {
    /// Ground truth plus noise (for experiments)
    Simulated,
    /// Fixed id order (dummy oracle)
    Fixed,
    /// External program
    Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FixedOrderArg {
    Lexicographic,
    Reverse,
}

impl From<FixedOrderArg> for FixedOrder {
    fn from(arg: FixedOrderArg) -> Self {
        match arg {
            FixedOrderArg::Lexicographic => FixedOrder::Lexicographic,
            FixedOrderArg::Reverse => FixedOrder::Reverse,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory containing crash files (searched recursively)
    #[arg(long, value_name = "DIR")]
    pub crashes_dir: PathBuf,

    /// Directory for the observation log and snapshot
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// File name pattern for crash files
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// JSON file with run configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Group size (2-7) [default: 4]
    #[arg(long)]
    pub k: Option<usize>,

    /// Total judge calls, including those of earlier runs [default: 100]
    #[arg(long)]
    pub budget: Option<u64>,

    /// Concurrent judge calls [default: 4]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Snapshot every N results [default: 10]
    #[arg(long)]
    pub snapshot_every: Option<u64>,

    /// Random groups dispatched before the selector takes over [default: 20]
    #[arg(long)]
    pub seed_groups: Option<u64>,

    /// Group selection strategy [default: uncertainty]
    #[arg(long, value_enum)]
    pub selector: Option<SelectorArg>,

    /// Score window for uncertainty-seeded groups [default: 3.0]
    #[arg(long)]
    pub delta_mu: Option<f64>,

    /// Skip items with this many evaluations when others are available
    #[arg(long)]
    pub max_evals_per_item: Option<u64>,

    /// Weight of each observation [default: 1/(k-1)]
    #[arg(long)]
    pub weight: Option<f64>,

    /// Seed for group selection and the simulated judge [default: 42]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds to wait for in-flight calls after a stop [default: 30]
    #[arg(long)]
    pub drain_grace: Option<f64>,

    /// Judge implementation
    #[arg(long, value_enum, default_value = "simulated")]
    pub judge: JudgeArg,

    /// Noise level for the simulated judge (0-1)
    #[arg(long, default_value = "0.1")]
    pub noise: f64,

    /// Ground truth JSON (id -> score) for the simulated judge; random if absent
    #[arg(long, value_name = "FILE")]
    pub truth: Option<PathBuf>,

    /// Order used by the fixed judge
    #[arg(long, value_enum, default_value = "lexicographic")]
    pub fixed_order: FixedOrderArg,

    /// Program run by the command judge
    #[arg(long, value_name = "PROG")]
    pub judge_command: Option<String>,

    /// Seconds before a command judge call is killed and counted as failed
    #[arg(long, default_value = "300")]
    pub judge_timeout: f64,

    /// Argument for the command judge (repeatable)
    #[arg(long, value_name = "ARG", allow_hyphen_values = true)]
    pub judge_arg: Vec<String>,

    /// Refuse to start if a snapshot already exists
    #[arg(long)]
    pub fresh: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Rows in the final table
    #[arg(long, default_value = "20")]
    pub top: usize,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the ranking command
///
/// 1. Build configuration (file, then flags)
/// 2. Discover crashes and open storage
/// 3. Build the judge
/// 4. Run the controller with a progress bar
/// 5. Report
pub fn run(args: RunArgs, cancel: CancellationToken) -> Result<RunOutcome> {
    let config = build_config(&args)?;
    config.validate()?;

    let source = DirectoryItemSource::new(&args.crashes_dir, &args.pattern)?;
    let ids: Vec<ItemId> = source.list_ids()?.into_iter().collect();
    let mut storage = open_storage(&args)?;
    let judge = build_judge(&args, &ids, config.seed)?;

    tracing::info!(
        "Ranking {} crashes from {} into {}",
        ids.len(),
        args.crashes_dir.display(),
        args.output_dir.display()
    );

    let report = run_tournament(config, Arc::new(source), judge, &mut storage, &ids, cancel)?;
    report_results(&report, &args)?;

    Ok(report.outcome)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Config file (or defaults) with flag overrides applied
fn build_config(args: &RunArgs) -> Result<TournamentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config JSON in {}", path.display()))?
        }
        None => TournamentConfig::default(),
    };

    if let Some(k) = args.k {
        config.group_size = k;
    }
    if let Some(budget) = args.budget {
        config.budget = budget;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(every) = args.snapshot_every {
        config.snapshot_every = every;
    }
    if let Some(groups) = args.seed_groups {
        config.seed_groups = groups;
    }
    if let Some(selector) = args.selector {
        config.selector.kind = selector.into();
    }
    if let Some(delta_mu) = args.delta_mu {
        config.selector.delta_mu = delta_mu;
    }
    if let Some(cap) = args.max_evals_per_item {
        config.selector.max_evals_per_item = Some(cap);
    }
    if let Some(weight) = args.weight {
        config.weight = Some(weight);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(grace) = args.drain_grace {
        config = config.with_drain_grace(seconds("drain grace", grace)?);
    }

    Ok(config)
}

/// Non-negative, representable number of seconds
fn seconds(what: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative number of seconds, got {}", what, value))
}

fn open_storage(args: &RunArgs) -> Result<JsonlPersistence> {
    let storage = JsonlPersistence::open(&args.output_dir)?;
    if storage.has_snapshot() {
        if args.fresh {
            bail!(
                "snapshot already exists at {}; remove it or run without --fresh to resume",
                storage.snapshot_path().display()
            );
        }
        tracing::info!("Found snapshot at {}, resuming", storage.snapshot_path().display());
    }
    Ok(storage)
}

fn build_judge(args: &RunArgs, ids: &[ItemId], seed: u64) -> Result<Arc<dyn Judge>> {
    let judge: Arc<dyn Judge> = match args.judge {
        JudgeArg::Simulated => {
            let truth = match &args.truth {
                Some(path) => load_truth(path)?,
                None => random_truth(ids, seed),
            };
            Arc::new(SimulatedJudge::new(truth, args.noise, seed))
        }
        JudgeArg::Fixed => Arc::new(FixedJudge::new(args.fixed_order.into())),
        JudgeArg::Command => {
            let program = args
                .judge_command
                .clone()
                .context("--judge command requires --judge-command")?;
            let timeout = seconds("judge timeout", args.judge_timeout)?;
            Arc::new(CommandJudge::new(program, args.judge_arg.clone()).with_timeout(timeout))
        }
    };
    Ok(judge)
}

fn run_tournament(
    config: TournamentConfig,
    source: Arc<dyn ItemSource>,
    judge: Arc<dyn Judge>,
    storage: &mut JsonlPersistence,
    ids: &[ItemId],
    cancel: CancellationToken,
) -> Result<RunReport> {
    let progress = RunProgress::start(config.budget);

    let result = TournamentController::new(config, source, judge, storage)
        .with_cancellation(cancel)
        .run_with_progress(|p, ratings| {
            progress.update(p);
            if is_milestone(p) {
                let rows = ratings.standings(ids.iter());
                progress.println(format!(
                    "After {} evaluations, leaders: {}",
                    p.completed,
                    output::leaders_line(&rows, MILESTONE_LEADERS)
                ));
            }
        });

    progress.finish();
    Ok(result?)
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// The result just consumed brought the success count to a multiple of the milestone
fn is_milestone(progress: &Progress) -> bool {
    progress.last_succeeded && progress.completed > 0 && progress.completed % MILESTONE_EVERY == 0
}

fn report_results(report: &RunReport, args: &RunArgs) -> Result<()> {
    if args.json {
        let json = serde_json::to_string_pretty(report).context("failed to encode report")?;
        println!("{}", json);
    } else {
        output::print_summary(report, args.top);
    }
    Ok(())
}
