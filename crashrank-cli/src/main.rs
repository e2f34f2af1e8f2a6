//! crashrank CLI - Command-line interface
//!
//! Commands:
//! - run: Rank a directory of crash reports by exploitability
//! - replay: Rebuild ratings from the observation log
//! - show: Print the standings stored in a snapshot

mod output;
mod replay_cmd;
mod run_cmd;
mod show_cmd;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crashrank_tournament::{CancellationToken, RunOutcome};

/// Exit code for a run stopped by the failure thresholds
const EXIT_ABORTED: u8 = 2;
/// Exit code for a run stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "crashrank")]
#[command(about = "Rank crash reports by exploitability with small-group judgments")]
#[command(version)]
struct Cli {
    /// Debug logging (overrides CRASHRANK_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) a ranking tournament
    Run(run_cmd::RunArgs),
    /// Rebuild ratings from the observation log
    Replay(replay_cmd::ReplayArgs),
    /// Print the standings stored in a snapshot
    Show(show_cmd::ShowArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("CRASHRANK_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let token = CancellationToken::new();
            spawn_signal_handler(token.clone());

            let outcome = tokio::task::spawn_blocking(move || run_cmd::run(args, token))
                .await
                .context("ranking task failed to complete")??;
            Ok(ExitCode::from(exit_code(&outcome)))
        }
        Commands::Replay(args) => {
            replay_cmd::run(args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show(args) => {
            show_cmd::run(args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First Ctrl-C stops dispatch and drains; a second one exits at once
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, finishing in-flight evaluations (Ctrl-C again to quit)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt, exiting without a final snapshot");
            std::process::exit(EXIT_INTERRUPTED as i32);
        }
    });
}

fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Completed | RunOutcome::Exhausted => 0,
        RunOutcome::Aborted(_) => EXIT_ABORTED,
        RunOutcome::Interrupted => EXIT_INTERRUPTED,
    }
}
