//! Terminal output: progress bar, standings table, run summary
//!
//! Level 4 - formatting utilities

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crashrank_core::StandingRow;
use crashrank_tournament::{Progress, RunReport};

/// Progress bar over the run budget, drawn on stderr
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn start(budget: u64) -> Self {
        let pb = ProgressBar::new(budget);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(200));
        Self { pb }
    }

    pub fn update(&self, progress: &Progress) {
        self.pb.set_position(progress.consumed());
        self.pb.set_message(format!(
            "ok {} / failed {} / in flight {}",
            progress.completed, progress.failed, progress.in_flight
        ));
    }

    /// Print a line above the bar
    pub fn println(&self, line: impl AsRef<str>) {
        self.pb.println(line);
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Ranked table of the top `limit` rows
pub fn standings_table(rows: &[StandingRow], limit: usize) -> String {
    let shown = &rows[..limit.min(rows.len())];
    let id_width = shown.iter().map(|r| r.id.len()).max().unwrap_or(2).max(2);

    let mut out = format!(
        "{:>4}  {:<width$}  {:>7}  {:>6}  {:>5}  {:>6}  {:>8}\n",
        "rank",
        "id",
        "mu",
        "sigma",
        "evals",
        "win %",
        "avg rank",
        width = id_width
    );
    for (i, row) in shown.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:>7.2}  {:>6.2}  {:>5}  {:>5.1}%  {:>8.2}\n",
            i + 1,
            row.id,
            row.mu,
            row.sigma,
            row.evals,
            row.win_rate * 100.0,
            row.avg_rank,
            width = id_width
        ));
    }
    if rows.len() > shown.len() {
        out.push_str(&format!("... {} more\n", rows.len() - shown.len()));
    }
    out
}

/// One-line summary of the current leaders
pub fn leaders_line(rows: &[StandingRow], n: usize) -> String {
    rows.iter()
        .take(n)
        .map(|r| format!("{} ({:.1}±{:.1})", r.id, r.mu, r.sigma))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_summary(report: &RunReport, limit: usize) {
    println!("\n=== Ranking {} ===", report.outcome);
    println!(
        "Evaluations: {} succeeded, {} failed ({} this run, {:.1}s)",
        report.completed,
        report.failed,
        report.evaluated_this_run(),
        report.elapsed_secs()
    );
    println!("Budget remaining: {} of {}", report.budget_remaining, report.budget);
    if report.discarded > 0 || report.abandoned > 0 {
        println!(
            "Stopped with work in flight: {} results discarded, {} abandoned",
            report.discarded, report.abandoned
        );
    }
    println!("Snapshot: {}", report.snapshot_location);
    println!();
    print!("{}", standings_table(&report.standings, limit));
}
