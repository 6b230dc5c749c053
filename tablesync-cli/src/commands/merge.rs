//! `tablesync merge`: reconcile the remote table with the snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tablesync_core::Config;
use tablesync_sync::{
    run_merge, HttpStore, LocalSource, MergeOptions, MergeRunReport, PhaseOutcome, SnapshotWrite,
};

/// Arguments for `tablesync merge`.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Show the snapshot diff without writing the file or the remote table.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl MergeArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let store = HttpStore::new(config);
        let options = MergeOptions {
            dry_run: self.dry_run,
        };
        let report = run_merge(&store, config, options)
            .with_context(|| format!("merge failed for table '{}'", config.table))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize merge report")?
            );
            return Ok(());
        }

        if self.dry_run {
            print_dry_run(&report);
        } else {
            print_summary(&report);
        }
        Ok(())
    }
}

fn print_dry_run(report: &MergeRunReport) {
    match &report.snapshot {
        SnapshotWrite::WouldWrite { path, diff } => {
            println!("[dry-run] would write: {}", path.display());
            for line in diff.lines() {
                println!("{}", colorize_diff_line(line));
            }
        }
        SnapshotWrite::Unchanged { path, .. } | SnapshotWrite::Written { path, .. } => {
            println!("[dry-run] no changes: {}", path.display());
        }
    }
    println!(
        "[dry-run] {} remote + {} local -> {} merged; remote table not modified",
        report.remote_records,
        local_count(&report.local),
        report.merged_records,
    );
}

fn print_summary(report: &MergeRunReport) {
    let marker = if report.remote_ok() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!(
        "{marker} merged {} remote + {} local -> {} records ({} replaced, {} appended, {} kept)",
        report.remote_records,
        local_count(&report.local),
        report.merged_records,
        report.stats.replaced,
        report.stats.appended,
        report.stats.kept,
    );

    if let LocalSource::Corrupt { reason } = &report.local {
        println!("  {} snapshot unreadable, merged as empty: {reason}", "warning:".yellow());
    }

    match &report.snapshot {
        SnapshotWrite::Written { path, .. } => println!("  snapshot  written    {}", path.display()),
        SnapshotWrite::Unchanged { path, .. } => {
            println!("  snapshot  {}  {}", "unchanged".dimmed(), path.display());
        }
        SnapshotWrite::WouldWrite { path, .. } => {
            println!("  snapshot  pending    {}", path.display());
        }
    }

    println!("  remote    ({})", report.replace_mode);
    for step in &report.replace {
        let outcome = match &step.outcome {
            PhaseOutcome::Done { records } => format!("{} {records} records", "ok".green()),
            PhaseOutcome::Skipped => "nothing to send".dimmed().to_string(),
            PhaseOutcome::Failed { status, message } => {
                let code = status.map_or_else(|| "no response".to_string(), |s| format!("HTTP {s}"));
                format!("{} ({code}): {message}", "failed".red().bold())
            }
        };
        println!("    {:<7} {outcome}", step.phase.to_string());
    }

    if !report.remote_ok() {
        println!(
            "The snapshot holds the merged records; rerun `tablesync merge` to retry the remote write."
        );
    }
}

fn local_count(local: &LocalSource) -> usize {
    match local {
        LocalSource::Loaded { records } => *records,
        LocalSource::Missing | LocalSource::Corrupt { .. } => 0,
    }
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}
