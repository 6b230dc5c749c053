//! `tablesync update-stars`: refresh star counts on the remote table.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use tablesync_core::Config;
use tablesync_sync::{
    run_update_stars, EnrichReport, EnrichStatus, GitHubClient, HttpStore, RecordOutcome,
    SkipReason,
};

/// Arguments for `tablesync update-stars`.
#[derive(Args, Debug)]
pub struct UpdateStarsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl UpdateStarsArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        if config.github_token.is_none() {
            tracing::warn!("GITHUB_TOKEN is not set; unauthenticated GitHub requests are rate limited");
        }

        let store = HttpStore::new(config);
        let github = GitHubClient::new(config);
        let report = run_update_stars(&store, &github, config)
            .with_context(|| format!("star refresh failed for table '{}'", config.table))?;

        if self.json {
            print_json(&report)?;
        } else {
            print_table(&report);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct EnrichReportJson {
    summary: EnrichSummaryJson,
    records: Vec<RecordOutcomeJson>,
}

#[derive(Serialize)]
struct EnrichSummaryJson {
    records: usize,
    updated: usize,
    unchanged: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Serialize)]
struct RecordOutcomeJson {
    index: usize,
    key: Option<String>,
    url: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stars: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct OutcomeTableRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "repository")]
    url: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_json(report: &EnrichReport) -> Result<()> {
    let payload = EnrichReportJson {
        summary: EnrichSummaryJson {
            records: report.outcomes.len(),
            updated: report.updated(),
            unchanged: report.unchanged(),
            skipped: report.skipped(),
            failed: report.failed(),
        },
        records: report.outcomes.iter().map(outcome_json).collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize star report JSON")?
    );
    Ok(())
}

fn outcome_json(outcome: &RecordOutcome) -> RecordOutcomeJson {
    let mut row = RecordOutcomeJson {
        index: outcome.index,
        key: outcome.key.as_ref().map(ToString::to_string),
        url: outcome.source_url.clone(),
        status: outcome.status.label(),
        previous: None,
        stars: None,
        reason: None,
        error: None,
    };
    match &outcome.status {
        EnrichStatus::Updated { previous, current } => {
            row.previous = Some(previous.clone());
            row.stars = Some(*current);
        }
        EnrichStatus::Unchanged { current } => row.stars = Some(*current),
        EnrichStatus::Skipped(reason) => row.reason = Some(*reason),
        EnrichStatus::Failed(err) => row.error = Some(err.to_string()),
    }
    row
}

fn print_table(report: &EnrichReport) {
    println!(
        "{} records | {} updated | {} unchanged | {} skipped | {} failed",
        report.outcomes.len(),
        report.updated().to_string().green().bold(),
        report.unchanged(),
        report.skipped().to_string().dimmed(),
        report.failed().to_string().red().bold(),
    );

    let rows: Vec<OutcomeTableRow> = report
        .outcomes
        .iter()
        .filter(|o| matches!(o.status, EnrichStatus::Updated { .. } | EnrichStatus::Failed(_)))
        .map(|o| OutcomeTableRow {
            key: o
                .key
                .as_ref()
                .map_or_else(|| format!("#{}", o.index), ToString::to_string),
            url: o.source_url.clone().unwrap_or_default(),
            status: status_label(&o.status),
            detail: status_detail(&o.status),
        })
        .collect();

    if rows.is_empty() {
        println!("No star counts changed.");
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: &EnrichStatus) -> String {
    match status {
        EnrichStatus::Updated { .. } => "UPDATED".to_string(),
        EnrichStatus::Unchanged { .. } => "UNCHANGED".to_string(),
        EnrichStatus::Skipped(_) => "SKIPPED".to_string(),
        EnrichStatus::Failed(_) => "FAILED".to_string(),
    }
}

fn status_detail(status: &EnrichStatus) -> String {
    match status {
        EnrichStatus::Updated { previous, current } => format!("{previous} -> {current}"),
        EnrichStatus::Unchanged { current } => current.to_string(),
        EnrichStatus::Skipped(SkipReason::MissingFields) => "missing fields".to_string(),
        EnrichStatus::Skipped(SkipReason::NoSourceUrl) => "no source URL".to_string(),
        EnrichStatus::Failed(err) => err.to_string(),
    }
}
