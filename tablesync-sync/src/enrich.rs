//! Star-count enrichment: refresh the metric field of every row that links a
//! GitHub repository, straight against the remote table.
//!
//! The local snapshot is not read or written. Each row produces a
//! [`RecordOutcome`]; a failing row is logged and the batch moves on.
//!
//! Updating a row also bumps its timestamp field, so the next merge run
//! prefers the remote copy of that row over pending local edits.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use tablesync_core::{
    merge::record_key, types::TIMESTAMP_FORMAT, Config, Record, RecordKey, Side,
};

use crate::error::{EnrichError, RemoteError, SyncError};
use crate::remote::RemoteStore;

/// Field of the GitHub repository payload holding the star count.
pub const STAR_FIELD: &str = "stargazers_count";

// ---------------------------------------------------------------------------
// Repository references
// ---------------------------------------------------------------------------

/// `owner/name` of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Read `owner/name` from a URL such as `https://github.com/owner/repo/tree/main`.
///
/// The first two path segments are used; anything after them is ignored.
pub fn parse_repo_url(raw: &str) -> Result<RepoRef, EnrichError> {
    let invalid = |reason: &str| EnrichError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    let mut segments = url
        .path_segments()
        .ok_or_else(|| invalid("URL has no path"))?
        .filter(|s| !s.is_empty());

    let owner = segments
        .next()
        .ok_or_else(|| invalid("expected /owner/repo in the path"))?;
    let name = segments
        .next()
        .map(|s| s.strip_suffix(".git").unwrap_or(s))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("expected /owner/repo in the path"))?;

    Ok(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Metric source
// ---------------------------------------------------------------------------

/// Where current star counts come from.
pub trait MetricSource {
    fn star_count(&self, repo: &RepoRef) -> Result<u64, EnrichError>;
}

/// [`MetricSource`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    agent: ureq::Agent,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.http_timeout)
            .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_url: config.github_api_url.clone(),
            token: config.github_token.clone(),
        }
    }
}

impl MetricSource for GitHubClient {
    fn star_count(&self, repo: &RepoRef) -> Result<u64, EnrichError> {
        let url = format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.name);
        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let response = request
            .call()
            .map_err(|e| EnrichError::Lookup(RemoteError::from_ureq("GET", &url, e)))?;
        let body: Value = response.into_json().map_err(|e| {
            EnrichError::Lookup(RemoteError::Payload {
                url: url.clone(),
                reason: e.to_string(),
            })
        })?;

        body.get(STAR_FIELD)
            .and_then(Value::as_u64)
            .ok_or(EnrichError::MissingMetric {
                url,
                field: STAR_FIELD,
            })
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Why a row was not looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The row lacks the source-URL or the metric field.
    MissingFields,
    /// The source-URL field is null, not a string, or not an http(s) link.
    NoSourceUrl,
}

/// What happened to one row.
#[derive(Debug)]
pub enum EnrichStatus {
    Updated { previous: Value, current: u64 },
    Unchanged { current: u64 },
    Skipped(SkipReason),
    Failed(EnrichError),
}

impl EnrichStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EnrichStatus::Updated { .. } => "updated",
            EnrichStatus::Unchanged { .. } => "unchanged",
            EnrichStatus::Skipped(_) => "skipped",
            EnrichStatus::Failed(_) => "failed",
        }
    }
}

/// Outcome for the row at `index` of the fetched table.
#[derive(Debug)]
pub struct RecordOutcome {
    pub index: usize,
    pub key: Option<RecordKey>,
    pub source_url: Option<String>,
    pub status: EnrichStatus,
}

/// Per-row outcomes of one enrichment run, in table order.
#[derive(Debug, Default)]
pub struct EnrichReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl EnrichReport {
    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status.label() == label)
            .count()
    }

    pub fn updated(&self) -> usize {
        self.count("updated")
    }

    pub fn unchanged(&self) -> usize {
        self.count("unchanged")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Run the enrichment job once.
///
/// Only a failure to fetch the table is returned as an error; everything
/// per-row ends up in the [`EnrichReport`].
pub fn run_update_stars<S, M>(
    store: &S,
    metrics: &M,
    config: &Config,
) -> Result<EnrichReport, SyncError>
where
    S: RemoteStore + ?Sized,
    M: MetricSource + ?Sized,
{
    let rows = store.list().map_err(SyncError::Fetch)?;
    tracing::info!(table = %config.table, records = rows.len(), "fetched remote table");

    let mut report = EnrichReport::default();
    for (index, record) in rows.iter().enumerate() {
        let outcome = enrich_record(store, metrics, config, index, record);
        if let EnrichStatus::Failed(err) = &outcome.status {
            tracing::warn!(
                index,
                key = ?outcome.key,
                url = ?outcome.source_url,
                error = %err,
                "failed to refresh star count"
            );
        }
        report.outcomes.push(outcome);
    }

    tracing::info!(
        updated = report.updated(),
        unchanged = report.unchanged(),
        skipped = report.skipped(),
        failed = report.failed(),
        "star refresh finished"
    );
    Ok(report)
}

fn enrich_record<S, M>(
    store: &S,
    metrics: &M,
    config: &Config,
    index: usize,
    record: &Record,
) -> RecordOutcome
where
    S: RemoteStore + ?Sized,
    M: MetricSource + ?Sized,
{
    let key = record_key(record, &config.pk_field, Side::Primary, index);
    let mut outcome = RecordOutcome {
        index,
        key: key.as_ref().ok().cloned(),
        source_url: None,
        status: EnrichStatus::Skipped(SkipReason::MissingFields),
    };

    let (Some(source), Some(stored)) = (
        record.get(&config.source_url_field),
        record.get(&config.metric_field),
    ) else {
        return outcome;
    };
    let Some(source) = source.as_str().filter(|s| s.contains("http")) else {
        outcome.status = EnrichStatus::Skipped(SkipReason::NoSourceUrl);
        return outcome;
    };
    outcome.source_url = Some(source.to_string());

    let pk = record.get(&config.pk_field);
    outcome.status = match refresh(store, metrics, config, key, pk, source, stored) {
        Ok(status) => status,
        Err(err) => EnrichStatus::Failed(err),
    };
    outcome
}

fn refresh<S, M>(
    store: &S,
    metrics: &M,
    config: &Config,
    key: Result<RecordKey, tablesync_core::MergeError>,
    pk: Option<&Value>,
    source: &str,
    stored: &Value,
) -> Result<EnrichStatus, EnrichError>
where
    S: RemoteStore + ?Sized,
    M: MetricSource + ?Sized,
{
    let repo = parse_repo_url(source)?;
    let current = metrics.star_count(&repo)?;

    if stored_count(stored) == Some(current) {
        tracing::debug!(repo = %repo, stars = current, "star count unchanged");
        return Ok(EnrichStatus::Unchanged { current });
    }

    let key = key?;
    let mut fields = Map::new();
    fields.insert(config.metric_field.clone(), Value::from(current));
    fields.insert(
        config.date_field.clone(),
        Value::String(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
    );
    store
        .patch(&row_id(pk, &key), &fields)
        .map_err(EnrichError::Update)?;

    tracing::info!(key = %key, repo = %repo, stars = current, "updated star count");
    Ok(EnrichStatus::Updated {
        previous: stored.clone(),
        current,
    })
}

/// Primary key as the remote table spells it. Text keys are sent verbatim
/// (`"007"` stays `007`); numeric keys use their integer form.
fn row_id(pk: Option<&Value>, key: &RecordKey) -> String {
    match pk {
        Some(Value::String(text)) => text.clone(),
        _ => key.to_string(),
    }
}

/// Stored metric as a count; numeric strings are accepted.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stored_count(stored: &Value) -> Option<u64> {
    match stored {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
