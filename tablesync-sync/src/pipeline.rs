//! Merge run: reconcile the remote table with the local snapshot and push the
//! result to both.
//!
//! ## Steps
//!
//! 1. Fetch every remote row. Any failure aborts before anything is touched.
//! 2. Load the snapshot; missing or corrupt counts as empty.
//! 3. Merge with the remote rows as primary, so remote wins ties.
//! 4. Persist the merge result to the snapshot (fatal on failure).
//! 5. Replace the remote rows with the merge result. Failures here are
//!    logged and reported, never raised: step 4 already holds a safe copy
//!    to retry from.
//!
//! With [`ReplaceMode::DeleteInsert`] the table is empty between the delete
//! and the insert call. A crash in that window leaves it empty until the next
//! run re-inserts the snapshot contents.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Map;

use tablesync_core::{
    merge::record_key, merge_with_stats, Config, MergeStats, Record, RecordKey, ReplaceMode, Side,
};

use crate::diff;
use crate::error::{RemoteError, SyncError};
use crate::remote::RemoteStore;
use crate::snapshot::{self, LocalSource, SnapshotWrite};

/// Options for a single merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Compute the merge and the snapshot diff, write nothing anywhere.
    pub dry_run: bool,
}

/// One remote write issued while replacing the table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePhase {
    Delete,
    Update,
    Insert,
}

impl fmt::Display for ReplacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacePhase::Delete => write!(f, "delete"),
            ReplacePhase::Update => write!(f, "update"),
            ReplacePhase::Insert => write!(f, "insert"),
        }
    }
}

/// Result of one [`ReplacePhase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The call succeeded for `records` rows.
    Done { records: usize },
    /// Nothing to send; no request was made.
    Skipped,
    /// The call failed; logged and carried on.
    Failed {
        status: Option<u16>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceStep {
    pub phase: ReplacePhase,
    pub outcome: PhaseOutcome,
}

/// Summary of a merge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeRunReport {
    pub remote_records: usize,
    pub local: LocalSource,
    pub merged_records: usize,
    pub stats: MergeStats,
    pub snapshot: SnapshotWrite,
    pub replace_mode: ReplaceMode,
    /// Empty on a dry run.
    pub replace: Vec<ReplaceStep>,
}

impl MergeRunReport {
    /// True when every remote write that was attempted succeeded.
    pub fn remote_ok(&self) -> bool {
        self.replace
            .iter()
            .all(|step| !matches!(step.outcome, PhaseOutcome::Failed { .. }))
    }
}

/// Run the merge job once against `store`.
pub fn run_merge<S>(
    store: &S,
    config: &Config,
    options: MergeOptions,
) -> Result<MergeRunReport, SyncError>
where
    S: RemoteStore + ?Sized,
{
    // Step 1: fetch-remote.
    let remote = store.list().map_err(SyncError::Fetch)?;
    tracing::info!(table = %config.table, records = remote.len(), "fetched remote table");

    // Step 2: load-local.
    let (local, local_source) = snapshot::load_or_empty(&config.snapshot_path);

    // Step 3: merge, remote as primary.
    let outcome = merge_with_stats(&remote, &local, &config.pk_field, &config.date_field)?;
    tracing::info!(
        merged = outcome.records.len(),
        replaced = outcome.stats.replaced,
        appended = outcome.stats.appended,
        "merged remote rows with local snapshot"
    );

    let mut report = MergeRunReport {
        remote_records: remote.len(),
        local: local_source,
        merged_records: outcome.records.len(),
        stats: outcome.stats,
        snapshot: SnapshotWrite::Unchanged {
            path: config.snapshot_path.clone(),
            digest: String::new(),
        },
        replace_mode: config.replace_mode,
        replace: Vec::new(),
    };

    if options.dry_run {
        if let Some(diff) = diff::snapshot_diff(&config.snapshot_path, &outcome.records)? {
            tracing::info!("[dry-run] would write: {}", config.snapshot_path.display());
            report.snapshot = SnapshotWrite::WouldWrite {
                path: config.snapshot_path.clone(),
                diff,
            };
        } else {
            let rendered = snapshot::render(&outcome.records)?;
            report.snapshot = SnapshotWrite::Unchanged {
                path: config.snapshot_path.clone(),
                digest: snapshot::sha256_hex(rendered.as_bytes()),
            };
        }
        return Ok(report);
    }

    // Step 4: persist-local.
    report.snapshot = snapshot::save(&config.snapshot_path, &outcome.records)?;

    // Step 5: replace-remote.
    report.replace = match config.replace_mode {
        ReplaceMode::DeleteInsert => {
            replace_delete_insert(store, &remote, &outcome.records, &config.pk_field)
        }
        ReplaceMode::Upsert => {
            replace_upsert(store, &remote, &outcome.records, &config.pk_field)?
        }
    };

    Ok(report)
}

fn replace_delete_insert<S>(
    store: &S,
    remote: &[Record],
    merged: &[Record],
    pk_field: &str,
) -> Vec<ReplaceStep>
where
    S: RemoteStore + ?Sized,
{
    let selectors: Vec<Record> = remote
        .iter()
        .filter_map(|record| selector(record, pk_field))
        .collect();

    vec![
        run_phase(ReplacePhase::Delete, selectors.len(), || {
            store.bulk_delete(&selectors)
        }),
        run_phase(ReplacePhase::Insert, merged.len(), || store.bulk_insert(merged)),
    ]
}

fn replace_upsert<S>(
    store: &S,
    remote: &[Record],
    merged: &[Record],
    pk_field: &str,
) -> Result<Vec<ReplaceStep>, SyncError>
where
    S: RemoteStore + ?Sized,
{
    let remote_keys = keys_of(remote, pk_field, Side::Primary)?;
    let merged_keys = keys_of(merged, pk_field, Side::Primary)?;

    let remote_set: HashSet<&RecordKey> = remote_keys.iter().collect();
    let mut existing = Vec::new();
    let mut fresh = Vec::new();
    for (record, key) in merged.iter().zip(&merged_keys) {
        if remote_set.contains(key) {
            existing.push(record.clone());
        } else {
            fresh.push(record.clone());
        }
    }

    let merged_set: HashSet<&RecordKey> = merged_keys.iter().collect();
    let stale: Vec<Record> = remote
        .iter()
        .zip(&remote_keys)
        .filter(|(_, key)| !merged_set.contains(key))
        .filter_map(|(record, _)| selector(record, pk_field))
        .collect();

    Ok(vec![
        run_phase(ReplacePhase::Update, existing.len(), || {
            store.bulk_update(&existing)
        }),
        run_phase(ReplacePhase::Insert, fresh.len(), || store.bulk_insert(&fresh)),
        run_phase(ReplacePhase::Delete, stale.len(), || store.bulk_delete(&stale)),
    ])
}

fn keys_of(records: &[Record], pk_field: &str, side: Side) -> Result<Vec<RecordKey>, SyncError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| record_key(record, pk_field, side, index).map_err(SyncError::from))
        .collect()
}

/// `{pk_field: value}` addressing `record` by its original key value.
fn selector(record: &Record, pk_field: &str) -> Option<Record> {
    let value = record.get(pk_field)?;
    let mut sel = Map::new();
    sel.insert(pk_field.to_string(), value.clone());
    Some(sel)
}

fn run_phase<F>(phase: ReplacePhase, records: usize, call: F) -> ReplaceStep
where
    F: FnOnce() -> Result<(), RemoteError>,
{
    if records == 0 {
        tracing::debug!(%phase, "nothing to send; skipping");
        return ReplaceStep {
            phase,
            outcome: PhaseOutcome::Skipped,
        };
    }

    let outcome = match call() {
        Ok(()) => {
            tracing::info!(%phase, records, "remote {phase} succeeded");
            PhaseOutcome::Done { records }
        }
        Err(err) => {
            tracing::error!(%phase, status = ?err.status(), error = %err, "remote {phase} failed");
            PhaseOutcome::Failed {
                status: err.status(),
                message: err.to_string(),
            }
        }
    };
    ReplaceStep { phase, outcome }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_keeps_original_key_value() {
        let record: Record = serde_json::from_value(json!({"id": "7", "name": "x"})).unwrap();
        let sel = selector(&record, "id").unwrap();
        assert_eq!(serde_json::Value::Object(sel), json!({"id": "7"}));
    }

    #[test]
    fn empty_phase_is_skipped_without_calling() {
        let step = run_phase(ReplacePhase::Insert, 0, || panic!("must not be called"));
        assert_eq!(step.outcome, PhaseOutcome::Skipped);
    }

    #[test]
    fn failed_phase_records_status() {
        let step = run_phase(ReplacePhase::Delete, 2, || {
            Err(RemoteError::Status {
                method: "DELETE",
                url: "http://x/bulk/t".into(),
                status: 503,
                body: "busy".into(),
            })
        });
        match step.outcome {
            PhaseOutcome::Failed { status, message } => {
                assert_eq!(status, Some(503));
                assert!(message.contains("busy"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn report_remote_ok_tracks_failures() {
        let mut report = MergeRunReport {
            remote_records: 0,
            local: LocalSource::Missing,
            merged_records: 0,
            stats: MergeStats::default(),
            snapshot: SnapshotWrite::Unchanged {
                path: "tools.json".into(),
                digest: String::new(),
            },
            replace_mode: ReplaceMode::DeleteInsert,
            replace: vec![ReplaceStep {
                phase: ReplacePhase::Insert,
                outcome: PhaseOutcome::Done { records: 1 },
            }],
        };
        assert!(report.remote_ok());
        report.replace.push(ReplaceStep {
            phase: ReplacePhase::Delete,
            outcome: PhaseOutcome::Failed {
                status: None,
                message: "refused".into(),
            },
        });
        assert!(!report.remote_ok());
    }
}
