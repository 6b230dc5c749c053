//! In-memory doubles for the remote table and the metric service.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use tablesync_core::{Collection, Config, Record};
use tablesync_sync::{EnrichError, MetricSource, RemoteError, RemoteStore, RepoRef};

/// One call received by [`FakeStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Delete(Vec<Record>),
    Insert(Vec<Record>),
    Update(Vec<Record>),
    Patch(String, Record),
}

/// Remote table double. Records every call; failures are opt-in per method.
#[derive(Default)]
pub struct FakeStore {
    pub rows: Collection,
    pub list_status: Option<u16>,
    pub fail_delete: Option<u16>,
    pub fail_insert: Option<u16>,
    pub fail_update: Option<u16>,
    pub fail_patch: Option<u16>,
    pub calls: RefCell<Vec<Call>>,
}

impl FakeStore {
    pub fn with_rows(rows: Value) -> Self {
        Self {
            rows: records(rows),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Every call except the initial `List`.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    fn outcome(method: &'static str, status: Option<u16>) -> Result<(), RemoteError> {
        match status {
            Some(status) => Err(RemoteError::Status {
                method,
                url: "http://fake/bulk/tools".to_string(),
                status,
                body: "rejected".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl RemoteStore for FakeStore {
    fn list(&self) -> Result<Collection, RemoteError> {
        self.calls.borrow_mut().push(Call::List);
        if let Some(status) = self.list_status {
            return Err(RemoteError::Status {
                method: "GET",
                url: "http://fake/tools".to_string(),
                status,
                body: "Internal Server Error".to_string(),
            });
        }
        Ok(self.rows.clone())
    }

    fn bulk_delete(&self, selectors: &[Record]) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::Delete(selectors.to_vec()));
        Self::outcome("DELETE", self.fail_delete)
    }

    fn bulk_insert(&self, records: &[Record]) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::Insert(records.to_vec()));
        Self::outcome("POST", self.fail_insert)
    }

    fn bulk_update(&self, records: &[Record]) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::Update(records.to_vec()));
        Self::outcome("PATCH", self.fail_update)
    }

    fn patch(&self, row_id: &str, fields: &Record) -> Result<(), RemoteError> {
        self.calls
            .borrow_mut()
            .push(Call::Patch(row_id.to_string(), fields.clone()));
        Self::outcome("PATCH", self.fail_patch)
    }
}

/// Metric service double keyed by `owner/name`. Unknown repos answer 404.
#[derive(Default)]
pub struct FakeMetrics {
    pub stars: HashMap<String, u64>,
    pub lookups: RefCell<Vec<String>>,
}

impl FakeMetrics {
    pub fn with(entries: &[(&str, u64)]) -> Self {
        Self {
            stars: entries
                .iter()
                .map(|(repo, n)| ((*repo).to_string(), *n))
                .collect(),
            ..Self::default()
        }
    }
}

impl MetricSource for FakeMetrics {
    fn star_count(&self, repo: &RepoRef) -> Result<u64, EnrichError> {
        let name = repo.to_string();
        self.lookups.borrow_mut().push(name.clone());
        self.stars
            .get(&name)
            .copied()
            .ok_or_else(|| {
                EnrichError::Lookup(RemoteError::Status {
                    method: "GET",
                    url: format!("https://api.github.com/repos/{name}"),
                    status: 404,
                    body: "Not Found".to_string(),
                })
            })
    }
}

pub fn records(value: Value) -> Collection {
    serde_json::from_value(value).expect("records fixture")
}

/// Config pointing the snapshot at `snapshot`, with optional overrides.
pub fn config(snapshot: &Path, overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("NC_TABLE_NAME", "tools"),
        ("NC_PROJECT_SLUG", "awesome"),
        ("NC_XC_KEY", "secret-token"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    vars.insert(
        "JSON_FILE".to_string(),
        snapshot.display().to_string(),
    );
    for (k, v) in overrides {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}
