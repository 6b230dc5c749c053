//! Local snapshot: the JSON file holding the last merge result.
//!
//! ## Layout
//!
//! A UTF-8 JSON array of record objects, two-space indented, object keys
//! sorted at every depth, no trailing newline.
//!
//! Non-ASCII text is written as is, not `\u` escaped. Integers are exact
//! within the `i64`/`u64` range; larger ones are read as floats, so a file
//! holding them is rewritten in float form on the first run that touches it.
//!
//! ## `save` protocol
//!
//! 1. Render the records.
//! 2. SHA-256 the rendered bytes and the bytes currently on disk.
//! 3. Identical digests → skip, report [`SnapshotWrite::Unchanged`].
//! 4. Write to `<path>.tablesync.tmp`.
//! 5. Rename to the final path (atomic on POSIX); remove the tmp file if the
//!    rename fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use tablesync_core::{Collection, Record};

use crate::error::{io_err, SyncError};

/// Outcome of persisting the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SnapshotWrite {
    /// The file was (re)written.
    Written { path: PathBuf, digest: String },
    /// The file already held exactly these bytes.
    Unchanged { path: PathBuf, digest: String },
    /// Dry run: the file *would* have been rewritten.
    WouldWrite { path: PathBuf, diff: String },
}

/// How the snapshot read at the start of a merge run turned out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocalSource {
    /// No file yet; merged against an empty collection.
    Missing,
    /// Parsed successfully.
    Loaded { records: usize },
    /// Unreadable or not a JSON array of objects; merged against an empty
    /// collection.
    Corrupt { reason: String },
}

/// Render records in the snapshot layout.
pub fn render(records: &[Record]) -> Result<String, SyncError> {
    let sorted: Vec<Value> = records
        .iter()
        .map(|record| sort_keys(&Value::Object(record.clone())))
        .collect();
    Ok(serde_json::to_string_pretty(&sorted)?)
}

/// Read the snapshot at `path`. `Ok(None)` when the file does not exist.
pub fn load(path: &Path) -> Result<Option<Collection>, SyncError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Read the snapshot, degrading to an empty collection when it is missing or
/// unusable. A corrupt file is logged, never fatal.
pub fn load_or_empty(path: &Path) -> (Collection, LocalSource) {
    match load(path) {
        Ok(Some(records)) => {
            let source = LocalSource::Loaded {
                records: records.len(),
            };
            (records, source)
        }
        Ok(None) => {
            tracing::info!(path = %path.display(), "no local snapshot yet");
            (Vec::new(), LocalSource::Missing)
        }
        Err(err) => {
            tracing::error!(
                path = %path.display(),
                error = %err,
                "failed to read local snapshot; continuing with an empty one"
            );
            (
                Vec::new(),
                LocalSource::Corrupt {
                    reason: err.to_string(),
                },
            )
        }
    }
}

/// Overwrite the snapshot at `path` with `records`.
pub fn save(path: &Path, records: &[Record]) -> Result<SnapshotWrite, SyncError> {
    let tmp = PathBuf::from(format!("{}.tablesync.tmp", path.display()));
    save_with_tmp(path, records, &tmp)
}

fn save_with_tmp(path: &Path, records: &[Record], tmp: &Path) -> Result<SnapshotWrite, SyncError> {
    let content = render(records)?;
    let digest = sha256_hex(content.as_bytes());

    match std::fs::read(path) {
        Ok(existing) if sha256_hex(&existing) == digest => {
            tracing::debug!("snapshot unchanged: {}", path.display());
            return Ok(SnapshotWrite::Unchanged {
                path: path.to_path_buf(),
                digest,
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, &content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!(records = records.len(), "wrote snapshot: {}", path.display());
    Ok(SnapshotWrite::Written {
        path: path.to_path_buf(),
        digest,
    })
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Rebuild `value` with object keys inserted in sorted order, so the output
/// is sorted whatever map implementation serde_json was built with.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
