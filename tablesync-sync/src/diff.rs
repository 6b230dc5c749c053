//! Dry-run unified diff of the snapshot file.

use std::io::ErrorKind;
use std::path::Path;

use similar::TextDiff;

use tablesync_core::Record;

use crate::snapshot;
use crate::SyncError;

/// Diff the snapshot currently at `path` against what a merge would write.
///
/// Returns `None` when the rendered snapshot is byte-identical to the file.
/// A missing or unreadable file diffs as empty, the same way a real run loads
/// it. No files are written.
pub fn snapshot_diff(path: &Path, merged: &[Record]) -> Result<Option<String>, SyncError> {
    let rendered = snapshot::render(merged)?;
    let existing = read_existing_or_empty(path);
    if existing == rendered {
        return Ok(None);
    }

    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let old_header = format!("a/{name}");
    let new_header = format!("b/{name}");
    let unified = TextDiff::from_lines(&existing, &rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();
    Ok(Some(unified))
}

fn read_existing_or_empty(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content.replace("\r\n", "\n"),
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "snapshot unreadable; diffing against an empty one"
            );
            String::new()
        }
    }
}
