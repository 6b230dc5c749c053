//! Error types for tablesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use tablesync_core::MergeError;

/// A failed call against the remote store or the metric service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server answered with a non-2xx status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// No usable response (connection refused, timeout, TLS, ...).
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: &'static str,
        url: String,
        message: String,
    },

    /// A 2xx response whose body does not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Payload { url: String, reason: String },
}

impl RemoteError {
    /// HTTP status, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_ureq(method: &'static str, url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => RemoteError::Status {
                method,
                url: url.to_string(),
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => RemoteError::Transport {
                method,
                url: url.to_string(),
                message: transport.to_string(),
            },
        }
    }
}

/// Errors that abort a merge run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote table could not be read; nothing was changed.
    #[error("failed to fetch remote table: {0}")]
    Fetch(#[source] RemoteError),

    /// The remote rows and the snapshot could not be reconciled.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (snapshot).
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-record failure of the enrichment job. Never aborts the batch.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The source URL does not name an `owner/repo` pair.
    #[error("cannot read a repository from {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The record's primary key cannot address a row update.
    #[error("record has no usable primary key: {0}")]
    InvalidKey(#[from] MergeError),

    /// The metric service request failed.
    #[error("metric lookup failed: {0}")]
    Lookup(#[source] RemoteError),

    /// The metric service answered without the metric.
    #[error("response from {url} has no `{field}` count")]
    MissingMetric { url: String, field: &'static str },

    /// The row update was rejected by the remote store.
    #[error("row update failed: {0}")]
    Update(#[source] RemoteError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
