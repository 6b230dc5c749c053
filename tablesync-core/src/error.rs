//! Error types for tablesync-core.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::types::RecordKey;

/// Which input of a merge a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Primary,
    Secondary,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Primary => write!(f, "primary"),
            Side::Secondary => write!(f, "secondary"),
        }
    }
}

/// Errors that abort a merge before any result is produced.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A record lacks the primary-key or timestamp field.
    #[error("{side} record #{index} is missing required field `{field}`")]
    MalformedRecord {
        side: Side,
        index: usize,
        field: String,
    },

    /// The primary-key value cannot be normalised (null, boolean, fraction, ...).
    #[error("{side} record #{index} has an unusable primary key in `{field}`: {value}")]
    InvalidKey {
        side: Side,
        index: usize,
        field: String,
        value: Value,
    },

    /// The timestamp field is not a parseable date/time string.
    #[error("{side} record {key} has an unparseable timestamp in `{field}`: {value}")]
    UnparseableTimestamp {
        side: Side,
        key: RecordKey,
        field: String,
        value: Value,
    },
}

/// Errors raised while building [`crate::Config`] at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent or blank.
    #[error("missing required configuration variable {0}")]
    Missing(&'static str),

    /// A variable is present but cannot be interpreted.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
