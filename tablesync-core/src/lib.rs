//! tablesync core library: record model, reconciliation, configuration.
//!
//! - [`types`]: records, normalised keys, timestamp parsing
//! - [`merge`]: last-writer-wins reconciliation of two collections
//! - [`config`]: process configuration built once at startup
//! - [`error`]: [`MergeError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod merge;
pub mod types;

pub use config::{Config, ReplaceMode};
pub use error::{ConfigError, MergeError, Side};
pub use merge::{merge, merge_with_stats, MergeOutcome, MergeStats};
pub use types::{parse_timestamp, Collection, ProjectSlug, Record, RecordKey, TableName};
