//! tablesync-sync: remote access, snapshot persistence and the two jobs.
//!
//! - [`remote`]: the [`RemoteStore`] seam and its HTTP implementation
//! - [`snapshot`]: local JSON snapshot, hash-gated atomic writes
//! - [`diff`]: dry-run unified diff of the snapshot
//! - [`pipeline`]: the merge run ([`run_merge`])
//! - [`enrich`]: the star-count refresh ([`run_update_stars`])

pub mod diff;
pub mod enrich;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod snapshot;

pub use enrich::{
    parse_repo_url, run_update_stars, EnrichReport, EnrichStatus, GitHubClient, MetricSource,
    RecordOutcome, RepoRef, SkipReason,
};
pub use error::{EnrichError, RemoteError, SyncError};
pub use pipeline::{
    run_merge, MergeOptions, MergeRunReport, PhaseOutcome, ReplacePhase, ReplaceStep,
};
pub use remote::{HttpStore, RemoteStore};
pub use snapshot::{LocalSource, SnapshotWrite};
