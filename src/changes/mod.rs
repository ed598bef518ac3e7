//! Change aggregation over revision history.
//!
//! - `types`: commit records, file deltas and the aggregated change set
//! - `classify`: test-commit heuristics
//! - `aggregate`: commit listing, window-diff aggregation, per-commit analysis
//! - `related`: co-change ranking
//! - `symbols`: language detection and changed-symbol extraction

pub mod aggregate;
pub mod classify;
pub mod related;
pub mod symbols;
pub mod types;

pub use aggregate::{AggregationLimits, ChangeAggregator, build_sample, count_patch_lines};
pub use related::{RELATED_LIMIT, RelatedFile, rank_co_changes};
pub use types::{
    AggregatedChangeSet, ChangeKind, ChangeTotals, CommitAnalysis, CommitRecord, CommitSummary,
    FileDelta, SampleEntry, SampleExcerpt,
};
