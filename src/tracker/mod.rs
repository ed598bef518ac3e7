//! Read-only access to revision history.
//!
//! The [`RevisionStore`] trait is the contract the change aggregator consumes;
//! [`GitStore`] implements it over a local or cloned git repository.

pub mod git;

pub use git::GitStore;

use crate::changes::{ChangeKind, CommitRecord};
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known id of git's empty tree, used as the base for root commits.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Filters applied while walking history.
#[derive(Debug, Clone, Default)]
pub struct CommitFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring of author name or email.
    pub author: Option<String>,
    pub exclude_merges: bool,
    pub exclude_test_commits: bool,
}

impl CommitFilter {
    /// Checks that need only commit metadata, so a store can reject a commit
    /// before computing its diff.
    pub fn accepts_header(
        &self,
        timestamp: DateTime<Utc>,
        author: &str,
        email: &str,
        parent_count: usize,
    ) -> bool {
        if let Some(since) = self.since
            && timestamp < since
        {
            return false;
        }
        if let Some(until) = self.until
            && timestamp > until
        {
            return false;
        }
        if let Some(ref needle) = self.author {
            let needle = needle.to_lowercase();
            if !author.to_lowercase().contains(&needle) && !email.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        !(self.exclude_merges && parent_count > 1)
    }

    pub fn accepts(&self, record: &CommitRecord) -> bool {
        if !self.accepts_header(
            record.timestamp,
            &record.author,
            &record.email,
            record.parent_count,
        ) {
            return false;
        }
        !(self.exclude_test_commits && record.is_test_commit)
    }
}

/// Raw per-path diff as produced by the store. Line counts are derived by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PathDiff {
    pub path: String,
    pub old_path: Option<String>,
    pub change_kind: ChangeKind,
    pub patch: String,
}

/// Commit metadata together with its full patch against the first parent.
#[derive(Debug, Clone)]
pub struct CommitDetail {
    pub record: CommitRecord,
    pub parents: Vec<String>,
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
    pub upstream: Option<String>,
}

/// Read-only revision history. All failures surface as [`StoreError`].
pub trait RevisionStore {
    /// Commits reachable from `reference` (HEAD when `None`), newest first.
    fn list_commits(
        &self,
        reference: Option<&str>,
        max_count: usize,
        filter: &CommitFilter,
    ) -> Result<Vec<CommitRecord>, StoreError>;

    /// Resolve a full or abbreviated id (or any revspec) to a commit.
    fn resolve(&self, id: &str) -> Result<CommitRecord, StoreError>;

    fn commit_detail(&self, id: &str) -> Result<CommitDetail, StoreError>;

    /// First parent id, or `None` for a root commit.
    fn first_parent(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Diff two revisions as whole trees. `base` may be [`EMPTY_TREE`].
    fn diff_between(&self, base: &str, head: &str) -> Result<Vec<PathDiff>, StoreError>;

    fn list_branches(&self) -> Result<Vec<BranchInfo>, StoreError>;

    /// Up to `max_count` most recent commits that touched `path`.
    fn history_for_path(&self, path: &str, max_count: usize)
    -> Result<Vec<CommitRecord>, StoreError>;

    /// File content at a revision; `Ok(None)` when the path does not exist there.
    fn file_content_at(&self, id: &str, path: &str) -> Result<Option<String>, StoreError>;

    fn default_branch(&self) -> Result<String, StoreError>;
}
