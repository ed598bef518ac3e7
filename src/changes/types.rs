use crate::changes::classify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of one commit as listed from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    pub parent_count: usize,
    pub is_test_commit: bool,
}

impl CommitRecord {
    /// Build a record, classifying it as test-related from its message and paths.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        short_id: String,
        message: String,
        author: String,
        email: String,
        timestamp: DateTime<Utc>,
        files: Vec<String>,
        additions: usize,
        deletions: usize,
        parent_count: usize,
    ) -> Self {
        let is_test_commit = classify::is_test_commit(&message, &files);
        Self {
            id,
            short_id,
            message,
            author,
            email,
            timestamp,
            files,
            additions,
            deletions,
            parent_count,
            is_test_commit,
        }
    }

    pub fn is_merge(&self) -> bool {
        self.parent_count > 1
    }

    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    pub fn summary(&self) -> CommitSummary {
        CommitSummary {
            id: self.id.clone(),
            short_id: self.short_id.clone(),
            message: self.message.clone(),
            author: self.author.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        };
        write!(f, "{}", label)
    }
}

/// Change to a single path between two revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    pub change_kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub additions: usize,
    pub deletions: usize,
    pub patch: String,
    #[serde(default)]
    pub patch_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_symbols: Vec<String>,
}

impl FileDelta {
    pub fn churn(&self) -> usize {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTotals {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
    pub net: i64,
}

impl ChangeTotals {
    pub fn from_deltas(deltas: &[FileDelta]) -> Self {
        let additions: usize = deltas.iter().map(|d| d.additions).sum();
        let deletions: usize = deltas.iter().map(|d| d.deletions).sum();
        Self {
            files: deltas.len(),
            additions,
            deletions,
            net: additions as i64 - deletions as i64,
        }
    }
}

/// One file's contribution to a preview excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub path: String,
    pub churn: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleExcerpt {
    pub entries: Vec<SampleEntry>,
    pub total_chars: usize,
}

/// Combined diff and metadata for a group of selected commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedChangeSet {
    pub base_revision: String,
    pub head_revision: String,
    pub commits: Vec<CommitSummary>,
    pub files: Vec<FileDelta>,
    pub totals: ChangeTotals,
    pub sample: SampleExcerpt,
}

impl AggregatedChangeSet {
    pub fn file(&self, path: &str) -> Option<&FileDelta> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Diff of a single commit against its first parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAnalysis {
    pub commit: CommitSummary,
    pub files: Vec<FileDelta>,
    pub totals: ChangeTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(path: &str, additions: usize, deletions: usize) -> FileDelta {
        FileDelta {
            path: path.to_string(),
            change_kind: ChangeKind::Modified,
            old_path: None,
            additions,
            deletions,
            patch: String::new(),
            patch_truncated: false,
            language: None,
            changed_symbols: Vec::new(),
        }
    }

    #[test]
    fn test_commit_record_classifies_on_construction() {
        let record = CommitRecord::new(
            "a".repeat(40),
            "aaaaaaa".into(),
            "Add unit tests for parser".into(),
            "dev".into(),
            "dev@example.com".into(),
            Utc::now(),
            vec!["tests/parser_test.go".into()],
            10,
            0,
            1,
        );
        assert!(record.is_test_commit);
        assert!(!record.is_merge());
        assert_eq!(record.subject(), "Add unit tests for parser");
    }

    #[test]
    fn test_change_totals_net_can_be_negative() {
        let totals = ChangeTotals::from_deltas(&[delta("a.rs", 2, 10), delta("b.rs", 1, 0)]);
        assert_eq!(totals.files, 2);
        assert_eq!(totals.additions, 3);
        assert_eq!(totals.deletions, 10);
        assert_eq!(totals.net, -7);
    }
}
