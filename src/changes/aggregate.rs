use crate::changes::related::{RELATED_LIMIT, RelatedFile, rank_co_changes};
use crate::changes::symbols::{changed_symbols, detect_language};
use crate::changes::{
    AggregatedChangeSet, ChangeTotals, CommitAnalysis, CommitRecord, FileDelta, SampleEntry,
    SampleExcerpt,
};
use crate::errors::{AggregationError, StoreError};
use crate::tracker::{BranchInfo, CommitFilter, EMPTY_TREE, PathDiff, RevisionStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Size caps applied while aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationLimits {
    /// Largest files included in the sample excerpt.
    pub sample_files: usize,
    /// Patch characters per sampled file.
    pub sample_file_chars: usize,
    /// Total characters across the sample excerpt.
    pub sample_total_chars: usize,
    /// Per-file patch cap kept on each `FileDelta`. Counts are taken before truncation.
    pub max_patch_chars: usize,
}

impl Default for AggregationLimits {
    fn default() -> Self {
        Self {
            sample_files: 3,
            sample_file_chars: 1000,
            sample_total_chars: 5000,
            max_patch_chars: 20_000,
        }
    }
}

/// Commit selection, classification and diff aggregation over a [`RevisionStore`].
pub struct ChangeAggregator<'a, S: RevisionStore + ?Sized> {
    store: &'a S,
    limits: AggregationLimits,
}

impl<'a, S: RevisionStore + ?Sized> ChangeAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            limits: AggregationLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: AggregationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// List commits newest first, applying `filter` during traversal.
    ///
    /// An unknown `reference` is retried once against the default branch
    /// before failing with `HistoryUnavailable`.
    pub fn list_commits(
        &self,
        reference: Option<&str>,
        max_count: usize,
        filter: &CommitFilter,
    ) -> Result<Vec<CommitRecord>, AggregationError> {
        match self.store.list_commits(reference, max_count, filter) {
            Ok(commits) => Ok(commits),
            Err(err) if err.is_unknown_revision() && reference.is_some() => {
                let fallback = self.store.default_branch().map_err(|source| {
                    AggregationError::HistoryUnavailable {
                        reference: reference.unwrap_or("HEAD").to_string(),
                        source,
                    }
                })?;
                warn!(
                    reference = reference.unwrap_or_default(),
                    fallback = %fallback,
                    "reference not found, retrying against default branch"
                );
                self.store
                    .list_commits(Some(&fallback), max_count, filter)
                    .map_err(|source| AggregationError::HistoryUnavailable {
                        reference: fallback,
                        source,
                    })
            }
            Err(source) => Err(AggregationError::HistoryUnavailable {
                reference: reference.unwrap_or("HEAD").to_string(),
                source,
            }),
        }
    }

    /// Commits whose message or author contains `query` (case-insensitive),
    /// scanning at most `lookback` commits from HEAD.
    pub fn search_commits(
        &self,
        query: &str,
        lookback: usize,
    ) -> Result<Vec<CommitRecord>, AggregationError> {
        let needle = query.to_lowercase();
        let commits = self.list_commits(None, lookback, &CommitFilter::default())?;
        Ok(commits
            .into_iter()
            .filter(|c| {
                c.message.to_lowercase().contains(&needle)
                    || c.author.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub fn list_branches(&self) -> Result<Vec<BranchInfo>, AggregationError> {
        Ok(self.store.list_branches()?)
    }

    /// Return `branch` if it exists locally, otherwise the default branch.
    pub fn validate_branch(&self, branch: &str) -> Result<String, AggregationError> {
        let branches = self.store.list_branches()?;
        if branches.iter().any(|b| b.name == branch) {
            return Ok(branch.to_string());
        }
        let fallback = self.store.default_branch()?;
        warn!(branch, fallback = %fallback, "branch not found, using default");
        Ok(fallback)
    }

    /// File content at a revision; `None` when the path is absent there.
    pub fn file_at_revision(
        &self,
        revision: &str,
        path: &str,
    ) -> Result<Option<String>, AggregationError> {
        self.store
            .file_content_at(revision, path)
            .map_err(|e| self.revision_error(revision, e))
    }

    /// Aggregate the selected commits into one change set.
    ///
    /// The diff spans the whole window from the parent of the earliest
    /// selected commit (or `explicit_base`) to the latest selected commit, so
    /// unselected commits authored inside that window contribute their
    /// changes too. The commit list holds only the selected commits.
    pub fn aggregate_changes(
        &self,
        selected_ids: &[String],
        explicit_base: Option<&str>,
    ) -> Result<AggregatedChangeSet, AggregationError> {
        if selected_ids.is_empty() {
            return Err(AggregationError::NoCommitsSelected);
        }

        let mut selected: Vec<CommitRecord> = Vec::with_capacity(selected_ids.len());
        for id in selected_ids {
            let record = self
                .store
                .resolve(id)
                .map_err(|e| self.revision_error(id, e))?;
            if !selected.iter().any(|c| c.id == record.id) {
                selected.push(record);
            }
        }
        selected.sort_by_key(|c| c.timestamp);

        let (Some(earliest), Some(head)) = (selected.first(), selected.last()) else {
            return Err(AggregationError::NoCommitsSelected);
        };

        let base = match explicit_base {
            Some(base) if base == EMPTY_TREE => base.to_string(),
            Some(base) => {
                let base_record = self
                    .store
                    .resolve(base)
                    .map_err(|e| self.revision_error(base, e))?;
                if base_record.timestamp > head.timestamp {
                    return Err(AggregationError::InvalidBase {
                        base: base_record.id,
                        head: head.id.clone(),
                    });
                }
                base_record.id
            }
            None => self
                .store
                .first_parent(&earliest.id)?
                .unwrap_or_else(|| EMPTY_TREE.to_string()),
        };

        debug!(base = %base, head = %head.id, selected = selected.len(), "aggregating window diff");

        let diffs = self.store.diff_between(&base, &head.id).map_err(|source| {
            AggregationError::DiffComputationFailed {
                base: base.clone(),
                head: head.id.clone(),
                source,
            }
        })?;

        let files = self.build_deltas(diffs);
        let totals = ChangeTotals::from_deltas(&files);
        let sample = build_sample(&files, &self.limits);

        Ok(AggregatedChangeSet {
            base_revision: base,
            head_revision: head.id.clone(),
            commits: selected.iter().map(CommitRecord::summary).collect(),
            files,
            totals,
            sample,
        })
    }

    /// Diff one commit against its first parent (or the empty tree).
    pub fn analyze_commit(&self, id: &str) -> Result<CommitAnalysis, AggregationError> {
        let record = self
            .store
            .resolve(id)
            .map_err(|e| self.revision_error(id, e))?;
        let base = self
            .store
            .first_parent(&record.id)?
            .unwrap_or_else(|| EMPTY_TREE.to_string());
        let diffs = self.store.diff_between(&base, &record.id).map_err(|source| {
            AggregationError::DiffComputationFailed {
                base,
                head: record.id.clone(),
                source,
            }
        })?;
        let files = self.build_deltas(diffs);
        Ok(CommitAnalysis {
            commit: record.summary(),
            totals: ChangeTotals::from_deltas(&files),
            files,
        })
    }

    /// Per-commit analyses for the most recent commits matching `filter`.
    pub fn analyze_recent(
        &self,
        reference: Option<&str>,
        max_count: usize,
        filter: &CommitFilter,
    ) -> Result<Vec<CommitAnalysis>, AggregationError> {
        self.list_commits(reference, max_count, filter)?
            .iter()
            .map(|c| self.analyze_commit(&c.id))
            .collect()
    }

    /// Rank files that tend to change together with `path`.
    ///
    /// Scans the last `lookback` commits touching `path` and returns at most
    /// ten co-touched paths by count. Ties are broken by first-seen order
    /// during the scan (newest commit first), not by path name.
    pub fn find_related_files(
        &self,
        path: &str,
        lookback: usize,
    ) -> Result<Vec<RelatedFile>, AggregationError> {
        let history = self
            .store
            .history_for_path(path, lookback)
            .map_err(|source| AggregationError::HistoryUnavailable {
                reference: path.to_string(),
                source,
            })?;
        Ok(rank_co_changes(path, &history, RELATED_LIMIT))
    }

    fn build_deltas(&self, diffs: Vec<PathDiff>) -> Vec<FileDelta> {
        diffs
            .into_iter()
            .map(|diff| {
                let (additions, deletions) = count_patch_lines(&diff.patch);
                let language = detect_language(&diff.path);
                let changed_symbols = language
                    .map(|lang| changed_symbols(&diff.patch, lang))
                    .unwrap_or_default();
                let (patch, patch_truncated) = truncate_chars(&diff.patch, self.limits.max_patch_chars);
                FileDelta {
                    path: diff.path,
                    change_kind: diff.change_kind,
                    old_path: diff.old_path,
                    additions,
                    deletions,
                    patch,
                    patch_truncated,
                    language: language.map(str::to_string),
                    changed_symbols,
                }
            })
            .collect()
    }

    fn revision_error(&self, id: &str, err: StoreError) -> AggregationError {
        if err.is_unknown_revision() {
            AggregationError::UnknownRevision { id: id.to_string() }
        } else {
            AggregationError::Store(err)
        }
    }
}

/// Added and removed lines of a patch, as `(origin, content)` pairs.
///
/// Inside hunks every `+`/`-` line counts, even one whose content starts with
/// `++` or `--`. Outside hunks the `+++`/`---` file headers are skipped.
pub(crate) fn hunk_lines(patch: &str) -> impl Iterator<Item = (char, &str)> + '_ {
    let mut in_hunk = false;
    patch.lines().filter_map(move |line| {
        if line.starts_with("diff --git ") {
            in_hunk = false;
            return None;
        }
        if line.starts_with("@@") {
            in_hunk = true;
            return None;
        }
        if !in_hunk && (line.starts_with("+++") || line.starts_with("---")) {
            return None;
        }
        match line.as_bytes().first() {
            Some(b'+') => Some(('+', &line[1..])),
            Some(b'-') => Some(('-', &line[1..])),
            _ => None,
        }
    })
}

pub(crate) fn changed_lines(patch: &str) -> impl Iterator<Item = &str> + '_ {
    hunk_lines(patch).map(|(_, content)| content)
}

/// `(additions, deletions)` counted from patch text.
pub fn count_patch_lines(patch: &str) -> (usize, usize) {
    hunk_lines(patch).fold((0, 0), |(added, removed), (origin, _)| match origin {
        '+' => (added + 1, removed),
        _ => (added, removed + 1),
    })
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Preview of the largest changed files, bounded per file and in total.
pub fn build_sample(files: &[FileDelta], limits: &AggregationLimits) -> SampleExcerpt {
    let mut ranked: Vec<&FileDelta> = files.iter().collect();
    ranked.sort_by(|a, b| b.churn().cmp(&a.churn()));

    let mut sample = SampleExcerpt::default();
    for file in ranked.into_iter().take(limits.sample_files) {
        if sample.total_chars >= limits.sample_total_chars {
            break;
        }
        let budget = limits
            .sample_file_chars
            .min(limits.sample_total_chars - sample.total_chars);
        let (excerpt, _) = truncate_chars(&file.patch, budget);
        sample.total_chars += excerpt.chars().count();
        sample.entries.push(SampleEntry {
            path: file.path.clone(),
            churn: file.churn(),
            excerpt,
        });
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use crate::tracker::GitStore;
    use crate::tracker::git::test_support::{commit_at, init_repo};
    use tempfile::tempdir;

    const T0: i64 = 1_700_000_000;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_count_patch_lines_excludes_file_headers() {
        let patch = "\
diff --git a/a.txt b/a.txt
index 1111111..2222222 100644
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 keep
---- removed line that starts with dashes
+++ added line that starts with pluses
-old
+new
";
        assert_eq!(count_patch_lines(patch), (2, 2));
    }

    #[test]
    fn test_count_patch_lines_without_hunk_header() {
        let patch = "--- a/x\n+++ b/x\n+one\n+two\n-three\n";
        assert_eq!(count_patch_lines(patch), (2, 1));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), ("hé".to_string(), true));
        assert_eq!(truncate_chars("abc", 3), ("abc".to_string(), false));
    }

    #[test]
    fn test_aggregate_empty_selection_fails() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("a.txt", Some("a"))], "init", T0);
        let store = GitStore::open(dir.path()).unwrap();
        let err = ChangeAggregator::new(&store)
            .aggregate_changes(&[], None)
            .unwrap_err();
        assert!(matches!(err, AggregationError::NoCommitsSelected));
    }

    #[test]
    fn test_aggregate_unknown_revision_fails() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("a.txt", Some("a"))], "init", T0);
        let store = GitStore::open(dir.path()).unwrap();
        let err = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&["feedfacefeedface"]), None)
            .unwrap_err();
        match err {
            AggregationError::UnknownRevision { id } => assert_eq!(id, "feedfacefeedface"),
            other => panic!("Expected UnknownRevision, got {:?}", other),
        }
    }

    #[test]
    fn test_parent_and_child_disjoint_files_union() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let root = commit_at(dir.path(), &[("README.md", Some("readme\n"))], "init", T0);
        let a = commit_at(dir.path(), &[("src/a.rs", Some("fn a() {}\nfn b() {}\n"))], "add a", T0 + 10);
        let b = commit_at(dir.path(), &[("src/b.rs", Some("fn c() {}\n"))], "add b", T0 + 20);
        let store = GitStore::open(dir.path()).unwrap();

        let set = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&[&a, &b]), None)
            .unwrap();
        assert_eq!(set.base_revision, root);
        assert_eq!(set.head_revision, b);
        let paths: Vec<_> = set.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(set.file("src/a.rs").unwrap().additions, 2);
        assert_eq!(set.file("src/b.rs").unwrap().additions, 1);
        assert_eq!(set.totals.additions, 3);
        assert_eq!(set.totals.deletions, 0);
        assert_eq!(set.totals.net, 3);
        assert_eq!(set.file("src/a.rs").unwrap().language.as_deref(), Some("rust"));
        assert_eq!(
            set.file("src/a.rs").unwrap().changed_symbols,
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_window_diff_includes_unselected_commit_between() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("base.txt", Some("base\n"))], "init", T0);
        let a = commit_at(dir.path(), &[("a.txt", Some("a\n"))], "A", T0 + 10);
        let x = commit_at(dir.path(), &[("x.txt", Some("x\n"))], "X", T0 + 20);
        let c = commit_at(dir.path(), &[("c.txt", Some("c\n"))], "C", T0 + 30);
        let store = GitStore::open(dir.path()).unwrap();

        let set = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&[&a, &c]), None)
            .unwrap();
        // X lies inside the base..head window, so its file shows up
        assert!(set.file("x.txt").is_some());
        assert_eq!(set.files.len(), 3);
        // but it is not listed as a selected commit
        let listed: Vec<_> = set.commits.iter().map(|c| c.id.clone()).collect();
        assert_eq!(listed, vec![a, c]);
        assert!(!listed.contains(&x));
    }

    #[test]
    fn test_selection_order_does_not_matter() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let root = commit_at(dir.path(), &[("f.txt", Some("1\n"))], "init", T0);
        let a = commit_at(dir.path(), &[("f.txt", Some("1\n2\n"))], "A", T0 + 10);
        let b = commit_at(dir.path(), &[("f.txt", Some("1\n2\n3\n"))], "B", T0 + 20);
        let store = GitStore::open(dir.path()).unwrap();

        let set = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&[&b, &a]), None)
            .unwrap();
        assert_eq!(set.base_revision, root);
        assert_eq!(set.head_revision, b);
        assert_eq!(set.commits[0].id, a);
        let file = set.file("f.txt").unwrap();
        assert_eq!(file.change_kind, ChangeKind::Modified);
        assert_eq!((file.additions, file.deletions), (2, 0));
    }

    #[test]
    fn test_root_commit_uses_empty_tree_base() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let root = commit_at(dir.path(), &[("a.txt", Some("a\nb\n"))], "init", T0);
        let store = GitStore::open(dir.path()).unwrap();

        let set = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&[&root]), None)
            .unwrap();
        assert_eq!(set.base_revision, EMPTY_TREE);
        assert_eq!(set.files[0].change_kind, ChangeKind::Added);
        assert_eq!(set.files[0].additions, 2);
    }

    #[test]
    fn test_abbreviated_ids_resolve() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let root = commit_at(dir.path(), &[("a.txt", Some("a\n"))], "init", T0);
        let store = GitStore::open(dir.path()).unwrap();
        let set = ChangeAggregator::new(&store)
            .aggregate_changes(&ids(&[&root[..10]]), None)
            .unwrap();
        assert_eq!(set.head_revision, root);
    }

    #[test]
    fn test_explicit_base_after_head_is_rejected() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let a = commit_at(dir.path(), &[("a.txt", Some("a\n"))], "A", T0);
        let b = commit_at(dir.path(), &[("b.txt", Some("b\n"))], "B", T0 + 10);
        let store = GitStore::open(dir.path()).unwrap();
        let agg = ChangeAggregator::new(&store);

        let err = agg.aggregate_changes(&ids(&[&a]), Some(&b)).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidBase { .. }));

        let ok = agg.aggregate_changes(&ids(&[&b]), Some(&a)).unwrap();
        assert_eq!(ok.base_revision, a);
        assert_eq!(ok.files.len(), 1);
    }

    #[test]
    fn test_patch_truncation_keeps_counts() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let body: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        let id = commit_at(dir.path(), &[("big.txt", Some(&body))], "big", T0);
        let store = GitStore::open(dir.path()).unwrap();
        let limits = AggregationLimits {
            max_patch_chars: 100,
            ..Default::default()
        };
        let set = ChangeAggregator::new(&store)
            .with_limits(limits)
            .aggregate_changes(&ids(&[&id]), None)
            .unwrap();
        let file = set.file("big.txt").unwrap();
        assert_eq!(file.additions, 200);
        assert!(file.patch_truncated);
        assert_eq!(file.patch.chars().count(), 100);
    }

    fn delta(path: &str, churn: usize, patch_len: usize) -> FileDelta {
        FileDelta {
            path: path.to_string(),
            change_kind: ChangeKind::Modified,
            old_path: None,
            additions: churn,
            deletions: 0,
            patch: "x".repeat(patch_len),
            patch_truncated: false,
            language: None,
            changed_symbols: Vec::new(),
        }
    }

    #[test]
    fn test_sample_takes_three_largest_with_caps() {
        let files = vec![
            delta("small.rs", 1, 50),
            delta("huge.rs", 500, 4000),
            delta("mid.rs", 50, 300),
            delta("big.rs", 100, 2000),
        ];
        let sample = build_sample(&files, &AggregationLimits::default());
        let paths: Vec<_> = sample.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["huge.rs", "big.rs", "mid.rs"]);
        assert_eq!(sample.entries[0].excerpt.len(), 1000);
        assert_eq!(sample.entries[2].excerpt.len(), 300);
        assert_eq!(sample.total_chars, 2300);
    }

    #[test]
    fn test_sample_stops_at_total_cap() {
        let files = vec![delta("a", 3, 900), delta("b", 2, 900), delta("c", 1, 900)];
        let limits = AggregationLimits {
            sample_total_chars: 1000,
            ..Default::default()
        };
        let sample = build_sample(&files, &limits);
        assert_eq!(sample.entries.len(), 2);
        assert_eq!(sample.entries[1].excerpt.len(), 100);
        assert_eq!(sample.total_chars, 1000);
    }

    #[test]
    fn test_list_commits_excludes_tests_and_falls_back() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("src/parser.go", Some("package p\n"))], "Fix parser bug", T0);
        commit_at(
            dir.path(),
            &[("tests/parser_test.go", Some("package p\n"))],
            "Add unit tests for parser",
            T0 + 10,
        );
        let store = GitStore::open(dir.path()).unwrap();
        let agg = ChangeAggregator::new(&store);
        let filter = CommitFilter {
            exclude_merges: true,
            exclude_test_commits: true,
            ..Default::default()
        };

        let commits = agg.list_commits(Some("missing-branch"), 10, &filter).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "Fix parser bug");
        assert!(!commits[0].is_test_commit);

        let all = agg
            .list_commits(None, 10, &CommitFilter::default())
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].is_test_commit);
    }

    #[test]
    fn test_search_and_validate_branch() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("a.txt", Some("a"))], "Implement lexer", T0);
        commit_at(dir.path(), &[("b.txt", Some("b"))], "Wire up CLI", T0 + 1);
        let store = GitStore::open(dir.path()).unwrap();
        let agg = ChangeAggregator::new(&store);

        let found = agg.search_commits("LEXER", 100).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Implement lexer");

        let default = store.default_branch().unwrap();
        assert_eq!(agg.validate_branch("nope").unwrap(), default);
        assert_eq!(agg.validate_branch(&default).unwrap(), default);
    }

    #[test]
    fn test_find_related_files_from_history() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("core.rs", Some("1")), ("util.rs", Some("1"))], "c1", T0);
        commit_at(dir.path(), &[("core.rs", Some("2")), ("api.rs", Some("1"))], "c2", T0 + 1);
        commit_at(dir.path(), &[("core.rs", Some("3")), ("util.rs", Some("2"))], "c3", T0 + 2);
        commit_at(dir.path(), &[("other.rs", Some("1"))], "c4", T0 + 3);
        let store = GitStore::open(dir.path()).unwrap();

        let related = ChangeAggregator::new(&store)
            .find_related_files("core.rs", 50)
            .unwrap();
        let paths: Vec<_> = related.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["util.rs", "api.rs"]);
        assert_eq!(related[0].co_changes, 2);
    }

    #[test]
    fn test_analyze_commit_against_first_parent() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        commit_at(dir.path(), &[("a.py", Some("x = 1\n"))], "init", T0);
        let b = commit_at(
            dir.path(),
            &[("a.py", Some("x = 1\ndef run():\n    pass\n"))],
            "add run",
            T0 + 5,
        );
        let store = GitStore::open(dir.path()).unwrap();
        let analysis = ChangeAggregator::new(&store).analyze_commit(&b).unwrap();
        assert_eq!(analysis.commit.id, b);
        assert_eq!(analysis.totals.additions, 2);
        assert_eq!(analysis.files[0].changed_symbols, vec!["run"]);
    }
}
