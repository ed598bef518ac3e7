use crate::changes::{ChangeKind, CommitRecord};
use crate::errors::{StoreError, StoreErrorKind};
use crate::tracker::{BranchInfo, CommitDetail, CommitFilter, EMPTY_TREE, PathDiff, RevisionStore};
use chrono::{DateTime, Utc};
use git2::{BranchType, Commit, Delta, Diff, DiffFindOptions, DiffOptions, Repository, Sort, Tree};
use std::path::{Path, PathBuf};

/// [`RevisionStore`] backed by a git repository through libgit2.
///
/// A `Repository` handle is not `Sync`, so each run opens its own store.
pub struct GitStore {
    repo: Repository,
    path: PathBuf,
}

impl GitStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let repo = Repository::open(path).map_err(|e| {
            StoreError::unreadable(format!(
                "Failed to open git repository at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Clone `url` into `dest`, or open `dest` if it already holds a repository.
    pub fn clone_remote(url: &str, dest: &Path) -> Result<Self, StoreError> {
        if dest.join(".git").exists() {
            return Self::open(dest);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::unreadable(format!(
                    "Failed to create clone directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let repo = git2::build::RepoBuilder::new()
            .clone(url, dest)
            .map_err(|e| StoreError::unreadable(format!("Failed to clone {}: {}", url, e.message())))?;
        Ok(Self {
            repo,
            path: dest.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_commit(&self, id: &str) -> Result<Commit<'_>, StoreError> {
        let object = self
            .repo
            .revparse_single(id)
            .map_err(|_| StoreError::unknown_revision(id))?;
        object
            .peel_to_commit()
            .map_err(|_| StoreError::unknown_revision(id))
    }

    fn tree_for(&self, revision: &str) -> Result<Option<Tree<'_>>, StoreError> {
        if revision == EMPTY_TREE {
            return Ok(None);
        }
        let object = self
            .repo
            .revparse_single(revision)
            .map_err(|_| StoreError::unknown_revision(revision))?;
        let tree = object
            .peel_to_tree()
            .map_err(|_| StoreError::unknown_revision(revision))?;
        Ok(Some(tree))
    }

    fn diff_trees(
        &self,
        old: Option<&Tree<'_>>,
        new: Option<&Tree<'_>>,
    ) -> Result<Diff<'_>, StoreError> {
        let mut opts = DiffOptions::new();
        opts.ignore_submodules(true);
        let mut diff = self.repo.diff_tree_to_tree(old, new, Some(&mut opts))?;
        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))?;
        Ok(diff)
    }

    /// Diff of a commit against its first parent (or the empty tree).
    fn commit_diff(&self, commit: &Commit<'_>) -> Result<Diff<'_>, StoreError> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        self.diff_trees(parent_tree.as_ref(), Some(&tree))
    }

    fn record_for(&self, commit: &Commit<'_>) -> Result<CommitRecord, StoreError> {
        let diff = self.commit_diff(commit)?;
        let stats = diff.stats()?;
        let files = touched_paths(&diff);

        let author = commit.author();
        let timestamp = timestamp_of(author.when().seconds())?;
        let short_id = commit
            .as_object()
            .short_id()
            .ok()
            .and_then(|buf| buf.as_str().map(str::to_string))
            .unwrap_or_else(|| commit.id().to_string()[..7].to_string());

        Ok(CommitRecord::new(
            commit.id().to_string(),
            short_id,
            commit.message().unwrap_or("").trim_end().to_string(),
            author.name().unwrap_or("unknown").to_string(),
            author.email().unwrap_or("").to_string(),
            timestamp,
            files,
            stats.insertions(),
            stats.deletions(),
            commit.parent_count(),
        ))
    }

    fn walk_from(&self, reference: Option<&str>) -> Result<git2::Revwalk<'_>, StoreError> {
        let start = match reference {
            Some(reference) => self.find_commit(reference)?,
            None => self
                .repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(|e| StoreError::new(StoreErrorKind::UnknownRevision, e.message().to_string()))?,
        };
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TIME)?;
        walk.push(start.id())?;
        Ok(walk)
    }
}

fn timestamp_of(seconds: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| StoreError::query(format!("commit timestamp {} out of range", seconds)))
}

fn delta_path(delta: &git2::DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}

fn touched_paths(diff: &Diff<'_>) -> Vec<String> {
    diff.deltas().filter_map(|d| delta_path(&d)).collect()
}

fn map_kind(status: Delta) -> Option<ChangeKind> {
    match status {
        Delta::Added | Delta::Copied | Delta::Untracked => Some(ChangeKind::Added),
        Delta::Modified | Delta::Typechange => Some(ChangeKind::Modified),
        Delta::Deleted => Some(ChangeKind::Deleted),
        Delta::Renamed => Some(ChangeKind::Renamed),
        _ => None,
    }
}

fn path_diffs(diff: &Diff<'_>) -> Result<Vec<PathDiff>, StoreError> {
    let mut out = Vec::new();
    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let Some(change_kind) = map_kind(delta.status()) else {
            continue;
        };
        let Some(path) = delta_path(&delta) else {
            continue;
        };
        let old_path = if change_kind == ChangeKind::Renamed {
            delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        } else {
            None
        };

        let patch = match git2::Patch::from_diff(diff, idx)? {
            Some(mut patch) => {
                let buf = patch.to_buf()?;
                String::from_utf8_lossy(&buf).into_owned()
            }
            None => String::new(),
        };

        out.push(PathDiff {
            path,
            old_path,
            change_kind,
            patch,
        });
    }
    Ok(out)
}

impl RevisionStore for GitStore {
    fn list_commits(
        &self,
        reference: Option<&str>,
        max_count: usize,
        filter: &CommitFilter,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        let walk = self.walk_from(reference)?;
        let mut records = Vec::new();
        for oid in walk {
            if records.len() >= max_count {
                break;
            }
            let commit = self.repo.find_commit(oid?)?;
            let author = commit.author();
            if !filter.accepts_header(
                timestamp_of(author.when().seconds())?,
                author.name().unwrap_or("unknown"),
                author.email().unwrap_or(""),
                commit.parent_count(),
            ) {
                continue;
            }
            let record = self.record_for(&commit)?;
            if filter.accepts(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn resolve(&self, id: &str) -> Result<CommitRecord, StoreError> {
        let commit = self.find_commit(id)?;
        self.record_for(&commit)
    }

    fn commit_detail(&self, id: &str) -> Result<CommitDetail, StoreError> {
        let commit = self.find_commit(id)?;
        let record = self.record_for(&commit)?;
        let parents = commit.parent_ids().map(|p| p.to_string()).collect();
        let patch = path_diffs(&self.commit_diff(&commit)?)?
            .into_iter()
            .map(|d| d.patch)
            .collect::<Vec<_>>()
            .join("");
        Ok(CommitDetail {
            record,
            parents,
            patch,
        })
    }

    fn first_parent(&self, id: &str) -> Result<Option<String>, StoreError> {
        let commit = self.find_commit(id)?;
        Ok(commit.parent_id(0).ok().map(|p| p.to_string()))
    }

    fn diff_between(&self, base: &str, head: &str) -> Result<Vec<PathDiff>, StoreError> {
        let old = self.tree_for(base)?;
        let new = self.tree_for(head)?;
        let diff = self.diff_trees(old.as_ref(), new.as_ref())?;
        path_diffs(&diff)
    }

    fn list_branches(&self) -> Result<Vec<BranchInfo>, StoreError> {
        let mut branches = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            let Some(name) = branch.name()?.map(str::to_string) else {
                continue;
            };
            let upstream = branch
                .upstream()
                .ok()
                .and_then(|u| u.name().ok().flatten().map(str::to_string));
            branches.push(BranchInfo {
                name,
                is_current: branch.is_head(),
                upstream,
            });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    fn history_for_path(
        &self,
        path: &str,
        max_count: usize,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        let walk = self.walk_from(None)?;
        let mut records = Vec::new();
        for oid in walk {
            if records.len() >= max_count {
                break;
            }
            let commit = self.repo.find_commit(oid?)?;
            let record = self.record_for(&commit)?;
            if record.files.iter().any(|f| f == path) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn file_content_at(&self, id: &str, path: &str) -> Result<Option<String>, StoreError> {
        let commit = self.find_commit(id)?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match self.repo.find_blob(entry.id()) {
            Ok(blob) => Ok(Some(String::from_utf8_lossy(blob.content()).into_owned())),
            // Directories and submodules have no file content.
            Err(_) => Ok(None),
        }
    }

    fn default_branch(&self) -> Result<String, StoreError> {
        if let Ok(head) = self.repo.head()
            && head.is_branch()
            && let Some(name) = head.shorthand()
        {
            return Ok(name.to_string());
        }
        for candidate in ["main", "master"] {
            if self.repo.find_branch(candidate, BranchType::Local).is_ok() {
                return Ok(candidate.to_string());
            }
        }
        Ok("HEAD".to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use git2::{Repository, Signature, Time};
    use std::fs;
    use std::path::Path;

    pub fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        repo
    }

    /// Write `files` (path, content; `None` deletes) and commit at `epoch_secs`.
    pub fn commit_at(
        dir: &Path,
        files: &[(&str, Option<&str>)],
        msg: &str,
        epoch_secs: i64,
    ) -> String {
        let repo = Repository::open(dir).unwrap();
        for (name, content) in files {
            let file_path = dir.join(name);
            match content {
                Some(content) => {
                    if let Some(parent) = file_path.parent() {
                        fs::create_dir_all(parent).unwrap();
                    }
                    fs::write(&file_path, content).unwrap();
                }
                None => {
                    fs::remove_file(&file_path).unwrap();
                }
            }
        }
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index
            .update_all(["*"].iter(), None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::new("test", "test@test.com", &Time::new(epoch_secs, 0)).unwrap();
        let oid = if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap()
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap()
        };
        oid.to_string()
    }
}
