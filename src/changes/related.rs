use crate::changes::CommitRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of related files returned by default.
pub const RELATED_LIMIT: usize = 10;

/// A path that changed together with the target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedFile {
    pub path: String,
    pub co_changes: usize,
}

/// Rank paths co-touched with `target` across `commits`.
///
/// Sorted by co-change count, descending. Ties keep first-seen order of the
/// scan: commits in the order given (newest first from history), then paths
/// in the order each commit lists them. Path names never break ties.
pub fn rank_co_changes(target: &str, commits: &[CommitRecord], limit: usize) -> Vec<RelatedFile> {
    let mut ranked: Vec<RelatedFile> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for commit in commits {
        for path in &commit.files {
            if path == target {
                continue;
            }
            match index.get(path.as_str()) {
                Some(&slot) => ranked[slot].co_changes += 1,
                None => {
                    index.insert(path.as_str(), ranked.len());
                    ranked.push(RelatedFile {
                        path: path.clone(),
                        co_changes: 1,
                    });
                }
            }
        }
    }

    // sort_by is stable, which preserves first-seen order among equal counts
    ranked.sort_by(|a, b| b.co_changes.cmp(&a.co_changes));
    ranked.truncate(limit);
    ranked
}
