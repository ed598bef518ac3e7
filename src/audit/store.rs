use super::RunRecord;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

/// Reads and writes run records under a `runs/` directory.
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_path_buf(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn path_for(&self, record: &RunRecord) -> PathBuf {
        self.runs_dir.join(format!("{}.json", record.run_id))
    }

    /// Write `record`, replacing any earlier snapshot of the same run.
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.runs_dir).with_context(|| {
            format!("Failed to create runs directory {}", self.runs_dir.display())
        })?;
        let path = self.path_for(record);
        let json = serde_json::to_string_pretty(record).context("Failed to serialize run record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write run record {}", path.display()))?;
        Ok(path)
    }

    /// Load a run by full id or unique prefix.
    pub fn load(&self, id: &str) -> Result<RunRecord> {
        let id = id.trim().to_lowercase();
        if id.is_empty() {
            bail!("Run id must not be empty");
        }
        let matches: Vec<PathBuf> = self
            .run_files()?
            .into_iter()
            .filter(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.starts_with(&id))
            })
            .collect();

        match matches.as_slice() {
            [] => bail!("No run found matching '{}'", id),
            [path] => self.load_path(path),
            _ => bail!(
                "Run id '{}' is ambiguous ({} matches); use more characters",
                id,
                matches.len()
            ),
        }
    }

    pub fn load_path(&self, path: &Path) -> Result<RunRecord> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record {}", path.display()))?;
        let record: RunRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run record {}", path.display()))?;
        Ok(record)
    }

    /// All readable run records, most recent first. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<RunRecord>> {
        let mut records: Vec<RunRecord> = self
            .run_files()?
            .iter()
            .filter_map(|p| match self.load_path(p) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "Skipping unreadable run record");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    pub fn latest(&self) -> Result<Option<RunRecord>> {
        Ok(self.list()?.into_iter().next())
    }

    fn run_files(&self) -> Result<Vec<PathBuf>> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }
        let files = fs::read_dir(&self.runs_dir)
            .with_context(|| format!("Failed to read {}", self.runs_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        Ok(files)
    }
}
