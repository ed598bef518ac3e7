//! Repository resolution shared by analysis and pipeline commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use testsmith::testsmith_config::{TestsmithConfig, clone_dir_name};
use testsmith::tracker::GitStore;

use super::super::Cli;

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<TestsmithConfig> {
    TestsmithConfig::with_cli_args(
        project_dir.to_path_buf(),
        cli.verbose,
        cli.yes,
        cli.repo_url.clone(),
    )
}

/// Path of the repository to analyze, cloning the configured remote on first use.
pub async fn resolve_repository(config: &TestsmithConfig) -> Result<PathBuf> {
    let Some(url) = config.repo_url() else {
        return Ok(config.local_repo_path());
    };
    let url = url.to_string();
    let dest = config.clones_dir().join(clone_dir_name(&url));
    if dest.join(".git").exists() {
        return Ok(dest);
    }

    println!("Cloning {} into {}...", url, dest.display());
    let clone_dest = dest.clone();
    tokio::task::spawn_blocking(move || GitStore::clone_remote(&url, &clone_dest))
        .await
        .context("Clone task failed")??;
    Ok(dest)
}

/// Run blocking work against a freshly opened store on the blocking pool.
pub async fn with_store<T, F>(repo_path: PathBuf, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&GitStore) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let store = GitStore::open(&repo_path)?;
        work(&store)
    })
    .await
    .context("Repository task failed")?
}
