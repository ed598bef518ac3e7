//! `testsmith init`: create the `.testsmith/` directory in a project.
//!
//! ```text
//! .testsmith/
//! ├── testsmith.toml   # Configuration (defaults written on first init)
//! ├── runs/            # One JSON record per pipeline run
//! ├── logs/            # Daily tracing log files
//! └── clones/          # Remote repositories cloned for analysis
//! ```

use crate::testsmith_config::{CONFIG_FILE, TestsmithToml};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The name of the testsmith project directory.
pub const TESTSMITH_DIR: &str = ".testsmith";

const SUBDIRS: [&str; 3] = ["runs", "logs", "clones"];

/// Result of initializing a testsmith project.
#[derive(Debug)]
pub struct InitResult {
    pub testsmith_dir: PathBuf,
    /// False if the directory already existed
    pub created: bool,
    /// True if a default testsmith.toml was written
    pub wrote_config: bool,
}

/// Initialize a testsmith project in `project_dir`.
///
/// Safe to re-run: missing subdirectories are recreated and an existing
/// testsmith.toml is left untouched.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let testsmith_dir = project_dir.join(TESTSMITH_DIR);
    let created = !testsmith_dir.exists();

    std::fs::create_dir_all(&testsmith_dir)
        .with_context(|| format!("Failed to create directory: {}", testsmith_dir.display()))?;
    for sub in SUBDIRS {
        let path = testsmith_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_path = testsmith_dir.join(CONFIG_FILE);
    let wrote_config = !config_path.exists();
    if wrote_config {
        TestsmithToml::default().save(&config_path)?;
    }

    Ok(InitResult {
        testsmith_dir,
        created,
        wrote_config,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(TESTSMITH_DIR).exists()
}

pub fn get_testsmith_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(TESTSMITH_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();

        assert!(result.created);
        assert!(result.wrote_config);
        assert_eq!(result.testsmith_dir, dir.path().join(TESTSMITH_DIR));
        for sub in SUBDIRS {
            assert!(result.testsmith_dir.join(sub).is_dir(), "{} missing", sub);
        }
        let config = TestsmithToml::load(&result.testsmith_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(config.aggregation.max_commits, 10);
    }

    #[test]
    fn test_init_project_existing_directory_keeps_config() {
        let dir = tempdir().unwrap();
        let testsmith_dir = dir.path().join(TESTSMITH_DIR);
        std::fs::create_dir_all(&testsmith_dir).unwrap();
        std::fs::write(
            testsmith_dir.join(CONFIG_FILE),
            "[generation]\ncommand = \"mine\"\n",
        )
        .unwrap();

        let result = init_project(dir.path()).unwrap();
        assert!(!result.created);
        assert!(!result.wrote_config);
        assert!(testsmith_dir.join("runs").is_dir());

        let config = TestsmithToml::load(&testsmith_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(config.generation.command.as_deref(), Some("mine"));
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path()).unwrap();
        assert!(is_initialized(dir.path()));
        assert_eq!(get_testsmith_dir(dir.path()), dir.path().join(".testsmith"));
    }
}
