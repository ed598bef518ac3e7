//! Configuration for testsmith.
//!
//! Settings are read from `.testsmith/testsmith.toml` and layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "billing-service"
//! description = "Invoice generation and payment reconciliation"
//! language = "python"
//!
//! [repository]
//! path = "."
//! branch = "main"
//! # url = "https://github.com/acme/billing.git"
//!
//! [aggregation]
//! max_commits = 10
//! lookback = 50
//! sample_files = 3
//! sample_file_chars = 1000
//! sample_total_chars = 5000
//! max_patch_chars = 20000
//! exclude_merges = true
//! exclude_test_commits = true
//!
//! [generation]
//! command = "my-llm-bridge --model large"
//! timeout_secs = 60
//!
//! [pipeline]
//! skipped_strategy = "degraded"
//! store_timeout_secs = 30
//! auto_confirm = false
//! ```
//!
//! Environment overrides (a `.env` file in the project directory is loaded
//! first): `TESTSMITH_GENERATOR_CMD`, `TESTSMITH_REQUEST_TIMEOUT`,
//! `TESTSMITH_STORE_TIMEOUT`, `TESTSMITH_MAX_COMMITS`.

use crate::changes::AggregationLimits;
use crate::init::TESTSMITH_DIR;
use crate::pipeline::{PipelineSettings, ProjectInfo, SkippedStrategyPolicy};
use crate::tracker::CommitFilter;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "testsmith.toml";

/// Project description handed to the generation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Which repository to analyze.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySection {
    /// Local checkout, relative to the project directory (default: the project directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Remote URL cloned into `.testsmith/clones/` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Branch to analyze (default: the checked-out branch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSection {
    /// Commits analyzed when none are selected explicitly
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    /// History depth scanned by search and related-file ranking
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_sample_files")]
    pub sample_files: usize,
    #[serde(default = "default_sample_file_chars")]
    pub sample_file_chars: usize,
    #[serde(default = "default_sample_total_chars")]
    pub sample_total_chars: usize,
    #[serde(default = "default_max_patch_chars")]
    pub max_patch_chars: usize,
    #[serde(default = "default_true")]
    pub exclude_merges: bool,
    #[serde(default = "default_true")]
    pub exclude_test_commits: bool,
}

fn default_max_commits() -> usize {
    10
}

fn default_lookback() -> usize {
    50
}

fn default_sample_files() -> usize {
    AggregationLimits::default().sample_files
}

fn default_sample_file_chars() -> usize {
    AggregationLimits::default().sample_file_chars
}

fn default_sample_total_chars() -> usize {
    AggregationLimits::default().sample_total_chars
}

fn default_max_patch_chars() -> usize {
    AggregationLimits::default().max_patch_chars
}

fn default_true() -> bool {
    true
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            lookback: default_lookback(),
            sample_files: default_sample_files(),
            sample_file_chars: default_sample_file_chars(),
            sample_total_chars: default_sample_total_chars(),
            max_patch_chars: default_max_patch_chars(),
            exclude_merges: true,
            exclude_test_commits: true,
        }
    }
}

impl AggregationSection {
    pub fn limits(&self) -> AggregationLimits {
        AggregationLimits {
            sample_files: self.sample_files,
            sample_file_chars: self.sample_file_chars,
            sample_total_chars: self.sample_total_chars,
            max_patch_chars: self.max_patch_chars,
        }
    }

    pub fn filter(&self) -> CommitFilter {
        CommitFilter {
            exclude_merges: self.exclude_merges,
            exclude_test_commits: self.exclude_test_commits,
            ..Default::default()
        }
    }
}

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    /// Shell command run once per generation stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Per-invocation timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub skipped_strategy: SkippedStrategyPolicy,
    /// Timeout in seconds for repository reads
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// Accept the test strategy without prompting
    #[serde(default)]
    pub auto_confirm: bool,
}

fn default_store_timeout() -> u64 {
    30
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            skipped_strategy: SkippedStrategyPolicy::default(),
            store_timeout_secs: default_store_timeout(),
            auto_confirm: false,
        }
    }
}

/// The complete testsmith.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestsmithToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub aggregation: AggregationSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl TestsmithToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse testsmith.toml")
    }

    /// Load `.testsmith/testsmith.toml`, or defaults if it does not exist.
    pub fn load_or_default(testsmith_dir: &Path) -> Result<Self> {
        let config_path = testsmith_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize testsmith.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `TESTSMITH_*` environment overrides. Unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(cmd) = std::env::var("TESTSMITH_GENERATOR_CMD")
            && !cmd.trim().is_empty()
        {
            self.generation.command = Some(cmd);
        }
        if let Some(secs) = env_number("TESTSMITH_REQUEST_TIMEOUT") {
            self.generation.timeout_secs = secs;
        }
        if let Some(secs) = env_number("TESTSMITH_STORE_TIMEOUT") {
            self.pipeline.store_timeout_secs = secs;
        }
        if let Some(max) = env_number("TESTSMITH_MAX_COMMITS") {
            self.aggregation.max_commits = max as usize;
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.generation.command.is_none() {
            warnings.push(
                "No generation command configured; only the VcsAnalysis stage can succeed"
                    .to_string(),
            );
        }
        if self.generation.timeout_secs == 0 {
            warnings.push("generation.timeout_secs is 0; every request will time out".to_string());
        }
        if self.pipeline.store_timeout_secs == 0 {
            warnings
                .push("pipeline.store_timeout_secs is 0; every repository read will time out".to_string());
        }
        if self.aggregation.max_commits == 0 {
            warnings.push("aggregation.max_commits is 0; recent-commit runs analyze nothing".to_string());
        }
        if self.aggregation.sample_total_chars < self.aggregation.sample_file_chars {
            warnings.push(format!(
                "aggregation.sample_total_chars ({}) is below sample_file_chars ({})",
                self.aggregation.sample_total_chars, self.aggregation.sample_file_chars
            ));
        }
        if self.repository.url.is_some() && self.repository.path.is_some() {
            warnings.push("Both repository.url and repository.path are set; url wins".to_string());
        }

        warnings
    }

    pub fn project_info(&self) -> Option<ProjectInfo> {
        let p = &self.project;
        if p.name.is_none() && p.description.is_none() && p.language.is_none() {
            return None;
        }
        Some(ProjectInfo {
            name: p.name.clone(),
            description: p.description.clone(),
            language: p.language.clone(),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            service_timeout: Duration::from_secs(self.generation.timeout_secs),
            store_timeout: Duration::from_secs(self.pipeline.store_timeout_secs),
            limits: self.aggregation.limits(),
            recent_filter: self.aggregation.filter(),
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Resolved configuration: testsmith.toml, environment, then CLI flags.
#[derive(Debug, Clone)]
pub struct TestsmithConfig {
    pub project_dir: PathBuf,
    pub testsmith_dir: PathBuf,
    pub toml: TestsmithToml,
    pub verbose: bool,
    /// CLI override: confirm the strategy without prompting
    pub yes: bool,
    /// CLI override for repository.url
    pub cli_repo_url: Option<String>,
}

impl TestsmithConfig {
    /// Load configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let testsmith_dir = project_dir.join(TESTSMITH_DIR);
        dotenvy::from_path(project_dir.join(".env")).ok();

        let mut toml = TestsmithToml::load_or_default(&testsmith_dir)?;
        toml.apply_env();

        Ok(Self {
            project_dir,
            testsmith_dir,
            toml,
            verbose: false,
            yes: false,
            cli_repo_url: None,
        })
    }

    /// Create TestsmithConfig with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        yes: bool,
        repo_url: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.yes = yes;
        config.cli_repo_url = repo_url;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.testsmith_dir.join(CONFIG_FILE)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.testsmith_dir.join("runs")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.testsmith_dir.join("logs")
    }

    pub fn clones_dir(&self) -> PathBuf {
        self.testsmith_dir.join("clones")
    }

    /// Remote URL to clone (CLI → file).
    pub fn repo_url(&self) -> Option<&str> {
        self.cli_repo_url
            .as_deref()
            .or(self.toml.repository.url.as_deref())
    }

    /// Local repository path when no remote is configured.
    pub fn local_repo_path(&self) -> PathBuf {
        match self.toml.repository.path {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => self.project_dir.join(path),
            None => self.project_dir.clone(),
        }
    }

    /// Auto-confirm the strategy (CLI → file).
    pub fn auto_confirm(&self) -> bool {
        self.yes || self.toml.pipeline.auto_confirm
    }

    pub fn generator_command(&self) -> Option<String> {
        self.toml.generation.command.clone()
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

/// Directory name for a clone of `url`: the last path segment without `.git`.
pub fn clone_dir_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches(".git");
    if last.is_empty() {
        "repository".to_string()
    } else {
        last.to_string()
    }
}
