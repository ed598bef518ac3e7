//! Pipeline execution: `testsmith run`, `testsmith stage` and `testsmith resume`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testsmith::audit::{RunRecord, RunStore};
use testsmith::gates::StrategyGate;
use testsmith::pipeline::{
    CommandGenerationService, CommitSelection, PipelineOrchestrator, PipelineStageKind,
    RepositoryHandle, RunContext,
};
use testsmith::testsmith_config::TestsmithConfig;
use testsmith::ui::PipelineUI;
use testsmith::ui::progress::print_run_summary;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::super::Cli;
use super::repo::{load_config, resolve_repository};

/// Arguments of `testsmith run`.
pub struct RunOptions {
    pub commits: Vec<String>,
    pub base: Option<String>,
    pub recent: Option<usize>,
    pub branch: Option<String>,
    pub stages: Vec<PipelineStageKind>,
    pub output: Option<PathBuf>,
}

enum Plan {
    Stages(Vec<PipelineStageKind>),
    Single(PipelineStageKind),
}

impl Plan {
    fn len(&self) -> usize {
        match self {
            Plan::Stages(stages) => stages.len(),
            Plan::Single(_) => 1,
        }
    }
}

fn selection_for(options: &RunOptions, config: &TestsmithConfig) -> CommitSelection {
    if options.commits.is_empty() {
        CommitSelection::Recent {
            branch: options.branch.clone(),
            max_commits: options
                .recent
                .unwrap_or(config.toml.aggregation.max_commits),
        }
    } else {
        CommitSelection::Explicit {
            ids: options.commits.clone(),
            base: options.base.clone(),
        }
    }
}

fn load_record(store: &RunStore, run: Option<&str>) -> Result<RunRecord> {
    match run {
        Some(id) => store.load(id),
        None => store
            .latest()?
            .context("No saved runs. Run 'testsmith run' first."),
    }
}

/// Execute `plan` against `ctx` with the terminal UI attached, then save the run.
async fn drive(
    config: &TestsmithConfig,
    ctx: RunContext,
    plan: Plan,
    output: Option<&Path>,
) -> Result<RunRecord> {
    let service = Arc::new(CommandGenerationService::new(
        config.generator_command(),
        &ctx.repository.path,
    ));
    if !service.is_configured() {
        println!(
            "{} No generation command configured; generation stages will fail.",
            style("warning:").yellow().bold()
        );
    }
    let orchestrator = PipelineOrchestrator::new(service, config.toml.pipeline_settings());

    let ui = Arc::new(PipelineUI::new(plan.len() as u64, config.verbose));
    let gate = Arc::new(StrategyGate::new(config.auto_confirm()).with_multi_progress(ui.multi()));

    let (tx, mut rx) = mpsc::channel(100);
    let ui_events = ui.clone();
    let listener = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            ui_events.handle_event(&event);
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut ctx = ctx
        .with_progress_sink(ui.clone())
        .with_confirmation(gate)
        .with_cancel_token(cancel)
        .with_event_channel(tx);

    match plan {
        Plan::Stages(stages) => {
            orchestrator.execute_stages(&mut ctx, &stages).await;
        }
        Plan::Single(stage) => {
            orchestrator.execute_single(&mut ctx, stage).await;
        }
    }
    interrupt.abort();

    let mut record = RunRecord::from_context(&ctx);
    record.finish();
    // Dropping the context closes the event channel so the listener drains and exits.
    drop(ctx);
    listener.await.ok();
    ui.finish();

    let store = RunStore::new(&config.runs_dir());
    let path = store.save(&record)?;
    tracing::info!(run_id = %record.run_id, path = %path.display(), "Run record saved");

    print_run_summary(&record.results);
    println!();
    println!(
        "Run {} saved to {}",
        style(record.short_id()).cyan(),
        path.display()
    );

    if let Some(output) = output {
        let json =
            serde_json::to_string_pretty(&record).context("Failed to serialize run results")?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Results written to {}", output.display());
    }

    if let Some(stage) = record.progress().failed_stage() {
        bail!(
            "Stage {} failed. Fix the cause and run 'testsmith resume {}'",
            stage.label(),
            record.short_id()
        );
    }
    Ok(record)
}

pub async fn run_pipeline(cli: &Cli, project_dir: PathBuf, options: RunOptions) -> Result<()> {
    let config = load_config(cli, &project_dir)?;
    let repo_path = resolve_repository(&config).await?;

    let mut repository = RepositoryHandle::new(repo_path);
    if let Some(branch) = options
        .branch
        .clone()
        .or_else(|| config.toml.repository.branch.clone())
    {
        repository = repository.with_branch(branch);
    }

    let mut selection = selection_for(&options, &config);
    if let CommitSelection::Recent { ref mut branch, .. } = selection
        && branch.is_none()
    {
        *branch = repository.branch.clone();
    }

    let mut ctx = RunContext::new(repository, selection)
        .with_skipped_strategy(config.toml.pipeline.skipped_strategy);
    if let Some(project) = config.toml.project_info() {
        ctx = ctx.with_project(project);
    }

    let stages = if options.stages.is_empty() {
        PipelineStageKind::ALL.to_vec()
    } else {
        options.stages.clone()
    };

    println!(
        "{} run {} in {}",
        style("Starting").bold(),
        style(&ctx.run_id.to_string()[..8]).cyan(),
        ctx.repository.path.display()
    );

    drive(&config, ctx, Plan::Stages(stages), options.output.as_deref()).await?;
    Ok(())
}

pub async fn run_single_stage(
    cli: &Cli,
    project_dir: PathBuf,
    stage: PipelineStageKind,
    run: Option<&str>,
) -> Result<()> {
    let config = load_config(cli, &project_dir)?;
    let store = RunStore::new(&config.runs_dir());
    let record = load_record(&store, run)?;

    println!(
        "{} {} for run {}",
        style("Re-running").bold(),
        stage.label(),
        style(record.short_id()).cyan()
    );

    drive(&config, record.into_context(), Plan::Single(stage), None).await?;
    Ok(())
}

pub async fn resume_run(cli: &Cli, project_dir: PathBuf, run: Option<&str>) -> Result<()> {
    let config = load_config(cli, &project_dir)?;
    let store = RunStore::new(&config.runs_dir());
    let record = load_record(&store, run)?;

    let remaining = record.remaining_stages();
    let Some(first) = remaining.first() else {
        println!(
            "Run {} has no unfinished stages.",
            style(record.short_id()).cyan()
        );
        return Ok(());
    };

    println!(
        "{} run {} from {}",
        style("Resuming").bold(),
        style(record.short_id()).cyan(),
        first.label()
    );

    drive(&config, record.into_context(), Plan::Stages(remaining), None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(commits: &[&str], recent: Option<usize>) -> RunOptions {
        RunOptions {
            commits: commits.iter().map(|c| c.to_string()).collect(),
            base: None,
            recent,
            branch: None,
            stages: Vec::new(),
            output: None,
        }
    }

    fn config() -> TestsmithConfig {
        let dir = tempfile::tempdir().unwrap();
        TestsmithConfig::new(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_explicit_commits_select_a_window() {
        let selection = selection_for(&options(&["abc", "def"], None), &config());
        assert_eq!(
            selection,
            CommitSelection::Explicit {
                ids: vec!["abc".to_string(), "def".to_string()],
                base: None
            }
        );
    }

    #[test]
    fn test_recent_defaults_to_configured_max() {
        let config = config();
        let selection = selection_for(&options(&[], None), &config);
        assert_eq!(
            selection,
            CommitSelection::Recent {
                branch: None,
                max_commits: config.toml.aggregation.max_commits
            }
        );

        let selection = selection_for(&options(&[], Some(3)), &config);
        assert!(matches!(
            selection,
            CommitSelection::Recent { max_commits: 3, .. }
        ));
    }

    #[test]
    fn test_load_record_without_runs_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let err = load_record(&store, None).unwrap_err();
        assert!(err.to_string().contains("No saved runs"));
    }
}
