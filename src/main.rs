use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use testsmith::pipeline::PipelineStageKind;

mod cmd;

#[derive(Parser)]
#[command(name = "testsmith")]
#[command(version, about = "Commit-history driven test generation")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Accept the test strategy without prompting
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Analyze a remote repository (cloned into .testsmith/clones/)
    #[arg(long, global = true)]
    pub repo_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new testsmith project
    Init,
    /// List recent commits
    Commits {
        /// Maximum number of commits to list
        #[arg(short = 'n', long, default_value = "20")]
        max: usize,
        /// Branch or revision to walk from (default: HEAD)
        #[arg(short, long)]
        branch: Option<String>,
        /// Only commits whose author name or email contains this
        #[arg(long)]
        author: Option<String>,
        /// Only commits at or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Only commits at or before this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        no_merges: bool,
        /// Hide commits that mostly touch tests
        #[arg(long)]
        exclude_tests: bool,
        #[arg(long)]
        json: bool,
    },
    /// List local branches
    Branches {
        #[arg(long)]
        json: bool,
    },
    /// Search commit messages and authors
    Search {
        query: String,
        /// Commits to scan (default: aggregation.lookback)
        #[arg(long)]
        lookback: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Aggregate selected commits into one change set
    Diff {
        #[arg(required = true)]
        commits: Vec<String>,
        /// Explicit base revision instead of the earliest commit's parent
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Analyze a single commit
    Analyze {
        commit: String,
        #[arg(long)]
        json: bool,
    },
    /// Rank files that change together with a path
    Related {
        path: String,
        /// Commits touching the path to scan (default: aggregation.lookback)
        #[arg(long)]
        lookback: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Print a file as it was at a revision
    Show {
        revision: String,
        path: String,
    },
    /// Run the test generation pipeline
    Run {
        /// Commits to aggregate (comma-separated); default is the most recent commits
        #[arg(short, long, value_delimiter = ',')]
        commits: Vec<String>,
        /// Explicit base revision for --commits
        #[arg(long, requires = "commits")]
        base: Option<String>,
        /// Analyze this many recent commits (default: aggregation.max_commits)
        #[arg(long, conflicts_with = "commits")]
        recent: Option<usize>,
        #[arg(short, long)]
        branch: Option<String>,
        /// Stages to run (comma-separated); default is all five
        #[arg(long, value_delimiter = ',')]
        stages: Vec<PipelineStageKind>,
        /// Write the final results as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Re-run a single stage against a saved run
    Stage {
        stage: PipelineStageKind,
        /// Run id or unique prefix (default: latest run)
        #[arg(long)]
        run: Option<String>,
    },
    /// Continue a saved run from its first unfinished stage
    Resume {
        /// Run id or unique prefix (default: latest run)
        run: Option<String>,
    },
    /// Show saved runs, or one run in detail
    Status {
        run: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default testsmith.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = testsmith::init::get_testsmith_dir(&project_dir).join("logs");
    let _log_guard = testsmith::telemetry::init_tracing(cli.verbose, cli.log_json, Some(&log_dir));

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Commits {
            max,
            branch,
            author,
            since,
            until,
            no_merges,
            exclude_tests,
            json,
        } => {
            let query = cmd::CommitQuery {
                max: *max,
                branch: branch.clone(),
                author: author.clone(),
                since: since.clone(),
                until: until.clone(),
                no_merges: *no_merges,
                exclude_tests: *exclude_tests,
            };
            cmd::cmd_commits(&cli, &project_dir, query, *json).await?
        }
        Commands::Branches { json } => cmd::cmd_branches(&cli, &project_dir, *json).await?,
        Commands::Search {
            query,
            lookback,
            json,
        } => cmd::cmd_search(&cli, &project_dir, query, *lookback, *json).await?,
        Commands::Diff { commits, base, json } => {
            cmd::cmd_diff(&cli, &project_dir, commits, base.as_deref(), *json).await?
        }
        Commands::Analyze { commit, json } => {
            cmd::cmd_analyze(&cli, &project_dir, commit, *json).await?
        }
        Commands::Related {
            path,
            lookback,
            json,
        } => cmd::cmd_related(&cli, &project_dir, path, *lookback, *json).await?,
        Commands::Show { revision, path } => {
            cmd::cmd_show(&cli, &project_dir, revision, path).await?
        }
        Commands::Run {
            commits,
            base,
            recent,
            branch,
            stages,
            output,
        } => {
            let options = cmd::RunOptions {
                commits: commits.clone(),
                base: base.clone(),
                recent: *recent,
                branch: branch.clone(),
                stages: stages.clone(),
                output: output.clone(),
            };
            cmd::run_pipeline(&cli, project_dir, options).await?
        }
        Commands::Stage { stage, run } => {
            cmd::run_single_stage(&cli, project_dir, *stage, run.as_deref()).await?
        }
        Commands::Resume { run } => cmd::resume_run(&cli, project_dir, run.as_deref()).await?,
        Commands::Status { run, json } => cmd::cmd_status(&project_dir, run.as_deref(), *json)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
