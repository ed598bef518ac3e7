//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                          |
//! |------------|-----------------------------------------------------------|
//! | `project`  | `Init`                                                    |
//! | `analysis` | `Commits`, `Branches`, `Search`, `Diff`, `Analyze`, `Related`, `Show` |
//! | `run`      | `Run`, `Stage`, `Resume`                                  |
//! | `status`   | `Status`                                                  |
//! | `config`   | `Config`                                                  |
//!
//! `repo` resolves which repository a command reads from.

pub mod analysis;
pub mod config;
pub mod project;
pub mod repo;
pub mod run;
pub mod status;

pub use analysis::{
    CommitQuery, cmd_analyze, cmd_branches, cmd_commits, cmd_diff, cmd_related, cmd_search,
    cmd_show,
};
pub use config::cmd_config;
pub use project::cmd_init;
pub use run::{RunOptions, resume_run, run_pipeline, run_single_stage};
pub use status::cmd_status;
