//! Persisted run records.
//!
//! Every `run`, `stage` and `resume` invocation writes a [`RunRecord`] to
//! `.testsmith/runs/<run_id>.json` so results can be inspected with `status`
//! and continued with `resume`.

pub mod store;

pub use store::RunStore;

use crate::pipeline::{
    CommitSelection, PipelineStageKind, ProjectInfo, RepositoryHandle, RunContext, RunProgress,
    SkippedStrategyPolicy, StageResult, StageStatus, get_run_progress,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub repository: RepositoryHandle,
    pub selection: CommitSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectInfo>,
    #[serde(default)]
    pub skipped_strategy: SkippedStrategyPolicy,
    #[serde(default)]
    pub results: BTreeMap<PipelineStageKind, StageResult>,
}

impl RunRecord {
    /// Snapshot a context. `started_at` is the earliest stage start, or now.
    pub fn from_context(ctx: &RunContext) -> Self {
        let started_at = ctx
            .results()
            .values()
            .map(|r| r.started_at)
            .min()
            .unwrap_or_else(Utc::now);
        Self {
            run_id: ctx.run_id,
            started_at,
            ended_at: None,
            repository: ctx.repository.clone(),
            selection: ctx.selection.clone(),
            project: ctx.project.clone(),
            skipped_strategy: ctx.skipped_strategy,
            results: ctx.results().clone(),
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Rebuild a context carrying this record's id and results.
    ///
    /// Stages left `Running` by an interrupted process are dropped so they
    /// run again.
    pub fn into_context(self) -> RunContext {
        let results = self
            .results
            .into_iter()
            .filter(|(_, r)| r.status != StageStatus::Running)
            .collect();
        let mut ctx = RunContext::new(self.repository, self.selection)
            .with_run_id(self.run_id)
            .with_skipped_strategy(self.skipped_strategy)
            .with_results(results);
        if let Some(project) = self.project {
            ctx = ctx.with_project(project);
        }
        ctx
    }

    pub fn progress(&self) -> RunProgress {
        get_run_progress(&self.results)
    }

    /// Stages a resume should execute: everything from the first stage that
    /// did not complete or get skipped.
    pub fn remaining_stages(&self) -> Vec<PipelineStageKind> {
        let first_open = PipelineStageKind::ALL.iter().position(|stage| {
            !matches!(
                self.results.get(stage).map(|r| r.status),
                Some(StageStatus::Completed) | Some(StageStatus::Skipped)
            )
        });
        match first_open {
            Some(index) => PipelineStageKind::ALL[index..].to_vec(),
            None => Vec::new(),
        }
    }

    pub fn short_id(&self) -> String {
        self.run_id.to_string()[..8].to_string()
    }
}
