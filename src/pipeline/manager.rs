//! Concurrent run bookkeeping.
//!
//! Each run owns its [`RunContext`] on a spawned task. The manager keeps a
//! status map per run, fed by the run's event channel, so progress can be
//! queried while the run is still executing.

use crate::pipeline::context::{
    CommitSelection, ConfirmationCallback, ProgressSink, ProjectInfo, RepositoryHandle,
    SkippedStrategyPolicy,
};
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::progress::{RunProgress, progress_from_statuses};
use crate::pipeline::runner::PipelineOrchestrator;
use crate::pipeline::{PipelineStageKind, RunContext, StageStatus};
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Everything needed to start a run.
pub struct RunRequest {
    pub repository: RepositoryHandle,
    pub selection: CommitSelection,
    /// Stages to execute; all five when empty.
    pub stages: Vec<PipelineStageKind>,
    pub project: Option<ProjectInfo>,
    pub skipped_strategy: SkippedStrategyPolicy,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub confirmation: Option<Arc<dyn ConfirmationCallback>>,
}

impl RunRequest {
    pub fn new(repository: RepositoryHandle, selection: CommitSelection) -> Self {
        Self {
            repository,
            selection,
            stages: Vec::new(),
            project: None,
            skipped_strategy: SkippedStrategyPolicy::default(),
            progress: None,
            confirmation: None,
        }
    }

    pub fn into_context(self) -> (RunContext, Vec<PipelineStageKind>) {
        let mut ctx = RunContext::new(self.repository, self.selection)
            .with_skipped_strategy(self.skipped_strategy);
        if let Some(project) = self.project {
            ctx = ctx.with_project(project);
        }
        if let Some(sink) = self.progress {
            ctx = ctx.with_progress_sink(sink);
        }
        if let Some(callback) = self.confirmation {
            ctx = ctx.with_confirmation(callback);
        }
        (ctx, self.stages)
    }
}

struct RunEntry {
    statuses: BTreeMap<PipelineStageKind, StageStatus>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<RunContext>>,
    finished: bool,
}

/// Starts runs on background tasks and tracks their progress.
#[derive(Clone)]
pub struct RunManager {
    orchestrator: Arc<PipelineOrchestrator>,
    runs: Arc<Mutex<HashMap<Uuid, RunEntry>>>,
}

impl RunManager {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            orchestrator,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start_run(&self, request: RunRequest) -> Uuid {
        let (ctx, stages) = request.into_context();
        self.start_context(ctx, stages).await
    }

    /// Start executing an already built context, e.g. a resumed run.
    ///
    /// Results already in the context seed the status map.
    pub async fn start_context(&self, ctx: RunContext, stages: Vec<PipelineStageKind>) -> Uuid {
        let run_id = ctx.run_id;
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<PipelineEvent>(100);
        let statuses: BTreeMap<_, _> = ctx
            .results()
            .iter()
            .map(|(stage, result)| (*stage, result.status))
            .collect();

        let mut ctx = ctx
            .with_cancel_token(cancel.clone())
            .with_event_channel(tx);

        let mut runs = self.runs.lock().await;
        runs.insert(
            run_id,
            RunEntry {
                statuses,
                cancel,
                handle: None,
                finished: false,
            },
        );

        let runs_for_events = self.runs.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut runs = runs_for_events.lock().await;
                let Some(entry) = runs.get_mut(&run_id) else {
                    break;
                };
                match event {
                    PipelineEvent::StageStarted { stage } => {
                        entry.statuses.insert(stage, StageStatus::Running);
                    }
                    PipelineEvent::StageFinished { stage, status, .. } => {
                        entry.statuses.insert(stage, status);
                    }
                    PipelineEvent::RunFinished { .. } => {
                        entry.finished = true;
                    }
                    _ => {}
                }
            }
            debug!(run_id = %run_id, "Run event stream closed");
        });

        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move {
            if stages.is_empty() {
                orchestrator.execute_all(&mut ctx).await;
            } else {
                orchestrator.execute_stages(&mut ctx, &stages).await;
            }
            ctx.clear_event_channel();
            ctx
        });

        if let Some(entry) = runs.get_mut(&run_id) {
            entry.handle = Some(handle);
        }
        run_id
    }

    /// Progress snapshot for a run, or `None` for an unknown id.
    pub async fn status(&self, run_id: Uuid) -> Option<RunProgress> {
        let runs = self.runs.lock().await;
        runs.get(&run_id)
            .map(|entry| progress_from_statuses(&entry.statuses))
    }

    pub async fn is_finished(&self, run_id: Uuid) -> bool {
        let runs = self.runs.lock().await;
        runs.get(&run_id).is_some_and(|entry| {
            entry.finished || entry.handle.as_ref().is_some_and(|h| h.is_finished())
        })
    }

    /// Request cancellation. Returns false for an unknown id.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        let runs = self.runs.lock().await;
        match runs.get(&run_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for a run to finish and take back its context.
    ///
    /// The run is forgotten afterwards: `status` and `cancel` no longer know
    /// its id, and the returned context is the only record of it.
    pub async fn wait(&self, run_id: Uuid) -> Result<RunContext> {
        let handle = {
            let mut runs = self.runs.lock().await;
            let Some(entry) = runs.get_mut(&run_id) else {
                bail!("Unknown run: {}", run_id);
            };
            entry
                .handle
                .take()
                .with_context(|| format!("Run {} is already being awaited", run_id))?
        };
        let joined = handle.await;
        self.runs.lock().await.remove(&run_id);
        debug!(run_id = %run_id, "Run handed back to caller");
        joined.context("Run task failed")
    }

    /// Number of runs still tracked, i.e. started and not yet awaited.
    pub async fn tracked(&self) -> usize {
        self.runs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;
    use crate::pipeline::handlers::{StageHandler, StageScope};
    use crate::pipeline::payload::{StagePayload, VcsAnalysisOutput};
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowAnalysis;

    #[async_trait]
    impl StageHandler for SlowAnalysis {
        async fn run(
            &self,
            _ctx: &RunContext,
            scope: &mut StageScope,
        ) -> Result<StagePayload, StageError> {
            scope
                .guarded("slow analysis", Duration::from_secs(10), async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await?;
            Ok(StagePayload::VcsAnalysis(VcsAnalysisOutput::PerCommit(Vec::new())))
        }
    }

    struct QuickAnalysis;

    #[async_trait]
    impl StageHandler for QuickAnalysis {
        async fn run(&self, _: &RunContext, _: &mut StageScope) -> Result<StagePayload, StageError> {
            Ok(StagePayload::VcsAnalysis(VcsAnalysisOutput::PerCommit(Vec::new())))
        }
    }

    /// Poll until the status map shows `completed` finished stages.
    async fn settled(manager: &RunManager, run_id: Uuid, completed: usize) -> RunProgress {
        for _ in 0..200 {
            if let Some(progress) = manager.status(run_id).await
                && progress.completed_stages == completed
            {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} never reached {} completed stages", run_id, completed);
    }

    fn request() -> RunRequest {
        let mut request = RunRequest::new(RepositoryHandle::new("/tmp/repo"), CommitSelection::recent(2));
        request.stages = vec![PipelineStageKind::VcsAnalysis];
        request
    }

    #[tokio::test]
    async fn test_unknown_run_has_no_status() {
        let manager = RunManager::new(Arc::new(PipelineOrchestrator::empty()));
        assert!(manager.status(Uuid::new_v4()).await.is_none());
        assert!(!manager.cancel(Uuid::new_v4()).await);
        assert!(manager.wait(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_run_completes_and_reports_progress() {
        let orchestrator = PipelineOrchestrator::empty()
            .with_handler(PipelineStageKind::VcsAnalysis, Arc::new(QuickAnalysis));
        let manager = RunManager::new(Arc::new(orchestrator));

        let run_id = manager.start_run(request()).await;
        let progress = settled(&manager, run_id, 1).await;
        assert_eq!(progress.current_stage, Some(PipelineStageKind::TestStrategy));
        assert!(manager.is_finished(run_id).await);

        let ctx = manager.wait(run_id).await.unwrap();
        assert_eq!(ctx.run_id, run_id);
        assert_eq!(ctx.status(PipelineStageKind::VcsAnalysis), StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_forgets_the_run() {
        let orchestrator = PipelineOrchestrator::empty()
            .with_handler(PipelineStageKind::VcsAnalysis, Arc::new(QuickAnalysis));
        let manager = RunManager::new(Arc::new(orchestrator));

        for _ in 0..3 {
            let run_id = manager.start_run(request()).await;
            manager.wait(run_id).await.unwrap();
            assert!(manager.status(run_id).await.is_none());
            assert!(!manager.cancel(run_id).await);
        }
        assert_eq!(manager.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_running_stage() {
        let orchestrator = PipelineOrchestrator::empty()
            .with_handler(PipelineStageKind::VcsAnalysis, Arc::new(SlowAnalysis));
        let manager = RunManager::new(Arc::new(orchestrator));

        let run_id = manager.start_run(request()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.cancel(run_id).await);

        let ctx = manager.wait(run_id).await.unwrap();
        let result = ctx.result(PipelineStageKind::VcsAnalysis).unwrap();
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.failure, Some(crate::errors::StageErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let orchestrator = PipelineOrchestrator::empty()
            .with_handler(PipelineStageKind::VcsAnalysis, Arc::new(QuickAnalysis));
        let manager = RunManager::new(Arc::new(orchestrator));

        let first = manager.start_run(request()).await;
        let second = manager.start_run(request()).await;
        assert_ne!(first, second);

        let a = manager.wait(first).await.unwrap();
        let b = manager.wait(second).await.unwrap();
        assert_eq!(a.results().len(), 1);
        assert_eq!(b.results().len(), 1);
        assert!(manager.wait(first).await.is_err());
    }
}
