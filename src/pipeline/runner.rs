use crate::errors::StageError;
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::handlers::{
    PipelineSettings, ReviewHandler, ScenarioHandler, StageHandler, StageScope, StrategyHandler,
    TestCodeHandler, VcsAnalysisHandler,
};
use crate::pipeline::service::GenerationService;
use crate::pipeline::{PipelineStageKind, RunContext, StageResult, StageStatus};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Title passed to the confirmation callback after the strategy stage.
pub const CONFIRMATION_TITLE: &str = "Test strategy determined. Continue with test generation?";

/// Runs pipeline stages in fixed order against a [`RunContext`].
///
/// The orchestrator never retries. A stage that fails stops the remaining
/// stages of an [`execute_all`](Self::execute_all) call; a declined strategy
/// is recorded as `Skipped` and does not stop the run.
pub struct PipelineOrchestrator {
    handlers: BTreeMap<PipelineStageKind, Arc<dyn StageHandler>>,
}

impl PipelineOrchestrator {
    /// Orchestrator with the built-in handler for every stage.
    pub fn new(service: Arc<dyn GenerationService>, settings: PipelineSettings) -> Self {
        Self::empty()
            .with_handler(
                PipelineStageKind::VcsAnalysis,
                Arc::new(VcsAnalysisHandler::new(settings.clone())),
            )
            .with_handler(
                PipelineStageKind::TestStrategy,
                Arc::new(StrategyHandler::new(service.clone(), settings.clone())),
            )
            .with_handler(
                PipelineStageKind::TestCodeGeneration,
                Arc::new(TestCodeHandler::new(service.clone(), settings.clone())),
            )
            .with_handler(
                PipelineStageKind::TestScenarioGeneration,
                Arc::new(ScenarioHandler::new(service.clone(), settings.clone())),
            )
            .with_handler(
                PipelineStageKind::ReviewGeneration,
                Arc::new(ReviewHandler::new(service, settings)),
            )
    }

    /// Orchestrator with no handlers registered.
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register or replace the handler for `stage`.
    pub fn with_handler(mut self, stage: PipelineStageKind, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(stage, handler);
        self
    }

    /// Run every stage in order, stopping after the first failure.
    pub async fn execute_all(
        &self,
        ctx: &mut RunContext,
    ) -> BTreeMap<PipelineStageKind, StageResult> {
        self.execute_stages(ctx, &PipelineStageKind::ALL).await
    }

    /// Run the given stages in pipeline order, stopping after the first failure.
    ///
    /// Duplicates are ignored and the request order does not matter. Results
    /// already present in the context for other stages stay in the context;
    /// the returned map holds only the stages executed by this call.
    pub async fn execute_stages(
        &self,
        ctx: &mut RunContext,
        stages: &[PipelineStageKind],
    ) -> BTreeMap<PipelineStageKind, StageResult> {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();

        info!(run_id = %ctx.run_id, stages = ordered.len(), "Pipeline run started");
        ctx.emit(PipelineEvent::RunStarted {
            run_id: ctx.run_id,
            stages: ordered.clone(),
        })
        .await;

        let mut produced = BTreeMap::new();
        let mut failed_stage = None;
        for stage in ordered {
            let result = self.run_stage(ctx, stage).await;
            let failed = result.is_failed();
            produced.insert(stage, result);
            if failed {
                failed_stage = Some(stage);
                break;
            }
        }

        match failed_stage {
            Some(stage) => warn!(run_id = %ctx.run_id, stage = %stage, "Pipeline run stopped"),
            None => info!(run_id = %ctx.run_id, "Pipeline run finished"),
        }
        ctx.emit(PipelineEvent::RunFinished {
            run_id: ctx.run_id,
            failed_stage,
        })
        .await;

        produced
    }

    /// Run one stage against whatever the context already holds.
    pub async fn execute_single(&self, ctx: &mut RunContext, stage: PipelineStageKind) -> StageResult {
        self.run_stage(ctx, stage).await
    }

    async fn run_stage(&self, ctx: &mut RunContext, stage: PipelineStageKind) -> StageResult {
        let started_at = Utc::now();
        let start = Instant::now();

        ctx.set_result(StageResult::running(stage).with_started_at(started_at));
        ctx.emit(PipelineEvent::StageStarted { stage }).await;
        info!(run_id = %ctx.run_id, stage = %stage, "Stage started");

        let mut scope = StageScope::new(stage, ctx);
        let outcome = match self.handlers.get(&stage) {
            None => Err(StageError::Unexpected(format!(
                "no handler registered for {}",
                stage
            ))),
            Some(_) if ctx.is_cancelled() => Err(StageError::Cancelled),
            Some(handler) => {
                let run = AssertUnwindSafe(handler.run(ctx, &mut scope)).catch_unwind();
                match run.await {
                    Ok(Ok(payload)) if payload.stage() != stage => {
                        Err(StageError::Unexpected(format!(
                            "{} handler produced a {} payload",
                            stage,
                            payload.stage()
                        )))
                    }
                    Ok(outcome) => outcome,
                    Err(panic) => Err(StageError::Unexpected(panic_message(panic))),
                }
            }
        };

        let duration = start.elapsed();
        let warnings = scope.into_warnings();
        let mut result = match outcome {
            Ok(payload) => StageResult::completed(stage, payload, warnings, duration),
            Err(e) => {
                warn!(run_id = %ctx.run_id, stage = %stage, kind = %e.kind(), error = %e, "Stage failed");
                StageResult::failed(stage, &e, warnings, duration)
            }
        }
        .with_started_at(started_at);

        if stage == PipelineStageKind::TestStrategy
            && result.is_completed()
            && let Some(callback) = ctx.confirmation()
            && let Some(ref payload) = result.payload
        {
            let accepted = callback.confirm(CONFIRMATION_TITLE, payload);
            info!(run_id = %ctx.run_id, accepted, "Strategy confirmation answered");
            ctx.emit(PipelineEvent::GateDecided { stage, accepted }).await;
            if !accepted {
                result.status = StageStatus::Skipped;
                result
                    .warnings
                    .push("Test strategy was declined at the confirmation prompt".to_string());
            }
        }

        info!(
            run_id = %ctx.run_id,
            stage = %stage,
            status = %result.status,
            duration_ms = duration.as_millis() as u64,
            "Stage finished"
        );
        ctx.set_result(result.clone());
        ctx.emit(PipelineEvent::StageFinished {
            stage,
            status: result.status,
            duration_ms: duration.as_millis() as u64,
        })
        .await;
        result
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("stage handler panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageErrorKind;
    use crate::pipeline::context::{CommitSelection, RepositoryHandle};
    use crate::pipeline::payload::{
        GeneratedTests, ReviewRecord, ScenarioSet, StagePayload, StrategyRecord,
        VcsAnalysisOutput,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Handler returning a canned payload and counting its calls.
    struct Canned {
        payload: StagePayload,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StageHandler for Canned {
        async fn run(
            &self,
            _ctx: &RunContext,
            scope: &mut StageScope,
        ) -> Result<StagePayload, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            scope.report(0.5, "working");
            Ok(self.payload.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl StageHandler for Failing {
        async fn run(&self, _: &RunContext, _: &mut StageScope) -> Result<StagePayload, StageError> {
            Err(StageError::Unexpected("boom".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl StageHandler for Panicking {
        async fn run(&self, _: &RunContext, _: &mut StageScope) -> Result<StagePayload, StageError> {
            panic!("handler exploded");
        }
    }

    fn payload_for(stage: PipelineStageKind) -> StagePayload {
        match stage {
            PipelineStageKind::VcsAnalysis => {
                StagePayload::VcsAnalysis(VcsAnalysisOutput::PerCommit(Vec::new()))
            }
            PipelineStageKind::TestStrategy => StagePayload::Strategy(
                serde_json::from_str::<StrategyRecord>(r#"{"primary": "unit_test"}"#).unwrap(),
            ),
            PipelineStageKind::TestCodeGeneration => {
                StagePayload::TestCode(serde_json::from_str::<GeneratedTests>(r#"{"tests": []}"#).unwrap())
            }
            PipelineStageKind::TestScenarioGeneration => {
                StagePayload::Scenarios(ScenarioSet::default())
            }
            PipelineStageKind::ReviewGeneration => StagePayload::Review(ReviewRecord::default()),
        }
    }

    fn canned_orchestrator() -> (PipelineOrchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = PipelineOrchestrator::empty();
        for stage in PipelineStageKind::ALL {
            orchestrator = orchestrator.with_handler(
                stage,
                Arc::new(Canned {
                    payload: payload_for(stage),
                    calls: calls.clone(),
                }),
            );
        }
        (orchestrator, calls)
    }

    fn context() -> RunContext {
        RunContext::new(RepositoryHandle::new("/tmp/repo"), CommitSelection::recent(3))
    }

    #[tokio::test]
    async fn test_execute_all_runs_every_stage_in_order() {
        let (orchestrator, calls) = canned_orchestrator();
        let (tx, mut rx) = mpsc::channel(64);
        let mut ctx = context().with_event_channel(tx);

        let results = orchestrator.execute_all(&mut ctx).await;
        assert_eq!(results.len(), 5);
        assert!(results.values().all(|r| r.status == StageStatus::Completed));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        ctx.clear_event_channel();
        let mut started = Vec::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::StageStarted { stage } = event {
                started.push(stage);
            }
        }
        assert_eq!(started, PipelineStageKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_stages() {
        let (orchestrator, calls) = canned_orchestrator();
        let orchestrator =
            orchestrator.with_handler(PipelineStageKind::TestStrategy, Arc::new(Failing));
        let mut ctx = context();

        let results = orchestrator.execute_all(&mut ctx).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[&PipelineStageKind::VcsAnalysis].status, StageStatus::Completed);
        let failed = &results[&PipelineStageKind::TestStrategy];
        assert_eq!(failed.status, StageStatus::Failed);
        assert_eq!(failed.errors, ["Unexpected failure: boom"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_declined_strategy_is_skipped_and_run_continues() {
        let (orchestrator, _) = canned_orchestrator();
        let titles = Arc::new(std::sync::Mutex::new(Vec::new()));
        let titles_clone = titles.clone();
        let mut ctx = context().with_confirmation(Arc::new(move |title: &str, _: &StagePayload| {
            titles_clone.lock().unwrap().push(title.to_string());
            false
        }));

        let results = orchestrator.execute_all(&mut ctx).await;
        let strategy = &results[&PipelineStageKind::TestStrategy];
        assert_eq!(strategy.status, StageStatus::Skipped);
        assert!(matches!(strategy.payload, Some(StagePayload::Strategy(_))));
        assert_eq!(strategy.warnings.len(), 1);
        assert_eq!(titles.lock().unwrap().as_slice(), [CONFIRMATION_TITLE]);
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_confirmation_only_follows_strategy() {
        let (orchestrator, _) = canned_orchestrator();
        let asked = Arc::new(AtomicUsize::new(0));
        let asked_clone = asked.clone();
        let mut ctx = context().with_confirmation(Arc::new(move |_: &str, _: &StagePayload| {
            asked_clone.fetch_add(1, Ordering::SeqCst);
            true
        }));

        orchestrator.execute_all(&mut ctx).await;
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.status(PipelineStageKind::TestStrategy), StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected_failure() {
        let (orchestrator, _) = canned_orchestrator();
        let orchestrator =
            orchestrator.with_handler(PipelineStageKind::VcsAnalysis, Arc::new(Panicking));
        let mut ctx = context();

        let results = orchestrator.execute_all(&mut ctx).await;
        assert_eq!(results.len(), 1);
        let result = &results[&PipelineStageKind::VcsAnalysis];
        assert_eq!(result.failure, Some(StageErrorKind::Unexpected));
        assert!(result.errors[0].contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_next_stage() {
        let (orchestrator, calls) = canned_orchestrator();
        let mut ctx = context();
        ctx.cancel_token().cancel();

        let results = orchestrator.execute_all(&mut ctx).await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[&PipelineStageKind::VcsAnalysis].failure,
            Some(StageErrorKind::Cancelled)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_stage() {
        let mut ctx = context();
        let result = PipelineOrchestrator::empty()
            .execute_single(&mut ctx, PipelineStageKind::ReviewGeneration)
            .await;
        assert_eq!(result.failure, Some(StageErrorKind::Unexpected));
        assert_eq!(ctx.results().len(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = PipelineOrchestrator::empty().with_handler(
            PipelineStageKind::TestStrategy,
            Arc::new(Canned {
                payload: payload_for(PipelineStageKind::ReviewGeneration),
                calls,
            }),
        );
        let mut ctx = context();
        let result = orchestrator
            .execute_single(&mut ctx, PipelineStageKind::TestStrategy)
            .await;
        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.payload.is_none());
    }

    #[tokio::test]
    async fn test_subset_returns_only_executed_stages() {
        let (orchestrator, _) = canned_orchestrator();
        let mut ctx = context();
        orchestrator
            .execute_single(&mut ctx, PipelineStageKind::ReviewGeneration)
            .await;

        let results = orchestrator
            .execute_stages(&mut ctx, &[PipelineStageKind::VcsAnalysis])
            .await;
        assert_eq!(
            results.keys().copied().collect::<Vec<_>>(),
            vec![PipelineStageKind::VcsAnalysis]
        );
        assert_eq!(ctx.results().len(), 2);
        assert_eq!(
            ctx.status(PipelineStageKind::ReviewGeneration),
            StageStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_subset_runs_in_pipeline_order() {
        let (orchestrator, calls) = canned_orchestrator();
        let mut ctx = context();
        let results = orchestrator
            .execute_stages(
                &mut ctx,
                &[
                    PipelineStageKind::TestStrategy,
                    PipelineStageKind::VcsAnalysis,
                    PipelineStageKind::TestStrategy,
                ],
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(
            results[&PipelineStageKind::VcsAnalysis].started_at
                <= results[&PipelineStageKind::TestStrategy].started_at
        );
    }
}
