//! Stage handlers.
//!
//! Each handler reads upstream payloads from the [`RunContext`], fails fast
//! with `MissingDependency` when one is absent, and otherwise produces its own
//! [`StagePayload`]. Blocking repository work runs on the blocking pool and
//! every external call goes through [`StageScope::guarded`], which applies the
//! configured timeout and the run's cancellation token.

use crate::changes::{AggregationLimits, ChangeAggregator, FileDelta};
use crate::errors::{ServiceError, StageError};
use crate::pipeline::context::{CommitSelection, ProgressSink, RunContext, SkippedStrategyPolicy};
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::payload::{
    GeneratedTests, ReviewRecord, ScenarioSet, StagePayload, StrategyRecord, VcsAnalysisOutput,
};
use crate::pipeline::service::GenerationService;
use crate::pipeline::{PipelineStageKind, StageStatus};
use crate::tracker::{CommitFilter, GitStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Timeouts and limits applied by the built-in stage handlers.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub service_timeout: Duration,
    pub store_timeout: Duration,
    pub limits: AggregationLimits,
    /// Applied to recent-commit selection; explicit selections are never filtered.
    pub recent_filter: CommitFilter,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            service_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(30),
            limits: AggregationLimits::default(),
            recent_filter: CommitFilter {
                exclude_merges: true,
                exclude_test_commits: true,
                ..Default::default()
            },
        }
    }
}

/// Per-execution helper handed to a handler.
///
/// Collects warnings, forwards progress to the run's sink, and wraps slow
/// calls with timeout and cancellation.
pub struct StageScope {
    stage: PipelineStageKind,
    sink: Option<Arc<dyn ProgressSink>>,
    events: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
    warnings: Vec<String>,
}

impl StageScope {
    pub fn new(stage: PipelineStageKind, ctx: &RunContext) -> Self {
        Self {
            stage,
            sink: ctx.progress_sink(),
            events: ctx.event_sender(),
            cancel: ctx.cancel_token().clone(),
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> PipelineStageKind {
        self.stage
    }

    /// Report progress synchronously. `fraction` is clamped to `[0, 1]`.
    pub fn report(&self, fraction: f64, message: impl AsRef<str>) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let message = message.as_ref();
        if let Some(ref sink) = self.sink {
            sink.report(self.stage.name(), fraction, message);
        }
        if let Some(ref tx) = self.events {
            // Progress events are best-effort; a full channel drops them.
            tx.try_send(PipelineEvent::StageProgress {
                stage: self.stage,
                fraction,
                message: message.to_string(),
            })
            .ok();
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(stage = %self.stage, "{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    pub fn check_cancelled(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Await `fut` under `limit`, aborting early if the run is cancelled.
    pub async fn guarded<T, F>(
        &self,
        operation: &str,
        limit: Duration,
        fut: F,
    ) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        self.check_cancelled()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageError::Cancelled),
            outcome = tokio::time::timeout(limit, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout {
                    operation: operation.to_string(),
                    secs: limit.as_secs(),
                }),
            },
        }
    }

    /// Run blocking repository work on the blocking pool under `limit`.
    pub async fn blocking<T, F>(
        &self,
        operation: &str,
        limit: Duration,
        work: F,
    ) -> Result<T, StageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StageError> + Send + 'static,
    {
        let op = operation.to_string();
        self.guarded(operation, limit, async move {
            tokio::task::spawn_blocking(work)
                .await
                .map_err(|e| StageError::Unexpected(format!("{} task failed: {}", op, e)))?
        })
        .await
    }

    /// Call the generation service under `limit`.
    pub async fn invoke(
        &self,
        service: &dyn GenerationService,
        input: Value,
        limit: Duration,
    ) -> Result<Value, StageError> {
        let stage = self.stage;
        self.guarded("generation service", limit, async move {
            service.invoke(stage, input).await.map_err(StageError::from)
        })
        .await
    }
}

/// One pipeline stage. Implementations must not mutate the context.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError>;
}

fn decode<T: DeserializeOwned>(stage: PipelineStageKind, value: Value) -> Result<T, StageError> {
    serde_json::from_value(value).map_err(|e| {
        StageError::Service(ServiceError::InvalidResponse(format!(
            "{} response: {}",
            stage.slug(),
            e
        )))
    })
}

fn missing(stage: PipelineStageKind, needs: PipelineStageKind) -> StageError {
    StageError::MissingDependency { stage, needs }
}

fn require_analysis<'a>(
    ctx: &'a RunContext,
    stage: PipelineStageKind,
) -> Result<&'a VcsAnalysisOutput, StageError> {
    match ctx.completed_payload(PipelineStageKind::VcsAnalysis) {
        Some(StagePayload::VcsAnalysis(output)) => Ok(output),
        _ => Err(missing(stage, PipelineStageKind::VcsAnalysis)),
    }
}

fn require_tests<'a>(
    ctx: &'a RunContext,
    stage: PipelineStageKind,
) -> Result<&'a GeneratedTests, StageError> {
    match ctx.completed_payload(PipelineStageKind::TestCodeGeneration) {
        Some(StagePayload::TestCode(tests)) => Ok(tests),
        _ => Err(missing(stage, PipelineStageKind::TestCodeGeneration)),
    }
}

/// Strategy payload plus whether it was confirmed.
///
/// A declined (`Skipped`) strategy is usable only under the degraded policy.
fn strategy_for<'a>(ctx: &'a RunContext) -> Option<(&'a StrategyRecord, bool)> {
    let result = ctx.result(PipelineStageKind::TestStrategy)?;
    let Some(StagePayload::Strategy(record)) = result.payload.as_ref() else {
        return None;
    };
    match result.status {
        StageStatus::Completed => Some((record, true)),
        StageStatus::Skipped if ctx.skipped_strategy == SkippedStrategyPolicy::Degraded => {
            Some((record, false))
        }
        _ => None,
    }
}

fn project_json(ctx: &RunContext) -> Value {
    ctx.project
        .as_ref()
        .map(|p| json!(p))
        .unwrap_or(Value::Null)
}

fn analysis_json(analysis: &VcsAnalysisOutput) -> Value {
    json!(analysis)
}

fn files_without_text(files: &[FileDelta]) -> Vec<String> {
    files
        .iter()
        .filter(|f| f.patch.is_empty() && f.churn() == 0)
        .map(|f| f.path.clone())
        .collect()
}

/// Stage 1: aggregate the selected commits, or analyze recent ones.
pub struct VcsAnalysisHandler {
    settings: PipelineSettings,
}

impl VcsAnalysisHandler {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl StageHandler for VcsAnalysisHandler {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError> {
        let repo_path: PathBuf = ctx.repository.path.clone();
        let limits = self.settings.limits;
        let limit = self.settings.store_timeout;
        let filter = self.settings.recent_filter.clone();

        let output = match ctx.selection.clone() {
            CommitSelection::Explicit { ids, base } => {
                scope.report(0.1, format!("Aggregating {} selected commits", ids.len()));
                let set = scope
                    .blocking("change aggregation", limit, move || {
                        let store = GitStore::open(&repo_path)?;
                        let set = ChangeAggregator::new(&store)
                            .with_limits(limits)
                            .aggregate_changes(&ids, base.as_deref())?;
                        Ok(set)
                    })
                    .await?;
                for path in files_without_text(&set.files) {
                    scope.warn(format!("No textual diff available for {}", path));
                }
                VcsAnalysisOutput::Aggregated(set)
            }
            CommitSelection::Recent {
                branch,
                max_commits,
            } => {
                let branch = branch.or_else(|| ctx.repository.branch.clone());
                scope.report(
                    0.1,
                    format!("Analyzing the {} most recent commits", max_commits),
                );
                let analyses = scope
                    .blocking("commit analysis", limit, move || {
                        let store = GitStore::open(&repo_path)?;
                        let aggregator = ChangeAggregator::new(&store).with_limits(limits);
                        let reference = match branch {
                            Some(ref b) => Some(aggregator.validate_branch(b)?),
                            None => None,
                        };
                        Ok(aggregator.analyze_recent(reference.as_deref(), max_commits, &filter)?)
                    })
                    .await?;
                if analyses.is_empty() {
                    scope.warn("No matching commits found in recent history");
                }
                for analysis in &analyses {
                    for path in files_without_text(&analysis.files) {
                        scope.warn(format!(
                            "No textual diff available for {} in {}",
                            path, analysis.commit.short_id
                        ));
                    }
                }
                VcsAnalysisOutput::PerCommit(analyses)
            }
        };

        let totals = output.totals();
        scope.report(
            1.0,
            format!(
                "{} commits, {} files, +{} -{}",
                output.commit_count(),
                totals.files,
                totals.additions,
                totals.deletions
            ),
        );
        Ok(StagePayload::VcsAnalysis(output))
    }
}

/// Stage 2: ask the service for a test strategy.
pub struct StrategyHandler {
    service: Arc<dyn GenerationService>,
    settings: PipelineSettings,
}

impl StrategyHandler {
    pub fn new(service: Arc<dyn GenerationService>, settings: PipelineSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl StageHandler for StrategyHandler {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError> {
        let stage = PipelineStageKind::TestStrategy;
        let analysis = require_analysis(ctx, stage)?;

        scope.report(0.2, "Determining test strategy");
        let input = json!({
            "project": project_json(ctx),
            "analysis": analysis_json(analysis),
        });
        let response = scope
            .invoke(self.service.as_ref(), input, self.settings.service_timeout)
            .await?;
        let record: StrategyRecord = decode(stage, response)?;

        if record.rationale.trim().is_empty() {
            scope.warn("Strategy response has no rationale");
        }
        scope.report(1.0, format!("Primary approach: {}", record.primary));
        Ok(StagePayload::Strategy(record))
    }
}

/// Stage 3: generate test code from the strategy and analysis.
pub struct TestCodeHandler {
    service: Arc<dyn GenerationService>,
    settings: PipelineSettings,
}

impl TestCodeHandler {
    pub fn new(service: Arc<dyn GenerationService>, settings: PipelineSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl StageHandler for TestCodeHandler {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError> {
        let stage = PipelineStageKind::TestCodeGeneration;
        let analysis = require_analysis(ctx, stage)?;
        let (strategy, confirmed) =
            strategy_for(ctx).ok_or_else(|| missing(stage, PipelineStageKind::TestStrategy))?;
        if !confirmed {
            scope.warn("Test strategy was not confirmed; generating tests in degraded mode");
        }

        scope.report(0.2, "Generating test code");
        let input = json!({
            "project": project_json(ctx),
            "analysis": analysis_json(analysis),
            "strategy": strategy,
            "strategy_confirmed": confirmed,
        });
        let response = scope
            .invoke(self.service.as_ref(), input, self.settings.service_timeout)
            .await?;
        let mut tests: GeneratedTests = decode(stage, response)?;
        tests.strategy_confirmed = confirmed;
        tests.recount();

        if tests.tests.is_empty() {
            scope.warn("Generation service returned no tests");
        }
        scope.report(1.0, format!("Generated {} tests", tests.tests.len()));
        Ok(StagePayload::TestCode(tests))
    }
}

/// Stage 4: derive scenarios from the analysis and generated tests.
pub struct ScenarioHandler {
    service: Arc<dyn GenerationService>,
    settings: PipelineSettings,
}

impl ScenarioHandler {
    pub fn new(service: Arc<dyn GenerationService>, settings: PipelineSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl StageHandler for ScenarioHandler {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError> {
        let stage = PipelineStageKind::TestScenarioGeneration;
        let analysis = require_analysis(ctx, stage)?;
        let tests = require_tests(ctx, stage)?;

        scope.report(0.2, "Generating test scenarios");
        let input = json!({
            "project": project_json(ctx),
            "analysis": analysis_json(analysis),
            "tests": tests,
        });
        let response = scope
            .invoke(self.service.as_ref(), input, self.settings.service_timeout)
            .await?;
        let mut scenarios: ScenarioSet = decode(stage, response)?;
        scenarios.normalize();

        scope.report(
            1.0,
            format!("Generated {} scenarios", scenarios.scenarios.len()),
        );
        Ok(StagePayload::Scenarios(scenarios))
    }
}

/// Stage 5: review everything produced so far.
pub struct ReviewHandler {
    service: Arc<dyn GenerationService>,
    settings: PipelineSettings,
}

impl ReviewHandler {
    pub fn new(service: Arc<dyn GenerationService>, settings: PipelineSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl StageHandler for ReviewHandler {
    async fn run(
        &self,
        ctx: &RunContext,
        scope: &mut StageScope,
    ) -> Result<StagePayload, StageError> {
        let stage = PipelineStageKind::ReviewGeneration;
        let analysis = require_analysis(ctx, stage)?;
        let tests = require_tests(ctx, stage)?;
        let scenarios = match ctx.completed_payload(PipelineStageKind::TestScenarioGeneration) {
            Some(StagePayload::Scenarios(set)) => set,
            _ => return Err(missing(stage, PipelineStageKind::TestScenarioGeneration)),
        };
        let (strategy, confirmed) = match strategy_for(ctx) {
            Some((record, confirmed)) => (json!(record), confirmed),
            None => (Value::Null, false),
        };

        scope.report(0.2, "Generating review");
        let input = json!({
            "project": project_json(ctx),
            "analysis": analysis_json(analysis),
            "strategy": strategy,
            "strategy_confirmed": confirmed,
            "tests": tests,
            "scenarios": scenarios,
        });
        let response = scope
            .invoke(self.service.as_ref(), input, self.settings.service_timeout)
            .await?;
        let mut review: ReviewRecord = decode(stage, response)?;
        review.rank_suggestions();

        let totals = analysis.totals();
        review
            .metrics
            .entry("files_analyzed".to_string())
            .or_insert(totals.files as f64);
        review
            .metrics
            .entry("tests_generated".to_string())
            .or_insert(tests.tests.len() as f64);
        review
            .metrics
            .entry("scenarios_generated".to_string())
            .or_insert(scenarios.scenarios.len() as f64);

        scope.report(
            1.0,
            format!("Review ready with {} suggestions", review.suggestions.len()),
        );
        Ok(StagePayload::Review(review))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::{CommitSelection, RepositoryHandle};
    use std::sync::Mutex;

    fn context() -> RunContext {
        RunContext::new(RepositoryHandle::new("/nonexistent"), CommitSelection::recent(5))
    }

    #[tokio::test]
    async fn test_report_clamps_fraction() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let ctx = context().with_progress_sink(Arc::new(move |_: &str, fraction: f64, _: &str| {
            seen_clone.lock().unwrap().push(fraction);
        }));
        let scope = StageScope::new(PipelineStageKind::VcsAnalysis, &ctx);
        scope.report(1.7, "over");
        scope.report(-0.2, "under");
        scope.report(f64::NAN, "nan");
        assert_eq!(seen.lock().unwrap().as_slice(), [1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_guarded_times_out() {
        let ctx = context();
        let scope = StageScope::new(PipelineStageKind::TestStrategy, &ctx);
        let err = scope
            .guarded("slow call", Duration::from_millis(20), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StageError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Timeout { ref operation, .. } if operation == "slow call"));
    }

    #[tokio::test]
    async fn test_guarded_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = context().with_cancel_token(token.clone());
        let scope = StageScope::new(PipelineStageKind::TestStrategy, &ctx);
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = scope
            .guarded("slow call", Duration::from_secs(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StageError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
    }

    #[tokio::test]
    async fn test_warnings_are_collected() {
        let ctx = context();
        let mut scope = StageScope::new(PipelineStageKind::ReviewGeneration, &ctx);
        scope.warn("first");
        scope.warn(String::from("second"));
        assert_eq!(scope.warnings(), ["first", "second"]);
        assert_eq!(scope.into_warnings().len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_of_missing_repository_fails_with_store_error() {
        let ctx = context();
        let mut scope = StageScope::new(PipelineStageKind::VcsAnalysis, &ctx);
        let err = VcsAnalysisHandler::new(PipelineSettings::default())
            .run(&ctx, &mut scope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::StageErrorKind::Store);
    }
}
