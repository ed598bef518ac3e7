use crate::pipeline::events::PipelineEvent;
use crate::pipeline::payload::StagePayload;
use crate::pipeline::progress::{RunProgress, get_run_progress};
use crate::pipeline::{PipelineStageKind, StageResult, StageStatus};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where the run reads history from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl RepositoryHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Which commits the analysis stage looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CommitSelection {
    /// Aggregate exactly these commits into one window diff.
    Explicit {
        ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base: Option<String>,
    },
    /// Analyze the most recent non-test commits one by one.
    Recent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        max_commits: usize,
    },
}

impl CommitSelection {
    pub fn explicit(ids: Vec<String>) -> Self {
        CommitSelection::Explicit { ids, base: None }
    }

    pub fn recent(max_commits: usize) -> Self {
        CommitSelection::Recent {
            branch: None,
            max_commits,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// How stages after `TestStrategy` treat a strategy the user declined.
///
/// - `Degraded` (default): downstream stages run, receive the declined
///   strategy marked `confirmed: false`, and record a warning.
/// - `TreatAsFailed`: a declined strategy counts as missing, so
///   `TestCodeGeneration` fails with `MissingDependency`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkippedStrategyPolicy {
    #[default]
    Degraded,
    TreatAsFailed,
}

impl std::fmt::Display for SkippedStrategyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkippedStrategyPolicy::Degraded => write!(f, "degraded"),
            SkippedStrategyPolicy::TreatAsFailed => write!(f, "treat-as-failed"),
        }
    }
}

impl FromStr for SkippedStrategyPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "degraded" => Ok(SkippedStrategyPolicy::Degraded),
            "treat-as-failed" | "failed" => Ok(SkippedStrategyPolicy::TreatAsFailed),
            _ => bail!(
                "Invalid skipped strategy policy '{}'. Valid values: degraded, treat-as-failed",
                s
            ),
        }
    }
}

/// Receives `(stage name, fraction in [0, 1], message)` from running stages.
///
/// Called inline on the run's task: a slow sink slows the stage, and a sink
/// must never block on user input.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: &str, fraction: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, f64, &str) + Send + Sync,
{
    fn report(&self, stage: &str, fraction: f64, message: &str) {
        self(stage, fraction, message)
    }
}

/// Asked once, after `TestStrategy` completes, whether to continue.
pub trait ConfirmationCallback: Send + Sync {
    fn confirm(&self, title: &str, payload: &StagePayload) -> bool;
}

impl<F> ConfirmationCallback for F
where
    F: Fn(&str, &StagePayload) -> bool + Send + Sync,
{
    fn confirm(&self, title: &str, payload: &StagePayload) -> bool {
        self(title, payload)
    }
}

/// State threaded through one pipeline run.
///
/// Owned by exactly one run; stage handlers only read it, and the
/// orchestrator is the only writer of result slots.
pub struct RunContext {
    pub run_id: Uuid,
    pub repository: RepositoryHandle,
    pub selection: CommitSelection,
    pub project: Option<ProjectInfo>,
    pub skipped_strategy: SkippedStrategyPolicy,
    results: BTreeMap<PipelineStageKind, StageResult>,
    progress: Option<Arc<dyn ProgressSink>>,
    confirmation: Option<Arc<dyn ConfirmationCallback>>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl RunContext {
    pub fn new(repository: RepositoryHandle, selection: CommitSelection) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            repository,
            selection,
            project: None,
            skipped_strategy: SkippedStrategyPolicy::default(),
            results: BTreeMap::new(),
            progress: None,
            confirmation: None,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_project(mut self, project: ProjectInfo) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_confirmation(mut self, callback: Arc<dyn ConfirmationCallback>) -> Self {
        self.confirmation = Some(callback);
        self
    }

    pub fn with_skipped_strategy(mut self, policy: SkippedStrategyPolicy) -> Self {
        self.skipped_strategy = policy;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the event channel for run and stage events.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Seed result slots, e.g. when resuming a saved run.
    pub fn with_results(mut self, results: BTreeMap<PipelineStageKind, StageResult>) -> Self {
        self.results = results;
        self
    }

    /// Explicitly selected commit ids; empty for "recent N" runs.
    pub fn selected_commit_ids(&self) -> &[String] {
        match &self.selection {
            CommitSelection::Explicit { ids, .. } => ids,
            CommitSelection::Recent { .. } => &[],
        }
    }

    pub fn results(&self) -> &BTreeMap<PipelineStageKind, StageResult> {
        &self.results
    }

    pub fn result(&self, stage: PipelineStageKind) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    pub fn status(&self, stage: PipelineStageKind) -> StageStatus {
        self.results
            .get(&stage)
            .map(|r| r.status)
            .unwrap_or(StageStatus::Pending)
    }

    /// Payload of a stage that completed in this run.
    pub fn completed_payload(&self, stage: PipelineStageKind) -> Option<&StagePayload> {
        self.results
            .get(&stage)
            .filter(|r| r.is_completed())
            .and_then(|r| r.payload.as_ref())
    }

    pub fn progress(&self) -> RunProgress {
        get_run_progress(&self.results)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn set_result(&mut self, result: StageResult) {
        self.results.insert(result.stage, result);
    }

    pub(crate) fn progress_sink(&self) -> Option<Arc<dyn ProgressSink>> {
        self.progress.clone()
    }

    pub(crate) fn confirmation(&self) -> Option<Arc<dyn ConfirmationCallback>> {
        self.confirmation.clone()
    }

    pub(crate) fn event_sender(&self) -> Option<mpsc::Sender<PipelineEvent>> {
        self.events.clone()
    }

    /// Drop the event sender so listeners see the channel close.
    pub(crate) fn clear_event_channel(&mut self) {
        self.events = None;
    }

    pub(crate) async fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            tx.send(event).await.ok();
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("repository", &self.repository)
            .field("selection", &self.selection)
            .field("project", &self.project)
            .field("skipped_strategy", &self.skipped_strategy)
            .field("results", &self.results.keys().collect::<Vec<_>>())
            .field("has_progress_sink", &self.progress.is_some())
            .field("has_confirmation", &self.confirmation.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_new_context_has_empty_slots() {
        let ctx = RunContext::new(RepositoryHandle::new("/tmp/repo"), CommitSelection::recent(10));
        assert!(ctx.results().is_empty());
        assert!(ctx.selected_commit_ids().is_empty());
        assert_eq!(ctx.status(PipelineStageKind::VcsAnalysis), StageStatus::Pending);
        assert_eq!(ctx.skipped_strategy, SkippedStrategyPolicy::Degraded);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_selected_ids_for_explicit_selection() {
        let ctx = RunContext::new(
            RepositoryHandle::new("/tmp/repo").with_branch("main"),
            CommitSelection::explicit(vec!["abc".into(), "def".into()]),
        );
        assert_eq!(ctx.selected_commit_ids(), ["abc", "def"]);
        assert_eq!(ctx.repository.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_closures_act_as_sink_and_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |stage: &str, fraction: f64, msg: &str| {
            seen_clone
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", stage, fraction, msg));
        });
        sink.report("VcsAnalysis", 0.5, "half");
        assert_eq!(seen.lock().unwrap().as_slice(), ["VcsAnalysis:0.5:half"]);

        let decline: Arc<dyn ConfirmationCallback> =
            Arc::new(|_title: &str, _payload: &StagePayload| false);
        let payload = StagePayload::Review(Default::default());
        assert!(!decline.confirm("title", &payload));
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!(
            "treat_as_failed".parse::<SkippedStrategyPolicy>().unwrap(),
            SkippedStrategyPolicy::TreatAsFailed
        );
        assert_eq!(
            "Degraded".parse::<SkippedStrategyPolicy>().unwrap(),
            SkippedStrategyPolicy::Degraded
        );
        assert!("abort".parse::<SkippedStrategyPolicy>().is_err());
        assert_eq!(SkippedStrategyPolicy::TreatAsFailed.to_string(), "treat-as-failed");
    }

    #[test]
    fn test_selection_serializes_with_mode_tag() {
        let json = serde_json::to_value(CommitSelection::recent(5)).unwrap();
        assert_eq!(json["mode"], "recent");
        assert_eq!(json["max_commits"], 5);
    }
}
