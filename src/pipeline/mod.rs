//! Five-stage test generation pipeline.
//!
//! Stages run in a fixed order (`VcsAnalysis`, `TestStrategy`,
//! `TestCodeGeneration`, `TestScenarioGeneration`, `ReviewGeneration`) against
//! a per-run [`RunContext`]. Each stage reads upstream payloads from the
//! context and writes exactly one [`StageResult`] slot.

pub mod context;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod payload;
pub mod progress;
pub mod runner;
pub mod service;
pub mod stage;

pub use context::{
    CommitSelection, ConfirmationCallback, ProgressSink, ProjectInfo, RepositoryHandle, RunContext,
    SkippedStrategyPolicy,
};
pub use events::PipelineEvent;
pub use handlers::{PipelineSettings, StageHandler, StageScope};
pub use manager::{RunManager, RunRequest};
pub use payload::{
    GeneratedTest, GeneratedTests, ReviewRecord, Scenario, ScenarioSet, StagePayload,
    StrategyRecord, Suggestion, TestApproach, VcsAnalysisOutput,
};
pub use progress::{RunProgress, get_run_progress, progress_from_statuses};
pub use runner::{CONFIRMATION_TITLE, PipelineOrchestrator};
pub use service::{CommandGenerationService, GenerationService};
pub use stage::{PipelineStageKind, StageResult, StageStatus};
