use crate::pipeline::{PipelineStageKind, StageStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        stages: Vec<PipelineStageKind>,
    },
    StageStarted {
        stage: PipelineStageKind,
    },
    StageProgress {
        stage: PipelineStageKind,
        fraction: f64,
        message: String,
    },
    /// The strategy confirmation gate was answered.
    GateDecided {
        stage: PipelineStageKind,
        accepted: bool,
    },
    StageFinished {
        stage: PipelineStageKind,
        status: StageStatus,
        duration_ms: u64,
    },
    RunFinished {
        run_id: Uuid,
        failed_stage: Option<PipelineStageKind>,
    },
}
