use crate::pipeline::{PipelineStageKind, StageResult, StageStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of how far a run has progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub total_stages: usize,
    pub completed_stages: usize,
    pub percentage: f64,
    /// First stage, in pipeline order, that has no result yet or is running.
    pub current_stage: Option<PipelineStageKind>,
    pub stage_statuses: BTreeMap<PipelineStageKind, StageStatus>,
}

impl RunProgress {
    pub fn current_stage_name(&self) -> Option<&'static str> {
        self.current_stage.map(|s| s.name())
    }

    pub fn failed_stage(&self) -> Option<PipelineStageKind> {
        self.stage_statuses
            .iter()
            .find(|(_, status)| **status == StageStatus::Failed)
            .map(|(stage, _)| *stage)
    }
}

pub fn get_run_progress(results: &BTreeMap<PipelineStageKind, StageResult>) -> RunProgress {
    let statuses: BTreeMap<PipelineStageKind, StageStatus> = results
        .iter()
        .map(|(stage, result)| (*stage, result.status))
        .collect();
    progress_from_statuses(&statuses)
}

/// Same as [`get_run_progress`] for callers that only track statuses.
///
/// Stages absent from `statuses` are reported as `Pending`. Only `Completed`
/// counts toward `completed_stages`; `Skipped` does not.
pub fn progress_from_statuses(
    statuses: &BTreeMap<PipelineStageKind, StageStatus>,
) -> RunProgress {
    let total_stages = PipelineStageKind::ALL.len();
    let completed_stages = statuses
        .values()
        .filter(|s| **s == StageStatus::Completed)
        .count();
    let current_stage = PipelineStageKind::ALL.iter().copied().find(|stage| {
        match statuses.get(stage) {
            None => true,
            Some(status) => *status == StageStatus::Running,
        }
    });
    let stage_statuses = PipelineStageKind::ALL
        .iter()
        .map(|stage| {
            (
                *stage,
                statuses.get(stage).copied().unwrap_or(StageStatus::Pending),
            )
        })
        .collect();

    RunProgress {
        total_stages,
        completed_stages,
        percentage: completed_stages as f64 / total_stages as f64 * 100.0,
        current_stage,
        stage_statuses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(pairs: &[(PipelineStageKind, StageStatus)]) -> BTreeMap<PipelineStageKind, StageStatus> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_completed_then_running() {
        let results: BTreeMap<_, _> = [
            {
                let mut r = StageResult::running(PipelineStageKind::VcsAnalysis);
                r.status = StageStatus::Completed;
                (PipelineStageKind::VcsAnalysis, r)
            },
            (
                PipelineStageKind::TestStrategy,
                StageResult::running(PipelineStageKind::TestStrategy),
            ),
        ]
        .into_iter()
        .collect();

        let progress = get_run_progress(&results);
        assert_eq!(progress.total_stages, 5);
        assert_eq!(progress.completed_stages, 1);
        assert_eq!(progress.current_stage_name(), Some("TestStrategy"));
        assert!((progress.percentage - 20.0).abs() < f64::EPSILON);
        assert_eq!(
            progress.stage_statuses[&PipelineStageKind::ReviewGeneration],
            StageStatus::Pending
        );
    }

    #[test]
    fn test_empty_results_point_at_first_stage() {
        let progress = progress_from_statuses(&BTreeMap::new());
        assert_eq!(progress.completed_stages, 0);
        assert_eq!(progress.current_stage, Some(PipelineStageKind::VcsAnalysis));
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn test_skipped_is_not_counted_and_not_current() {
        let progress = progress_from_statuses(&statuses(&[
            (PipelineStageKind::VcsAnalysis, StageStatus::Completed),
            (PipelineStageKind::TestStrategy, StageStatus::Skipped),
        ]));
        assert_eq!(progress.completed_stages, 1);
        assert_eq!(
            progress.current_stage,
            Some(PipelineStageKind::TestCodeGeneration)
        );
    }

    #[test]
    fn test_all_complete_has_no_current_stage() {
        let all: Vec<_> = PipelineStageKind::ALL
            .iter()
            .map(|s| (*s, StageStatus::Completed))
            .collect();
        let progress = progress_from_statuses(&statuses(&all));
        assert_eq!(progress.completed_stages, 5);
        assert_eq!(progress.current_stage, None);
        assert_eq!(progress.percentage, 100.0);
        assert_eq!(progress.failed_stage(), None);
    }

    #[test]
    fn test_failed_stage_is_reported() {
        let progress = progress_from_statuses(&statuses(&[
            (PipelineStageKind::VcsAnalysis, StageStatus::Completed),
            (PipelineStageKind::TestStrategy, StageStatus::Failed),
        ]));
        assert_eq!(progress.failed_stage(), Some(PipelineStageKind::TestStrategy));
        assert_eq!(
            progress.current_stage,
            Some(PipelineStageKind::TestCodeGeneration)
        );
    }
}
