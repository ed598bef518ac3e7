use crate::errors::{StageError, StageErrorKind};
use crate::pipeline::payload::StagePayload;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// The five pipeline stages. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStageKind {
    VcsAnalysis,
    TestStrategy,
    TestCodeGeneration,
    TestScenarioGeneration,
    ReviewGeneration,
}

impl PipelineStageKind {
    pub const ALL: [PipelineStageKind; 5] = [
        PipelineStageKind::VcsAnalysis,
        PipelineStageKind::TestStrategy,
        PipelineStageKind::TestCodeGeneration,
        PipelineStageKind::TestScenarioGeneration,
        PipelineStageKind::ReviewGeneration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStageKind::VcsAnalysis => "VcsAnalysis",
            PipelineStageKind::TestStrategy => "TestStrategy",
            PipelineStageKind::TestCodeGeneration => "TestCodeGeneration",
            PipelineStageKind::TestScenarioGeneration => "TestScenarioGeneration",
            PipelineStageKind::ReviewGeneration => "ReviewGeneration",
        }
    }

    /// Kebab-case name used on the command line and in the service protocol.
    pub fn slug(&self) -> &'static str {
        match self {
            PipelineStageKind::VcsAnalysis => "vcs-analysis",
            PipelineStageKind::TestStrategy => "test-strategy",
            PipelineStageKind::TestCodeGeneration => "test-code",
            PipelineStageKind::TestScenarioGeneration => "test-scenarios",
            PipelineStageKind::ReviewGeneration => "review",
        }
    }

    /// Human-readable label for terminal output.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStageKind::VcsAnalysis => "Commit analysis",
            PipelineStageKind::TestStrategy => "Test strategy",
            PipelineStageKind::TestCodeGeneration => "Test code generation",
            PipelineStageKind::TestScenarioGeneration => "Test scenario generation",
            PipelineStageKind::ReviewGeneration => "Review",
        }
    }

    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for PipelineStageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PipelineStageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        let stage = match normalized.as_str() {
            "vcsanalysis" | "vcs-analysis" | "vcs" | "analysis" => PipelineStageKind::VcsAnalysis,
            "teststrategy" | "test-strategy" | "strategy" => PipelineStageKind::TestStrategy,
            "testcodegeneration" | "test-code-generation" | "test-code" | "code" | "tests" => {
                PipelineStageKind::TestCodeGeneration
            }
            "testscenariogeneration" | "test-scenario-generation" | "test-scenarios"
            | "scenarios" => PipelineStageKind::TestScenarioGeneration,
            "reviewgeneration" | "review-generation" | "review" => {
                PipelineStageKind::ReviewGeneration
            }
            _ => bail!(
                "Unknown stage '{}'. Valid stages: vcs-analysis, test-strategy, test-code, test-scenarios, review",
                s
            ),
        };
        Ok(stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// Outcome envelope for one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: PipelineStageKind,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageErrorKind>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl StageResult {
    /// Placeholder stored while the stage executes.
    pub fn running(stage: PipelineStageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            payload: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            failure: None,
            duration: Duration::ZERO,
            started_at: Utc::now(),
        }
    }

    pub fn completed(
        stage: PipelineStageKind,
        payload: StagePayload,
        warnings: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            status: StageStatus::Completed,
            payload: Some(payload),
            warnings,
            duration,
            ..Self::running(stage)
        }
    }

    pub fn failed(
        stage: PipelineStageKind,
        error: &StageError,
        warnings: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            status: StageStatus::Failed,
            errors: vec![error.to_string()],
            failure: Some(error.kind()),
            warnings,
            duration,
            ..Self::running(stage)
        }
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_fixed() {
        let mut shuffled = vec![
            PipelineStageKind::ReviewGeneration,
            PipelineStageKind::VcsAnalysis,
            PipelineStageKind::TestScenarioGeneration,
            PipelineStageKind::TestStrategy,
            PipelineStageKind::TestCodeGeneration,
        ];
        shuffled.sort();
        assert_eq!(shuffled, PipelineStageKind::ALL.to_vec());
        assert_eq!(PipelineStageKind::TestCodeGeneration.position(), 2);
    }

    #[test]
    fn test_stage_from_str_aliases() {
        assert_eq!(
            "VcsAnalysis".parse::<PipelineStageKind>().unwrap(),
            PipelineStageKind::VcsAnalysis
        );
        assert_eq!(
            "test-strategy".parse::<PipelineStageKind>().unwrap(),
            PipelineStageKind::TestStrategy
        );
        assert_eq!(
            "test_scenarios".parse::<PipelineStageKind>().unwrap(),
            PipelineStageKind::TestScenarioGeneration
        );
        assert_eq!(
            "REVIEW".parse::<PipelineStageKind>().unwrap(),
            PipelineStageKind::ReviewGeneration
        );
        assert!("deploy".parse::<PipelineStageKind>().is_err());
    }

    #[test]
    fn test_failed_result_records_kind_and_message() {
        let err = StageError::Cancelled;
        let result = StageResult::failed(
            PipelineStageKind::TestStrategy,
            &err,
            vec!["slow".into()],
            Duration::from_millis(5),
        );
        assert!(result.is_failed());
        assert_eq!(result.failure, Some(StageErrorKind::Cancelled));
        assert_eq!(result.errors, vec!["Run cancelled".to_string()]);
        assert_eq!(result.warnings, vec!["slow".to_string()]);
        assert!(result.payload.is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_result_json_keeps_duration_in_millis() {
        let result = StageResult::failed(
            PipelineStageKind::VcsAnalysis,
            &StageError::Unexpected("boom".into()),
            Vec::new(),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["failure"], "unexpected");
        let back: StageResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
