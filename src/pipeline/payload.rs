//! Strongly-typed stage outputs.
//!
//! Every stage stores one [`StagePayload`] variant in its result. Records
//! decoded from the generation service use lenient serde defaults so a sparse
//! response still yields a usable value.

use crate::changes::{AggregatedChangeSet, ChangeTotals, CommitAnalysis};
use crate::pipeline::PipelineStageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    VcsAnalysis(VcsAnalysisOutput),
    Strategy(StrategyRecord),
    TestCode(GeneratedTests),
    Scenarios(ScenarioSet),
    Review(ReviewRecord),
}

impl StagePayload {
    /// The stage that produces this payload variant.
    pub fn stage(&self) -> PipelineStageKind {
        match self {
            StagePayload::VcsAnalysis(_) => PipelineStageKind::VcsAnalysis,
            StagePayload::Strategy(_) => PipelineStageKind::TestStrategy,
            StagePayload::TestCode(_) => PipelineStageKind::TestCodeGeneration,
            StagePayload::Scenarios(_) => PipelineStageKind::TestScenarioGeneration,
            StagePayload::Review(_) => PipelineStageKind::ReviewGeneration,
        }
    }
}

/// Either one aggregated window diff or one analysis per recent commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "snake_case")]
pub enum VcsAnalysisOutput {
    Aggregated(AggregatedChangeSet),
    PerCommit(Vec<CommitAnalysis>),
}

impl VcsAnalysisOutput {
    pub fn commit_count(&self) -> usize {
        match self {
            VcsAnalysisOutput::Aggregated(set) => set.commits.len(),
            VcsAnalysisOutput::PerCommit(analyses) => analyses.len(),
        }
    }

    /// Totals across everything analyzed. Per-commit totals are summed, so a
    /// file touched by two commits counts twice.
    pub fn totals(&self) -> ChangeTotals {
        match self {
            VcsAnalysisOutput::Aggregated(set) => set.totals,
            VcsAnalysisOutput::PerCommit(analyses) => {
                analyses
                    .iter()
                    .fold(ChangeTotals::default(), |acc, a| ChangeTotals {
                        files: acc.files + a.totals.files,
                        additions: acc.additions + a.totals.additions,
                        deletions: acc.deletions + a.totals.deletions,
                        net: acc.net + a.totals.net,
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestApproach {
    #[default]
    UnitTest,
    IntegrationTest,
    PerformanceTest,
    SecurityTest,
}

impl std::fmt::Display for TestApproach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TestApproach::UnitTest => "unit_test",
            TestApproach::IntegrationTest => "integration_test",
            TestApproach::PerformanceTest => "performance_test",
            TestApproach::SecurityTest => "security_test",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub primary: TestApproach,
    #[serde(default)]
    pub secondary: Vec<TestApproach>,
    #[serde(default)]
    pub risk_notes: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

fn default_test_priority() -> u8 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_type: TestApproach,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub assertions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 1 (highest) to 5 (lowest).
    #[serde(default = "default_test_priority")]
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTests {
    pub tests: Vec<GeneratedTest>,
    #[serde(default)]
    pub counts_by_type: BTreeMap<String, usize>,
    /// False when tests were generated from a declined strategy.
    #[serde(default = "default_true")]
    pub strategy_confirmed: bool,
}

fn default_true() -> bool {
    true
}

impl GeneratedTests {
    pub fn recount(&mut self) {
        self.counts_by_type.clear();
        for test in &self.tests {
            *self
                .counts_by_type
                .entry(test.test_type.to_string())
                .or_default() += 1;
        }
    }
}

fn default_scenario_priority() -> String {
    "Medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub scenario_id: String,
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub test_steps: Vec<String>,
    #[serde(default)]
    pub expected_results: Vec<String>,
    #[serde(default)]
    pub test_data: serde_json::Value,
    #[serde(default = "default_scenario_priority")]
    pub priority: String,
    #[serde(default)]
    pub test_type: TestApproach,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub counts_by_priority: BTreeMap<String, usize>,
}

impl ScenarioSet {
    /// Recount by priority and fill missing scenario ids (`TS-001`, ...).
    pub fn normalize(&mut self) {
        self.counts_by_priority.clear();
        for (idx, scenario) in self.scenarios.iter_mut().enumerate() {
            if scenario.scenario_id.trim().is_empty() {
                scenario.scenario_id = format!("TS-{:03}", idx + 1);
            }
            *self
                .counts_by_priority
                .entry(scenario.priority.clone())
                .or_default() += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub rank: usize,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    /// Higher is more important.
    #[serde(default)]
    pub impact: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

impl ReviewRecord {
    /// Order suggestions by impact (stable) and number them from 1.
    pub fn rank_suggestions(&mut self) {
        self.suggestions.sort_by(|a, b| b.impact.cmp(&a.impact));
        for (idx, suggestion) in self.suggestions.iter_mut().enumerate() {
            suggestion.rank = idx + 1;
        }
    }
}
