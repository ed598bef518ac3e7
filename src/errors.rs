//! Typed error hierarchy for testsmith.
//!
//! Four enums cover the layers of the system:
//! - `StoreError` for revision store (git) failures
//! - `AggregationError` for change aggregation over selected commits
//! - `ServiceError` for the external generation service
//! - `StageError` for a single pipeline stage, wrapping the others

use crate::pipeline::PipelineStageKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a revision store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    UnknownRevision,
    UnreadableRepository,
    Timeout,
    Query,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StoreErrorKind::UnknownRevision => "unknown revision",
            StoreErrorKind::UnreadableRepository => "unreadable repository",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Query => "query failed",
        };
        write!(f, "{}", label)
    }
}

/// Single error type surfaced by every revision store operation.
#[derive(Debug, Clone, Error)]
#[error("Revision store error ({kind}): {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_revision(id: &str) -> Self {
        Self::new(
            StoreErrorKind::UnknownRevision,
            format!("revision '{}' not found", id),
        )
    }

    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::UnreadableRepository, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Query, message)
    }

    pub fn is_unknown_revision(&self) -> bool {
        self.kind == StoreErrorKind::UnknownRevision
    }
}

impl From<git2::Error> for StoreError {
    fn from(err: git2::Error) -> Self {
        let kind = match err.code() {
            git2::ErrorCode::NotFound | git2::ErrorCode::Ambiguous | git2::ErrorCode::InvalidSpec => {
                StoreErrorKind::UnknownRevision
            }
            _ if err.class() == git2::ErrorClass::Repository => {
                StoreErrorKind::UnreadableRepository
            }
            _ => StoreErrorKind::Query,
        };
        Self::new(kind, err.message().to_string())
    }
}

/// Errors from the change aggregator.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("No commits selected for aggregation")]
    NoCommitsSelected,

    #[error("Unknown revision: {id}")]
    UnknownRevision { id: String },

    #[error("Failed to compute diff between {base} and {head}: {source}")]
    DiffComputationFailed {
        base: String,
        head: String,
        #[source]
        source: StoreError,
    },

    #[error("Commit history unavailable for '{reference}': {source}")]
    HistoryUnavailable {
        reference: String,
        #[source]
        source: StoreError,
    },

    #[error("Base revision {base} is authored after head revision {head}")]
    InvalidBase { base: String, head: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a generation service invocation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No generation command configured (set generation.command or TESTSMITH_GENERATOR_CMD)")]
    NotConfigured,

    #[error("Failed to spawn generation command: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Generation command exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Generation service I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a stage failure, persisted with the stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    MissingDependency,
    Service,
    Aggregation,
    Store,
    Timeout,
    Cancelled,
    Unexpected,
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StageErrorKind::MissingDependency => "missing_dependency",
            StageErrorKind::Service => "service",
            StageErrorKind::Aggregation => "aggregation",
            StageErrorKind::Store => "store",
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::Cancelled => "cancelled",
            StageErrorKind::Unexpected => "unexpected",
        };
        write!(f, "{}", label)
    }
}

/// Errors that terminate a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} requires {needs} output, which is missing or unusable")]
    MissingDependency {
        stage: PipelineStageKind,
        needs: PipelineStageKind,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl StageError {
    pub fn kind(&self) -> StageErrorKind {
        match self {
            StageError::MissingDependency { .. } => StageErrorKind::MissingDependency,
            StageError::Service(_) => StageErrorKind::Service,
            StageError::Aggregation(_) => StageErrorKind::Aggregation,
            StageError::Store(_) => StageErrorKind::Store,
            StageError::Timeout { .. } => StageErrorKind::Timeout,
            StageError::Cancelled => StageErrorKind::Cancelled,
            StageError::Unexpected(_) => StageErrorKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_from_git2_not_found_is_unknown_revision() {
        let git_err = git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Reference,
            "revspec 'nope' not found",
        );
        let err = StoreError::from(git_err);
        assert_eq!(err.kind, StoreErrorKind::UnknownRevision);
        assert!(err.is_unknown_revision());
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn store_error_from_git2_repository_class_is_unreadable() {
        let git_err = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Repository,
            "could not find repository",
        );
        let err = StoreError::from(git_err);
        assert_eq!(err.kind, StoreErrorKind::UnreadableRepository);
    }

    #[test]
    fn aggregation_error_unknown_revision_carries_id() {
        let err = AggregationError::UnknownRevision {
            id: "deadbeef".to_string(),
        };
        match &err {
            AggregationError::UnknownRevision { id } => assert_eq!(id, "deadbeef"),
            _ => panic!("Expected UnknownRevision"),
        }
        assert!(err.to_string().contains("deadbeef"));
    }

    #[test]
    fn stage_error_kind_maps_each_variant() {
        let missing = StageError::MissingDependency {
            stage: PipelineStageKind::ReviewGeneration,
            needs: PipelineStageKind::TestCodeGeneration,
        };
        assert_eq!(missing.kind(), StageErrorKind::MissingDependency);
        assert!(missing.to_string().contains("TestCodeGeneration"));

        let service: StageError = ServiceError::NotConfigured.into();
        assert_eq!(service.kind(), StageErrorKind::Service);

        let agg: StageError = AggregationError::NoCommitsSelected.into();
        assert_eq!(agg.kind(), StageErrorKind::Aggregation);

        assert_eq!(StageError::Cancelled.kind(), StageErrorKind::Cancelled);
        let timeout = StageError::Timeout {
            operation: "generation".into(),
            secs: 60,
        };
        assert_eq!(timeout.kind(), StageErrorKind::Timeout);
        assert!(timeout.to_string().contains("60s"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::query("x"));
        assert_std_error(&AggregationError::NoCommitsSelected);
        assert_std_error(&ServiceError::NotConfigured);
        assert_std_error(&StageError::Cancelled);
    }
}
