//! Engine error taxonomy
//!
//! Every fallible engine operation returns an [`EngineError`]. Batch
//! operations (assessment, coverage analysis, import) collect per-item errors
//! next to their partial results instead of aborting; graph writes are atomic
//! and leave the graph untouched on error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the compliance engine
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("invalid artifact {id}: {reason}")]
    InvalidArtifact { id: String, reason: String },

    #[error("invalid rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("link not found: {source_id} -[{relation}]-> {target_id}")]
    LinkNotFound {
        source_id: String,
        target_id: String,
        relation: String,
    },

    #[error("assessment not found: {0}")]
    AssessmentNotFound(String),

    #[error("integrity violation: {0}")]
    Integrity(IntegrityViolation),

    #[error("unknown standard: {name} (version {version})")]
    UnknownStandard { name: String, version: String },

    #[error("rule version conflict in {standard} v{version}: {detail}")]
    RuleVersionConflict {
        standard: String,
        version: String,
        detail: String,
    },

    #[error("evaluation of rule {rule_id} on {artifact_id} exceeded the assessment deadline")]
    EvaluationTimeout { rule_id: String, artifact_id: String },

    #[error("assessment cancelled")]
    Cancelled,
}

/// Coarse error classes, used for exit codes and log grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Integrity,
    Configuration,
    Timeout,
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidArtifact { .. } | EngineError::InvalidRule { .. } => {
                ErrorKind::Validation
            }
            EngineError::ArtifactNotFound(_)
            | EngineError::LinkNotFound { .. }
            | EngineError::AssessmentNotFound(_) => ErrorKind::NotFound,
            EngineError::Integrity(_) => ErrorKind::Integrity,
            EngineError::UnknownStandard { .. } | EngineError::RuleVersionConflict { .. } => {
                ErrorKind::Configuration
            }
            EngineError::EvaluationTimeout { .. } => ErrorKind::Timeout,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid_artifact(id: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidArtifact {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_rule(id: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidRule {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_standard(name: &str, version: Option<&str>) -> Self {
        EngineError::UnknownStandard {
            name: name.to_string(),
            version: version.unwrap_or("latest").to_string(),
        }
    }
}

impl From<IntegrityViolation> for EngineError {
    fn from(v: IntegrityViolation) -> Self {
        EngineError::Integrity(v)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Structural invariant breaches of the artifact graph
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    #[error("derivesFrom cycle: {}", path.join(" -> "))]
    DerivationCycle { path: Vec<String> },

    #[error("duplicate link {source_id} -[{relation}]-> {target_id}")]
    DuplicateLink {
        source_id: String,
        target_id: String,
        relation: String,
    },

    #[error("test case {test_case} has no verifies link to a non-superseded requirement")]
    OrphanedTestCase { test_case: String },

    #[error("{id} is still referenced by {links} traceability link(s)")]
    ReferencedArtifact { id: String, links: usize },
}

/// Advisory raised when an assessment no longer reflects the graph.
///
/// Not an error: reports built from stale assessments are still returned,
/// with the warning attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleAssessmentWarning {
    pub assessment_id: String,
    pub standard: String,
    pub changes: Vec<ArtifactChange>,
}

/// A single artifact drift detected against an assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactChange {
    pub artifact_id: String,
    /// Version observed by the assessment (`None` if the artifact did not exist yet)
    pub assessed_version: Option<u32>,
    /// Version currently in the graph (`None` if the artifact was removed)
    pub current_version: Option<u32>,
}

impl std::fmt::Display for StaleAssessmentWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.changes.iter().map(|c| c.artifact_id.as_str()).collect();
        write!(
            f,
            "assessment {} ({}) is stale: changed artifacts {}",
            self.assessment_id,
            self.standard,
            ids.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::ArtifactNotFound("REQ-1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::unknown_standard("SOX", None).kind(),
            ErrorKind::Configuration
        );
        let cycle: EngineError = IntegrityViolation::DerivationCycle {
            path: vec!["R1".into(), "R2".into(), "R1".into()],
        }
        .into();
        assert_eq!(cycle.kind(), ErrorKind::Integrity);
        assert_eq!(
            cycle.to_string(),
            "integrity violation: derivesFrom cycle: R1 -> R2 -> R1"
        );
    }

    #[test]
    fn test_unknown_standard_message() {
        let err = EngineError::unknown_standard("SOX", Some("2002"));
        assert_eq!(err.to_string(), "unknown standard: SOX (version 2002)");
    }
}
