//! Stale assessment detection
//!
//! An assessment is stale when an artifact in its scope now has a different
//! version than the one it observed, was revised in place after the
//! assessment was generated, or disappeared. Stale assessments stay in the
//! ledger; callers get a warning instead.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::GapAnalyzer;
use crate::errors::{ArtifactChange, EngineError, EngineResult, StaleAssessmentWarning};
use crate::graph::{LinkRelation, TraceQuery};
use crate::models::Assessment;

/// Compare an assessment against the current graph
pub fn check_staleness(
    assessment: &Assessment,
    query: &dyn TraceQuery,
) -> Option<StaleAssessmentWarning> {
    let changes: Vec<ArtifactChange> = assessment
        .scope
        .iter()
        .filter_map(|id| {
            let assessed_version = assessment.artifact_versions.get(id).copied();
            let current = query.artifact(id);
            let current_version = current.map(|a| a.version());
            let revised_in_place = assessed_version.is_some()
                && assessed_version == current_version
                && current.is_some_and(|a| a.revised_at() > assessment.generated_at);
            (assessed_version != current_version || revised_in_place).then(|| ArtifactChange {
                artifact_id: id.clone(),
                assessed_version,
                current_version,
            })
        })
        .collect();

    if changes.is_empty() {
        return None;
    }
    Some(StaleAssessmentWarning {
        assessment_id: assessment.id.clone(),
        standard: assessment.standard.to_string(),
        changes,
    })
}

pub fn is_stale(assessment: &Assessment, query: &dyn TraceQuery) -> bool {
    check_staleness(assessment, query).is_some()
}

impl<'a> GapAnalyzer<'a> {
    /// Artifacts that transitively depend on a requirement through incoming
    /// `verifies` and `derivesFrom` links
    pub fn impact_of(&self, requirement_id: &str) -> EngineResult<BTreeSet<String>> {
        if self.query.requirement(requirement_id).is_none() {
            return Err(EngineError::ArtifactNotFound(requirement_id.to_string()));
        }
        let impacted = self
            .query
            .dependents(requirement_id, &[LinkRelation::Verifies, LinkRelation::DerivesFrom]);
        debug!("{} impacts {} artifact(s)", requirement_id, impacted.len());
        Ok(impacted)
    }

    /// Warnings for every latest assessment that no longer matches the graph
    pub fn stale_assessments(&self) -> Vec<StaleAssessmentWarning> {
        let warnings: Vec<StaleAssessmentWarning> = self
            .ledger
            .latest_all()
            .iter()
            .filter_map(|a| check_staleness(a, self.query))
            .collect();
        for w in &warnings {
            warn!("{}", w);
        }
        warnings
    }

    /// Latest assessments whose scope touches the requirement or anything
    /// that depends on it
    pub fn impacted_assessments(&self, requirement_id: &str) -> EngineResult<Vec<Assessment>> {
        let mut impacted = self.impact_of(requirement_id)?;
        impacted.insert(requirement_id.to_string());
        Ok(self
            .ledger
            .latest_all()
            .into_iter()
            .filter(|a| a.scope.iter().any(|id| impacted.contains(id)))
            .collect())
    }
}
