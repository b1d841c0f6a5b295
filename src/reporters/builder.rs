//! Compliance report builder
//!
//! Combines already-recorded assessments with a traceability view into one
//! report. The builder only reads: it never evaluates rules or touches the
//! ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::analysis::check_staleness;
use crate::errors::StaleAssessmentWarning;
use crate::graph::TraceQuery;
use crate::models::{short_hash, Assessment, ComplianceLevel, FindingsSummary, RiskLevel};

pub const REPORT_FORMAT_VERSION: u32 = 1;

/// A rendered-ready compliance report
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of `content`; equal for equal inputs
    pub content_hash: String,
    #[serde(flatten)]
    pub content: ReportContent,
}

/// Everything in a report except the generation timestamp
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportContent {
    pub format_version: u32,
    pub graph_revision: u64,
    pub standards: Vec<StandardSummary>,
    pub aggregate: ComplianceLevel,
    pub recommendations: Vec<RankedRecommendation>,
    pub matrix: TraceabilityMatrix,
    pub warnings: Vec<StaleAssessmentWarning>,
}

/// One row of the per-standard summary table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StandardSummary {
    pub standard: String,
    pub version: String,
    pub assessment_id: String,
    pub artifacts: usize,
    pub score: Option<f64>,
    pub level: ComplianceLevel,
    pub findings: FindingsSummary,
    pub assessed_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedRecommendation {
    pub rank: usize,
    pub standard: String,
    pub rule_id: String,
    pub risk: RiskLevel,
    pub remediation: String,
    pub artifact_ids: Vec<String>,
}

/// Requirement x test case coverage grid
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TraceabilityMatrix {
    /// Row labels, sorted
    pub requirements: Vec<String>,
    /// Column labels, sorted
    pub test_cases: Vec<String>,
    /// `cells[row][col]`: test case `col` verifies requirement `row`
    pub cells: Vec<Vec<bool>>,
    pub coverage_percentage: f64,
    pub requirements_with_tests: usize,
    pub test_cases_with_requirements: usize,
    pub orphaned_requirements: Vec<String>,
    pub orphaned_test_cases: Vec<String>,
}

impl TraceabilityMatrix {
    /// Build the grid over the non-superseded requirements in `scope` and
    /// the test cases in scope or verifying one of them
    pub fn build(query: &dyn TraceQuery, scope: Option<&[String]>) -> Self {
        let in_scope = |id: &str| scope.map_or(true, |s| s.iter().any(|x| x == id));

        let requirements: Vec<String> = query
            .requirements()
            .into_iter()
            .filter(|r| !r.is_superseded() && in_scope(&r.id))
            .map(|r| r.id.clone())
            .collect();

        let mut test_cases: BTreeSet<String> = query
            .test_cases()
            .into_iter()
            .filter(|t| scope.is_some() && in_scope(&t.id))
            .map(|t| t.id.clone())
            .collect();
        match scope {
            None => test_cases.extend(query.test_cases().into_iter().map(|t| t.id.clone())),
            Some(_) => {
                for req in &requirements {
                    test_cases.extend(query.verifying_tests(req));
                }
            }
        }
        let test_cases: Vec<String> = test_cases.into_iter().collect();

        let cells: Vec<Vec<bool>> = requirements
            .iter()
            .map(|req| {
                let verifying: BTreeSet<String> = query.verifying_tests(req).into_iter().collect();
                test_cases.iter().map(|tc| verifying.contains(tc)).collect()
            })
            .collect();

        let orphaned_requirements: Vec<String> = requirements
            .iter()
            .zip(&cells)
            .filter(|(_, row)| !row.iter().any(|&c| c))
            .map(|(id, _)| id.clone())
            .collect();
        let orphaned_test_cases: Vec<String> = test_cases
            .iter()
            .enumerate()
            .filter(|(col, _)| !cells.iter().any(|row| row[*col]))
            .map(|(_, id)| id.clone())
            .collect();

        let requirements_with_tests = requirements.len() - orphaned_requirements.len();
        let test_cases_with_requirements = test_cases.len() - orphaned_test_cases.len();
        let coverage_percentage = if requirements.is_empty() {
            0.0
        } else {
            requirements_with_tests as f64 / requirements.len() as f64 * 100.0
        };

        Self {
            requirements,
            test_cases,
            cells,
            coverage_percentage,
            requirements_with_tests,
            test_cases_with_requirements,
            orphaned_requirements,
            orphaned_test_cases,
        }
    }

    pub fn is_linked(&self, requirement_id: &str, test_case_id: &str) -> bool {
        let row = self.requirements.iter().position(|r| r == requirement_id);
        let col = self.test_cases.iter().position(|t| t == test_case_id);
        match (row, col) {
            (Some(r), Some(c)) => self.cells[r][c],
            _ => false,
        }
    }
}

pub struct ReportBuilder<'a> {
    query: &'a dyn TraceQuery,
    standards: Vec<String>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(query: &'a dyn TraceQuery) -> Self {
        Self {
            query,
            standards: Vec::new(),
        }
    }

    /// Only report on these standards (case-insensitive); empty means all
    pub fn with_standards(mut self, standards: Vec<String>) -> Self {
        self.standards = standards;
        self
    }

    fn wanted(&self, assessment: &Assessment) -> bool {
        self.standards.is_empty()
            || self
                .standards
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&assessment.standard.name))
    }

    pub fn build(&self, assessments: &[Assessment], scope: Option<&[String]>) -> Result<Report> {
        let mut selected: Vec<&Assessment> = assessments.iter().filter(|a| self.wanted(a)).collect();
        selected.sort_by(|a, b| {
            a.standard
                .cmp(&b.standard)
                .then_with(|| a.generated_at.cmp(&b.generated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(
            "Building report from {} of {} assessment(s)",
            selected.len(),
            assessments.len()
        );

        let mut warnings = Vec::new();
        let standards: Vec<StandardSummary> = selected
            .iter()
            .map(|a| {
                let stale = check_staleness(a, self.query);
                let summary = StandardSummary {
                    standard: a.standard.name.clone(),
                    version: a.standard.version.clone(),
                    assessment_id: a.id.clone(),
                    artifacts: a.scope.len(),
                    score: a.score,
                    level: a.level,
                    findings: a.summary.clone(),
                    assessed_at: a.generated_at,
                    stale: stale.is_some(),
                };
                if let Some(w) = stale {
                    warn!("{}", w);
                    warnings.push(w);
                }
                summary
            })
            .collect();

        let content = ReportContent {
            format_version: REPORT_FORMAT_VERSION,
            graph_revision: self.query.revision(),
            aggregate: ComplianceLevel::aggregate(standards.iter().map(|s| s.level)),
            standards,
            recommendations: rank_recommendations(&selected),
            matrix: TraceabilityMatrix::build(self.query, scope),
            warnings,
        };

        let bytes = serde_json::to_string(&content).context("Failed to serialize report content")?;
        Ok(Report {
            generated_at: Utc::now(),
            content_hash: short_hash(&bytes, 64),
            content,
        })
    }
}

/// Merge recommendations across assessments: one entry per remediation
/// text, highest risk first, ties by standard then rule id
fn rank_recommendations(assessments: &[&Assessment]) -> Vec<RankedRecommendation> {
    let mut merged: Vec<RankedRecommendation> = Vec::new();
    for rec in assessments.iter().flat_map(|a| &a.recommendations) {
        match merged.iter_mut().find(|m| m.remediation == rec.remediation) {
            Some(existing) => {
                existing.risk = existing.risk.max(rec.risk);
                for id in &rec.artifact_ids {
                    if !existing.artifact_ids.contains(id) {
                        existing.artifact_ids.push(id.clone());
                    }
                }
            }
            None => merged.push(RankedRecommendation {
                rank: 0,
                standard: rec.standard.clone(),
                rule_id: rec.rule_id.clone(),
                risk: rec.risk,
                remediation: rec.remediation.clone(),
                artifact_ids: rec.artifact_ids.clone(),
            }),
        }
    }

    merged.sort_by(|a, b| {
        b.risk
            .cmp(&a.risk)
            .then_with(|| a.standard.cmp(&b.standard))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    for (i, rec) in merged.iter_mut().enumerate() {
        rec.rank = i + 1;
        rec.artifact_ids.sort();
    }
    merged
}
