//! Coverage gap analysis
//!
//! Detection strategy:
//! 1. Collect the non-superseded requirements in scope, optionally only those
//!    tagged with one standard
//! 2. Flag requirements without any verifying test case
//! 3. For every standard a requirement is tagged with (or just the filter
//!    standard), collect the categories of its mandatory test-side rules
//! 4. Flag categories that no verifying test case covers, either through a
//!    compliance tag or a `pass` finding in the ledger

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::assessor::AssessmentLedger;
use crate::errors::EngineError;
use crate::graph::TraceQuery;
use crate::models::{Outcome, Requirement, StandardRef};
use crate::rules::RuleStore;

/// Why a requirement counts as a gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    NoVerifyingTests,
    /// Standard name -> uncovered mandatory categories
    MissingCategories { missing: BTreeMap<String, Vec<String>> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub requirement_id: String,
    #[serde(flatten)]
    pub kind: GapKind,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageReport {
    /// Standard the analysis was limited to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    pub gaps: Vec<CoverageGap>,
    pub total_requirements: usize,
    /// Requirements with at least one verifying test case
    pub covered_requirements: usize,
    /// Unknown ids and unknown standards; the rest of the report is complete
    #[serde(skip)]
    pub errors: Vec<EngineError>,
}

impl CoverageReport {
    /// covered / total; 0 for an empty scope
    pub fn coverage(&self) -> f64 {
        if self.total_requirements == 0 {
            0.0
        } else {
            self.covered_requirements as f64 / self.total_requirements as f64
        }
    }

    pub fn coverage_percentage(&self) -> f64 {
        self.coverage() * 100.0
    }

    pub fn gap_for(&self, requirement_id: &str) -> Option<&CoverageGap> {
        self.gaps.iter().find(|g| g.requirement_id == requirement_id)
    }

    pub fn is_gap(&self, requirement_id: &str) -> bool {
        self.gap_for(requirement_id).is_some()
    }
}

/// Gap and impact queries over a traceability view
pub struct GapAnalyzer<'a> {
    pub(super) query: &'a dyn TraceQuery,
    pub(super) rules: &'a RuleStore,
    pub(super) ledger: &'a AssessmentLedger,
}

impl<'a> GapAnalyzer<'a> {
    pub fn new(query: &'a dyn TraceQuery, rules: &'a RuleStore, ledger: &'a AssessmentLedger) -> Self {
        Self {
            query,
            rules,
            ledger,
        }
    }

    /// Coverage gaps among the requirements in `scope` (all requirements when
    /// `None`). Ids that are unknown are reported in
    /// [`CoverageReport::errors`]; test case ids are ignored.
    ///
    /// With `standard` set, only requirements tagged with it are analyzed and
    /// only its mandatory categories are checked.
    pub fn coverage_gaps(&self, scope: Option<&[String]>, standard: Option<&str>) -> CoverageReport {
        let mut report = CoverageReport {
            standard: standard.map(str::to_string),
            ..CoverageReport::default()
        };
        if let Some(name) = standard.filter(|name| !self.rules.is_known(name)) {
            report.errors.push(EngineError::unknown_standard(name, None));
        }

        let requirements: Vec<&Requirement> = match scope {
            None => self.query.requirements(),
            Some(ids) => {
                let ids: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
                let mut found = Vec::new();
                for id in ids {
                    match self.query.artifact(id) {
                        Some(artifact) => found.extend(artifact.as_requirement()),
                        None => report.errors.push(EngineError::ArtifactNotFound(id.to_string())),
                    }
                }
                found
            }
        };

        let tagged = |req: &Requirement| {
            standard.map_or(true, |name| {
                req.standards.iter().any(|s| s.eq_ignore_ascii_case(name))
            })
        };

        let mut unknown_standards = BTreeSet::new();
        for req in requirements
            .into_iter()
            .filter(|r| !r.is_superseded() && tagged(r))
        {
            report.total_requirements += 1;
            let tests = self.query.verifying_tests(&req.id);
            if tests.is_empty() {
                report.gaps.push(CoverageGap {
                    requirement_id: req.id.clone(),
                    kind: GapKind::NoVerifyingTests,
                    recommendation: format!("Add a test case that verifies {}", req.id),
                });
                continue;
            }
            report.covered_requirements += 1;

            let missing = self.missing_categories(req, &tests, standard, &mut unknown_standards);
            if !missing.is_empty() {
                let recommendation = missing
                    .iter()
                    .map(|(standard, cats)| format!("{standard}: {}", cats.join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ");
                report.gaps.push(CoverageGap {
                    requirement_id: req.id.clone(),
                    kind: GapKind::MissingCategories { missing },
                    recommendation: format!(
                        "Extend the tests of {} to cover {}",
                        req.id, recommendation
                    ),
                });
            }
        }

        report.errors.extend(
            unknown_standards
                .into_iter()
                .map(|name: String| EngineError::unknown_standard(&name, None)),
        );

        info!(
            "Coverage: {}/{} requirements verified, {} gap(s)",
            report.covered_requirements,
            report.total_requirements,
            report.gaps.len()
        );
        report
    }

    fn missing_categories(
        &self,
        req: &Requirement,
        tests: &[String],
        only: Option<&str>,
        unknown_standards: &mut BTreeSet<String>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut missing = BTreeMap::new();
        let standards = req
            .standards
            .iter()
            .filter(|s| only.map_or(true, |name| s.eq_ignore_ascii_case(name)));
        for standard in standards {
            let required = match self.rules.mandatory_categories(standard) {
                Ok(categories) => categories,
                Err(e) => {
                    debug!("{} is tagged with {}: {}", req.id, standard, e);
                    unknown_standards.insert(standard.clone());
                    continue;
                }
            };
            let covered = self.covered_categories(standard, tests);
            let uncovered: Vec<String> = required
                .into_iter()
                .filter(|c| !covered.contains(&c.to_lowercase()))
                .collect();
            if !uncovered.is_empty() {
                missing.insert(standard.clone(), uncovered);
            }
        }
        missing
    }

    /// Lowercased categories of `standard` covered by any of `tests`
    fn covered_categories(&self, standard: &str, tests: &[String]) -> BTreeSet<String> {
        let mut covered = BTreeSet::new();
        for id in tests {
            if let Some(tc) = self.query.test_case(id) {
                covered.extend(tc.compliance_tags.iter().map(|t| t.to_lowercase()));
            }
            for finding in self.ledger.latest_findings_for(id) {
                if finding.outcome != Outcome::Pass || !finding.standard.eq_ignore_ascii_case(standard) {
                    continue;
                }
                let source = StandardRef {
                    name: finding.standard.clone(),
                    version: finding.standard_version.clone(),
                };
                if let Some(rule) = self.rules.find_rule(&source, &finding.rule_id) {
                    if rule.mandatory {
                        covered.insert(rule.category.to_lowercase());
                    }
                }
            }
        }
        covered
    }
}
