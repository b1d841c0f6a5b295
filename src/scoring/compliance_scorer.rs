//! Weighted compliance scorer
//!
//! Turns the findings of one assessment into a score, a compliance level and
//! a ranked recommendation list.

use std::collections::HashMap;
use tracing::debug;

use crate::config::ScoringConfig;
use crate::models::{ComplianceLevel, Finding, Outcome, Recommendation};
use crate::rules::Rule;

/// Score breakdown for transparency
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    /// `Σ(wᵢ·vᵢ) / Σwᵢ`, `None` when no finding was applicable
    pub score: Option<f64>,
    pub level: ComplianceLevel,
    /// Numerator
    pub weighted_sum: f64,
    /// Denominator
    pub weight_total: f64,
    /// Findings that counted towards the score
    pub applicable: usize,
    /// Not-applicable findings left out of the denominator
    pub excluded: usize,
    /// Mandatory rules with a fail or partial outcome
    pub mandatory_gaps: usize,
}

pub struct ComplianceScorer<'a> {
    config: &'a ScoringConfig,
}

impl<'a> ComplianceScorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn weight(&self, rule: Option<&Rule>) -> f64 {
        match rule {
            Some(r) if r.mandatory => self.config.mandatory_weight,
            _ => self.config.optional_weight,
        }
    }

    /// Score findings against the rules that produced them.
    ///
    /// Findings are summed in the order given, so identical input always
    /// produces a bit-identical score.
    pub fn calculate(&self, findings: &[Finding], rules: &[Rule]) -> ScoreBreakdown {
        let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut applicable = 0;
        let mut excluded = 0;
        let mut mandatory_gaps = 0;

        for finding in findings {
            let Some(value) = finding.outcome.value() else {
                excluded += 1;
                continue;
            };
            let rule = by_id.get(finding.rule_id.as_str()).copied();
            if rule.is_none() {
                debug!("Finding {} has no matching rule {}", finding.id, finding.rule_id);
            }
            let weight = self.weight(rule);
            weighted_sum += weight * value;
            weight_total += weight;
            applicable += 1;
            if rule.is_some_and(|r| r.mandatory)
                && matches!(finding.outcome, Outcome::Fail | Outcome::Partial)
            {
                mandatory_gaps += 1;
            }
        }

        let score = (weight_total > 0.0).then(|| weighted_sum / weight_total);
        let level = self.level_for(score);

        debug!(
            "Scored {} applicable findings ({} excluded): {:.3}/{:.3} -> {}",
            applicable, excluded, weighted_sum, weight_total, level
        );

        ScoreBreakdown {
            score,
            level,
            weighted_sum,
            weight_total,
            applicable,
            excluded,
            mandatory_gaps,
        }
    }

    /// Map a score to a compliance level. No score is never compliant.
    pub fn level_for(&self, score: Option<f64>) -> ComplianceLevel {
        match score {
            None => ComplianceLevel::NotAssessed,
            Some(s) if s >= self.config.compliant_threshold => ComplianceLevel::Compliant,
            Some(s) if s >= self.config.partial_threshold => ComplianceLevel::PartiallyCompliant,
            Some(_) => ComplianceLevel::NonCompliant,
        }
    }

    /// Recommendations from fail/partial findings on mandatory rules,
    /// highest risk first, one per distinct remediation text.
    pub fn recommendations(&self, findings: &[Finding], rules: &[Rule]) -> Vec<Recommendation> {
        let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut recs: Vec<Recommendation> = Vec::new();

        for finding in findings {
            if !matches!(finding.outcome, Outcome::Fail | Outcome::Partial) {
                continue;
            }
            let Some(rule) = by_id.get(finding.rule_id.as_str()) else {
                continue;
            };
            if !rule.mandatory {
                continue;
            }
            let remediation = if rule.remediation.trim().is_empty() {
                format!("Address {}: {}", rule.id, rule.title)
            } else {
                rule.remediation.clone()
            };

            match recs.iter_mut().find(|r| r.remediation == remediation) {
                Some(existing) => {
                    if !existing.artifact_ids.contains(&finding.artifact_id) {
                        existing.artifact_ids.push(finding.artifact_id.clone());
                    }
                }
                None => recs.push(Recommendation {
                    rule_id: rule.id.clone(),
                    standard: rule.standard.clone(),
                    risk: rule.risk,
                    remediation,
                    artifact_ids: vec![finding.artifact_id.clone()],
                }),
            }
        }

        for rec in &mut recs {
            rec.artifact_ids.sort();
        }
        // Stable: ties keep rule order
        recs.sort_by(|a, b| b.risk.cmp(&a.risk));
        recs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use crate::rules::{RulePattern, RuleTarget};
    use chrono::Utc;

    fn rule(id: &str, mandatory: bool, risk: RiskLevel, remediation: &str) -> Rule {
        Rule {
            id: id.into(),
            version: 1,
            standard: "TEST".into(),
            title: id.into(),
            category: "c".into(),
            pattern: RulePattern::Keywords {
                any_of: vec!["x".into()],
            },
            target: RuleTarget::Both,
            mandatory,
            risk,
            remediation: remediation.into(),
        }
    }

    fn finding(rule_id: &str, artifact: &str, outcome: Outcome) -> Finding {
        Finding {
            id: format!("{rule_id}-{artifact}"),
            artifact_id: artifact.into(),
            artifact_version: 1,
            rule_id: rule_id.into(),
            rule_version: 1,
            standard: "TEST".into(),
            standard_version: "1".into(),
            outcome,
            evidence: String::new(),
            annotation: None,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_mandatory_fail_weighs_double() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        let rules = vec![rule("AUDIT", true, RiskLevel::High, "Add audit trail")];
        let findings = vec![finding("AUDIT", "R1", Outcome::Fail)];

        let b = scorer.calculate(&findings, &rules);
        assert_eq!(b.weighted_sum, 0.0);
        assert_eq!(b.weight_total, 2.0);
        assert_eq!(b.score, Some(0.0));
        assert_eq!(b.level, ComplianceLevel::NonCompliant);
    }

    #[test]
    fn test_weighted_score() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        let rules = vec![
            rule("M", true, RiskLevel::High, ""),
            rule("O", false, RiskLevel::Low, ""),
        ];
        let findings = vec![
            finding("M", "R1", Outcome::Pass),
            finding("M", "R2", Outcome::Partial),
            finding("O", "R1", Outcome::Fail),
            finding("O", "T1", Outcome::NotApplicable),
        ];
        let b = scorer.calculate(&findings, &rules);
        // (2*1 + 2*0.5 + 1*0) / (2 + 2 + 1) = 3 / 5
        assert_eq!(b.score, Some(0.6));
        assert_eq!(b.level, ComplianceLevel::PartiallyCompliant);
        assert_eq!(b.applicable, 3);
        assert_eq!(b.excluded, 1);
        assert_eq!(b.mandatory_gaps, 1);
    }

    #[test]
    fn test_nothing_applicable_is_not_assessed() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        let rules = vec![rule("M", true, RiskLevel::High, "")];
        let findings = vec![finding("M", "T1", Outcome::NotApplicable)];
        let b = scorer.calculate(&findings, &rules);
        assert_eq!(b.score, None);
        assert_eq!(b.level, ComplianceLevel::NotAssessed);

        let empty = scorer.calculate(&[], &rules);
        assert_eq!(empty.level, ComplianceLevel::NotAssessed);
    }

    #[test]
    fn test_level_thresholds() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        assert_eq!(scorer.level_for(Some(0.95)), ComplianceLevel::Compliant);
        assert_eq!(scorer.level_for(Some(0.90)), ComplianceLevel::Compliant);
        assert_eq!(scorer.level_for(Some(0.60)), ComplianceLevel::PartiallyCompliant);
        assert_eq!(scorer.level_for(Some(0.40)), ComplianceLevel::NonCompliant);
    }

    #[test]
    fn test_recommendations_ranked_and_deduplicated() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        let rules = vec![
            rule("A", true, RiskLevel::Medium, "Document the design"),
            rule("B", true, RiskLevel::Critical, "Add an audit trail"),
            rule("C", true, RiskLevel::Critical, "Add an audit trail"),
            rule("D", false, RiskLevel::Critical, "Optional advice"),
        ];
        let findings = vec![
            finding("A", "R1", Outcome::Fail),
            finding("B", "R2", Outcome::Partial),
            finding("B", "R1", Outcome::Fail),
            finding("C", "R3", Outcome::Fail),
            finding("D", "R1", Outcome::Fail),
            finding("A", "R4", Outcome::Pass),
        ];
        let recs = scorer.recommendations(&findings, &rules);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].remediation, "Add an audit trail");
        assert_eq!(recs[0].risk, RiskLevel::Critical);
        assert_eq!(recs[0].rule_id, "B");
        assert_eq!(recs[0].artifact_ids, vec!["R1", "R2", "R3"]);
        assert_eq!(recs[1].artifact_ids, vec!["R1"]);
    }

    #[test]
    fn test_no_findings_is_not_assessed() {
        let config = ScoringConfig::default();
        let scorer = ComplianceScorer::new(&config);
        let b = scorer.calculate(&[], &[]);
        assert_eq!(b.score, None);
        assert_eq!(b.level, ComplianceLevel::NotAssessed);
        assert_eq!(b.weight_total, 0.0);
    }
}
