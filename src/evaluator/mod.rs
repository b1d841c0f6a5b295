//! Rule evaluator
//!
//! Matches one artifact against one rule. Evaluation is pure: the same
//! (artifact version, rule version) always yields the same outcome and
//! evidence. Compiled matchers are cached by pattern source, which is safe
//! because published rules never change under a version.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use tracing::warn;

use crate::errors::EngineError;
use crate::models::{deterministic_finding_id, Artifact, FieldValue, Finding, Outcome, StandardRef};
use crate::rules::{Comparator, Rule, RulePattern, REGEX_SIZE_LIMIT};

/// Outcome plus the evidence that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub evidence: String,
    pub annotation: Option<String>,
}

impl Verdict {
    fn new(outcome: Outcome, evidence: impl Into<String>) -> Self {
        Self {
            outcome,
            evidence: evidence.into(),
            annotation: None,
        }
    }
}

#[derive(Default)]
pub struct Evaluator {
    matchers: DashMap<String, Option<Arc<Regex>>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `rule` against `artifact`, stamped with the current time.
    pub fn evaluate(&self, artifact: &Artifact, rule: &Rule) -> Finding {
        let standard = StandardRef {
            name: rule.standard.clone(),
            version: String::new(),
        };
        self.evaluate_at(artifact, rule, &standard, Utc::now())
    }

    /// Evaluate with an explicit standard version and timestamp
    pub fn evaluate_at(
        &self,
        artifact: &Artifact,
        rule: &Rule,
        standard: &StandardRef,
        at: DateTime<Utc>,
    ) -> Finding {
        finding_from(artifact, rule, standard, at, self.judge(artifact, rule))
    }

    /// A `fail` finding for an evaluation that missed the assessment deadline
    pub fn timed_out(
        &self,
        artifact: &Artifact,
        rule: &Rule,
        standard: &StandardRef,
        at: DateTime<Utc>,
    ) -> Finding {
        let timeout = EngineError::EvaluationTimeout {
            rule_id: rule.id.clone(),
            artifact_id: artifact.id().to_string(),
        };
        let verdict = Verdict {
            outcome: Outcome::Fail,
            evidence: "not evaluated: assessment deadline exceeded".to_string(),
            annotation: Some(format!("EvaluationTimeout: {timeout}")),
        };
        finding_from(artifact, rule, standard, at, verdict)
    }

    /// Decide the outcome of `rule` on `artifact`
    pub fn judge(&self, artifact: &Artifact, rule: &Rule) -> Verdict {
        if !rule.target.applies_to(artifact.kind()) {
            return Verdict::new(
                Outcome::NotApplicable,
                format!("rule does not apply to {} artifacts", artifact.kind()),
            );
        }

        match &rule.pattern {
            RulePattern::Keywords { any_of } => self.judge_keywords(artifact, rule, any_of),
            RulePattern::Regex { pattern } => self.judge_regex(artifact, rule, pattern),
            RulePattern::Field {
                field,
                comparator,
                expected,
            } => judge_field(artifact, field, *comparator, expected.as_deref()),
            RulePattern::CrossField {
                field,
                tag_field,
                tag_value,
                allowed,
            } => judge_cross_field(artifact, field, tag_field, tag_value, allowed),
        }
    }

    fn matcher(&self, source: &str) -> Option<Arc<Regex>> {
        if let Some(cached) = self.matchers.get(source) {
            return cached.clone();
        }
        let compiled = RegexBuilder::new(source)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Arc::new);
        let entry = match compiled {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Rule pattern failed to compile: {}", e);
                None
            }
        };
        self.matchers.insert(source.to_string(), entry.clone());
        entry
    }

    fn judge_keywords(&self, artifact: &Artifact, rule: &Rule, keywords: &[String]) -> Verdict {
        let text = artifact.text();
        let mut matched = Vec::new();
        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            let Some(re) = self.matcher(&keyword_pattern(keyword)) else {
                return invalid_pattern(rule);
            };
            if re.is_match(&text) {
                matched.push(keyword.trim());
            }
        }

        if matched.is_empty() {
            Verdict::new(
                Outcome::Fail,
                format!("none of [{}] found", keywords.join(", ")),
            )
        } else {
            Verdict::new(
                Outcome::Pass,
                format!("matched keywords: {}", matched.join(", ")),
            )
        }
    }

    fn judge_regex(&self, artifact: &Artifact, rule: &Rule, pattern: &str) -> Verdict {
        let Some(re) = self.matcher(pattern) else {
            return invalid_pattern(rule);
        };
        let text = artifact.text();
        match re.find(&text) {
            Some(m) => Verdict::new(
                Outcome::Pass,
                format!("pattern matched \"{}\"", collapse_whitespace(m.as_str())),
            ),
            None => Verdict::new(Outcome::Fail, format!("pattern /{pattern}/ not found")),
        }
    }
}

fn finding_from(
    artifact: &Artifact,
    rule: &Rule,
    standard: &StandardRef,
    at: DateTime<Utc>,
    verdict: Verdict,
) -> Finding {
    let id = deterministic_finding_id(
        artifact.id(),
        artifact.version(),
        &rule.id,
        rule.version,
        verdict.outcome,
        &verdict.evidence,
    );
    Finding {
        id,
        artifact_id: artifact.id().to_string(),
        artifact_version: artifact.version(),
        rule_id: rule.id.clone(),
        rule_version: rule.version,
        standard: standard.name.clone(),
        standard_version: standard.version.clone(),
        outcome: verdict.outcome,
        evidence: verdict.evidence,
        annotation: verdict.annotation,
        evaluated_at: at,
    }
}

fn invalid_pattern(rule: &Rule) -> Verdict {
    Verdict {
        outcome: Outcome::Fail,
        evidence: "rule pattern could not be compiled".to_string(),
        annotation: Some(format!("invalid pattern in rule {}", rule.id)),
    }
}

/// Whole-word, case-insensitive matcher for a keyword or phrase; phrase words
/// may be separated by any whitespace.
pub(crate) fn keyword_pattern(keyword: &str) -> String {
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    format!(r"(?:^|[^\w])(?:{})(?:[^\w]|$)", words.join(r"\s+"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn judge_field(
    artifact: &Artifact,
    field: &str,
    comparator: Comparator,
    expected: Option<&str>,
) -> Verdict {
    let Some(value) = artifact.field(field) else {
        return Verdict::new(Outcome::Fail, format!("field {field} is absent"));
    };
    let shown = value.display();

    match comparator {
        Comparator::NonEmpty => {
            if value.is_empty() {
                Verdict::new(Outcome::Fail, format!("field {field} is empty"))
            } else {
                Verdict::new(Outcome::Pass, format!("field {field} = \"{shown}\""))
            }
        }
        Comparator::Equals => {
            let expected = expected.unwrap_or_default();
            if value.values().any(|v| v.trim().eq_ignore_ascii_case(expected.trim())) {
                Verdict::new(Outcome::Pass, format!("field {field} = \"{shown}\""))
            } else {
                Verdict::new(
                    Outcome::Fail,
                    format!("field {field} = \"{shown}\", expected \"{expected}\""),
                )
            }
        }
        Comparator::Contains => {
            let needle = expected.unwrap_or_default().to_lowercase();
            if value.values().any(|v| v.to_lowercase().contains(&needle)) {
                Verdict::new(
                    Outcome::Pass,
                    format!("field {field} contains \"{}\"", expected.unwrap_or_default()),
                )
            } else {
                Verdict::new(
                    Outcome::Fail,
                    format!(
                        "field {field} = \"{shown}\" does not contain \"{}\"",
                        expected.unwrap_or_default()
                    ),
                )
            }
        }
    }
}

fn tag_matches(value: &FieldValue, tag: &str) -> bool {
    value.values().any(|v| v.trim().eq_ignore_ascii_case(tag.trim()))
}

/// Order of checks: missing field fails, an untagged artifact is not
/// applicable, an allowed value passes and anything else is partial.
fn judge_cross_field(
    artifact: &Artifact,
    field: &str,
    tag_field: &str,
    tag_value: &str,
    allowed: &[String],
) -> Verdict {
    let value = match artifact.field(field) {
        Some(v) if !v.is_empty() => v,
        _ => return Verdict::new(Outcome::Fail, format!("required field {field} is missing")),
    };

    let tagged = artifact
        .field(tag_field)
        .is_some_and(|t| tag_matches(&t, tag_value));
    if !tagged {
        return Verdict::new(
            Outcome::NotApplicable,
            format!("{tag_field} is not \"{tag_value}\""),
        );
    }

    let shown = value.display();
    let consistent = allowed.is_empty()
        || value
            .values()
            .all(|v| allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(v.trim())));
    if consistent {
        Verdict::new(Outcome::Pass, format!("{field} = \"{shown}\""))
    } else {
        Verdict::new(
            Outcome::Partial,
            format!("{field} = \"{shown}\", expected one of {}", allowed.join(", ")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Requirement, RequirementType, RiskLevel, TestCase};
    use crate::rules::RuleTarget;

    fn rule(pattern: RulePattern, target: RuleTarget) -> Rule {
        Rule {
            id: "R_001".into(),
            version: 1,
            standard: "TEST".into(),
            title: "test rule".into(),
            category: "general".into(),
            pattern,
            target,
            mandatory: true,
            risk: RiskLevel::High,
            remediation: "fix it".into(),
        }
    }

    fn keywords(words: &[&str]) -> RulePattern {
        RulePattern::Keywords {
            any_of: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn req(text: &str) -> Artifact {
        Artifact::Requirement(Requirement::new("REQ-1", "Title", text))
    }

    #[test]
    fn test_keyword_fail_on_unrelated_text() {
        let ev = Evaluator::new();
        let artifact = req("The system shall authenticate users with encrypted credentials");
        let finding = ev.evaluate(&artifact, &rule(keywords(&["audit trail"]), RuleTarget::Both));
        assert_eq!(finding.outcome, Outcome::Fail);
        assert_eq!(finding.artifact_id, "REQ-1");
        assert_eq!(finding.standard, "TEST");
    }

    #[test]
    fn test_keyword_phrase_matches_across_whitespace() {
        let ev = Evaluator::new();
        let artifact = req("Every change is written to the AUDIT\n   Trail within 1s");
        let verdict = ev.judge(&artifact, &rule(keywords(&["audit trail"]), RuleTarget::Both));
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert_eq!(verdict.evidence, "matched keywords: audit trail");
    }

    #[test]
    fn test_keyword_is_whole_word() {
        let ev = Evaluator::new();
        let artifact = req("Graphite rendering of the philosophy page");
        let verdict = ev.judge(&artifact, &rule(keywords(&["phi"]), RuleTarget::Both));
        assert_eq!(verdict.outcome, Outcome::Fail);
    }

    #[test]
    fn test_kind_mismatch_is_not_applicable() {
        let ev = Evaluator::new();
        let tc = Artifact::TestCase(TestCase::new("TC-1", "audit trail test").with_step("a", "b"));
        let verdict = ev.judge(&tc, &rule(keywords(&["audit trail"]), RuleTarget::Requirement));
        assert_eq!(verdict.outcome, Outcome::NotApplicable);
    }

    #[test]
    fn test_regex_rule() {
        let ev = Evaluator::new();
        let pattern = RulePattern::Regex {
            pattern: r"\b(?:design\s+review|traceability)".into(),
        };
        let artifact = req("Outputs go through a Design   Review");
        let verdict = ev.judge(&artifact, &rule(pattern, RuleTarget::Both));
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert_eq!(verdict.evidence, "pattern matched \"Design Review\"");
    }

    #[test]
    fn test_invalid_regex_fails_with_annotation() {
        let ev = Evaluator::new();
        let pattern = RulePattern::Regex {
            pattern: "(broken".into(),
        };
        let verdict = ev.judge(&req("anything"), &rule(pattern, RuleTarget::Both));
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert!(verdict.annotation.is_some());
    }

    #[test]
    fn test_field_checks() {
        let ev = Evaluator::new();
        let artifact = Artifact::Requirement(
            Requirement::new("REQ-1", "t", "text")
                .with_source_document("SRS-001 rev B")
                .with_metadata("owner", ""),
        );

        let non_empty = |field: &str| RulePattern::Field {
            field: field.into(),
            comparator: Comparator::NonEmpty,
            expected: None,
        };
        assert_eq!(
            ev.judge(&artifact, &rule(non_empty("source_document"), RuleTarget::Both)).outcome,
            Outcome::Pass
        );
        assert_eq!(
            ev.judge(&artifact, &rule(non_empty("metadata.owner"), RuleTarget::Both)).outcome,
            Outcome::Fail
        );
        assert_eq!(
            ev.judge(&artifact, &rule(non_empty("metadata.missing"), RuleTarget::Both)).outcome,
            Outcome::Fail
        );

        let contains = RulePattern::Field {
            field: "source_document".into(),
            comparator: Comparator::Contains,
            expected: Some("srs".into()),
        };
        assert_eq!(ev.judge(&artifact, &rule(contains, RuleTarget::Both)).outcome, Outcome::Pass);

        let equals = RulePattern::Field {
            field: "priority".into(),
            comparator: Comparator::Equals,
            expected: Some("critical".into()),
        };
        assert_eq!(ev.judge(&artifact, &rule(equals, RuleTarget::Both)).outcome, Outcome::Fail);
    }

    #[test]
    fn test_expected_results_field() {
        let ev = Evaluator::new();
        let r = rule(
            RulePattern::Field {
                field: "expected_results".into(),
                comparator: Comparator::NonEmpty,
                expected: None,
            },
            RuleTarget::TestCase,
        );

        let bare = Artifact::TestCase(TestCase::new("TC-1", "Login").with_step("Log in", ""));
        let verdict = ev.judge(&bare, &r);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.evidence, "field expected_results is empty");

        let documented = Artifact::TestCase(
            TestCase::new("TC-1", "Login")
                .with_step("Open the login page", "")
                .with_step("Log in", "Dashboard shown"),
        );
        assert_eq!(ev.judge(&documented, &r).outcome, Outcome::Pass);

        // Requirements have no steps to document
        assert_eq!(ev.judge(&req("text"), &r).outcome, Outcome::NotApplicable);
    }

    #[test]
    fn test_cross_field_outcomes() {
        let ev = Evaluator::new();
        let pattern = RulePattern::CrossField {
            field: "metadata.safety_class".into(),
            tag_field: "type".into(),
            tag_value: "safety".into(),
            allowed: vec!["A".into(), "B".into(), "C".into()],
        };
        let r = rule(pattern, RuleTarget::Requirement);
        let base = || Requirement::new("REQ-1", "t", "text");

        let missing = Artifact::Requirement(base().with_type(RequirementType::Safety));
        assert_eq!(ev.judge(&missing, &r).outcome, Outcome::Fail);

        let untagged = Artifact::Requirement(base().with_metadata("safety_class", "B"));
        assert_eq!(ev.judge(&untagged, &r).outcome, Outcome::NotApplicable);

        let valid = Artifact::Requirement(
            base()
                .with_type(RequirementType::Safety)
                .with_metadata("safety_class", "b"),
        );
        assert_eq!(ev.judge(&valid, &r).outcome, Outcome::Pass);

        let inconsistent = Artifact::Requirement(
            base()
                .with_type(RequirementType::Safety)
                .with_metadata("safety_class", "D"),
        );
        let verdict = ev.judge(&inconsistent, &r);
        assert_eq!(verdict.outcome, Outcome::Partial);
        assert!(verdict.evidence.contains("expected one of A, B, C"));
    }

    #[test]
    fn test_findings_are_deterministic() {
        let ev = Evaluator::new();
        let artifact = req("Access is recorded in an audit log");
        let r = rule(keywords(&["audit trail", "audit log"]), RuleTarget::Both);
        let a = ev.evaluate(&artifact, &r);
        let b = Evaluator::new().evaluate(&artifact, &r);
        assert!(a.same_result(&b));
    }

    #[test]
    fn test_timed_out_finding() {
        let ev = Evaluator::new();
        let artifact = req("text");
        let r = rule(keywords(&["text"]), RuleTarget::Both);
        let std = StandardRef {
            name: "TEST".into(),
            version: "1".into(),
        };
        let finding = ev.timed_out(&artifact, &r, &std, Utc::now());
        assert_eq!(finding.outcome, Outcome::Fail);
        assert!(finding
            .annotation
            .as_deref()
            .is_some_and(|a| a.starts_with("EvaluationTimeout")));
    }
}
