//! Versioned regulatory rule sets
//!
//! A standard is a named, versioned [`StandardRuleSet`]. Rules are immutable
//! once registered under a version; changing rule semantics means publishing a
//! new rule version inside a new rule-set version.

mod builtin;
mod pack;
mod store;

pub use builtin::{builtin_standards, BUILTIN_VERSION};
pub use pack::{load_rule_pack, parse_rule_pack};
pub use store::{RuleStore, StandardOverview};

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{EngineError, EngineResult};
use crate::models::{ArtifactKind, RiskLevel};

/// Upper bound on compiled regex size for rule patterns
pub(crate) const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Which artifact kinds a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Requirement,
    TestCase,
    #[default]
    Both,
}

impl RuleTarget {
    pub fn applies_to(self, kind: ArtifactKind) -> bool {
        matches!(
            (self, kind),
            (RuleTarget::Both, _)
                | (RuleTarget::Requirement, ArtifactKind::Requirement)
                | (RuleTarget::TestCase, ArtifactKind::TestCase)
        )
    }
}

/// Comparator for structured field checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equals,
    Contains,
    NonEmpty,
}

/// How a rule inspects an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePattern {
    /// Passes when any keyword or phrase appears (case-insensitive, whole word)
    Keywords { any_of: Vec<String> },
    /// Passes when the pattern matches the artifact text (case-insensitive)
    Regex { pattern: String },
    /// Passes when the field exists and satisfies the comparator
    Field {
        field: String,
        comparator: Comparator,
        #[serde(default)]
        expected: Option<String>,
    },
    /// `field` must be present; the rule only applies when `tag_field`
    /// carries `tag_value`; the field value must then be one of `allowed`
    CrossField {
        field: String,
        tag_field: String,
        tag_value: String,
        #[serde(default)]
        allowed: Vec<String>,
    },
}

fn default_rule_version() -> u32 {
    1
}

/// A single compliance rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default = "default_rule_version")]
    pub version: u32,
    /// Owning standard name; filled in on registration when left empty
    #[serde(default)]
    pub standard: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub pattern: RulePattern,
    #[serde(default)]
    pub target: RuleTarget,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub remediation: String,
}

impl Rule {
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid_rule(&self.id, "rule id is empty"));
        }
        if self.version == 0 {
            return Err(EngineError::invalid_rule(&self.id, "rule version must be >= 1"));
        }
        match &self.pattern {
            RulePattern::Keywords { any_of } => {
                if any_of.iter().all(|k| k.trim().is_empty()) {
                    return Err(EngineError::invalid_rule(&self.id, "keyword list is empty"));
                }
            }
            RulePattern::Regex { pattern } => {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| EngineError::invalid_rule(&self.id, format!("bad regex: {e}")))?;
            }
            RulePattern::Field {
                field,
                comparator,
                expected,
            } => {
                if field.trim().is_empty() {
                    return Err(EngineError::invalid_rule(&self.id, "field name is empty"));
                }
                if *comparator != Comparator::NonEmpty && expected.is_none() {
                    return Err(EngineError::invalid_rule(
                        &self.id,
                        "equals/contains comparators need an expected value",
                    ));
                }
            }
            RulePattern::CrossField {
                field,
                tag_field,
                tag_value,
                ..
            } => {
                if field.trim().is_empty() || tag_field.trim().is_empty() {
                    return Err(EngineError::invalid_rule(&self.id, "field name is empty"));
                }
                if tag_value.trim().is_empty() {
                    return Err(EngineError::invalid_rule(&self.id, "tag value is empty"));
                }
            }
        }
        Ok(())
    }
}

/// A complete, versioned rule set for one standard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRuleSet {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<Rule>,
}

impl StandardRuleSet {
    /// Validate every rule, stamp the owning standard and sort into
    /// evaluation order.
    pub fn normalized(mut self) -> EngineResult<Self> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_rule("<rule set>", "standard name is empty"));
        }
        if self.version.trim().is_empty() {
            return Err(EngineError::invalid_rule(&self.name, "standard version is empty"));
        }

        let mut seen = HashSet::new();
        for rule in &mut self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.clone()) {
                return Err(EngineError::invalid_rule(&rule.id, "duplicate rule id in rule set"));
            }
            if rule.standard.is_empty() {
                rule.standard = self.name.clone();
            } else if rule.standard != self.name {
                return Err(EngineError::invalid_rule(
                    &rule.id,
                    format!("rule belongs to {} but is listed under {}", rule.standard, self.name),
                ));
            }
        }

        sort_rules(&mut self.rules);
        Ok(self)
    }

    pub fn mandatory_count(&self) -> usize {
        self.rules.iter().filter(|r| r.mandatory).count()
    }
}

/// Evaluation order: mandatory first, then risk descending, then rule id.
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.mandatory
            .cmp(&a.mandatory)
            .then_with(|| b.risk.cmp(&a.risk))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Compare dotted version strings numerically where possible ("2024.10" > "2024.9").
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
