//! Built-in healthcare and data-protection standards
//!
//! Each regulation is split into requirement-side rules (does the requirement
//! address the control?) and test-side rules (does a test exercise it?). Both
//! sides of one control share a category, which is what coverage analysis
//! matches test cases against.
//!
//! Every standard also carries optional test documentation rules
//! (`<PREFIX>_DOC_*`): they count towards the score but never produce
//! recommendations.

use super::{Comparator, Rule, RulePattern, RuleTarget, StandardRuleSet};
use crate::models::RiskLevel;

pub const BUILTIN_VERSION: &str = "2024.1";

struct Spec<'a> {
    id: &'a str,
    title: &'a str,
    category: &'a str,
    target: RuleTarget,
    mandatory: bool,
    risk: RiskLevel,
    remediation: &'a str,
}

fn rule(spec: Spec<'_>, pattern: RulePattern) -> Rule {
    Rule {
        id: spec.id.to_string(),
        version: 1,
        standard: String::new(),
        title: spec.title.to_string(),
        category: spec.category.to_string(),
        pattern,
        target: spec.target,
        mandatory: spec.mandatory,
        risk: spec.risk,
        remediation: spec.remediation.to_string(),
    }
}

/// Alternation of word-anchored patterns
fn any_of(patterns: &[&str]) -> RulePattern {
    RulePattern::Regex {
        pattern: format!(r"\b(?:{})", patterns.join("|")),
    }
}

fn keywords(words: &[&str]) -> RulePattern {
    RulePattern::Keywords {
        any_of: words.iter().map(|w| w.to_string()).collect(),
    }
}

fn non_empty(field: &str) -> RulePattern {
    RulePattern::Field {
        field: field.to_string(),
        comparator: Comparator::NonEmpty,
        expected: None,
    }
}

/// Test case documentation checks shared by every built-in standard
fn test_documentation(prefix: &str) -> Vec<Rule> {
    vec![
        rule(
            Spec {
                id: &format!("{prefix}_DOC_001"),
                title: "Test Preconditions Documented",
                category: "test_documentation",
                target: RuleTarget::TestCase,
                mandatory: false,
                risk: RiskLevel::Low,
                remediation: "Document the preconditions the test case relies on",
            },
            non_empty("preconditions"),
        ),
        rule(
            Spec {
                id: &format!("{prefix}_DOC_002"),
                title: "Expected Results Documented",
                category: "test_documentation",
                target: RuleTarget::TestCase,
                mandatory: false,
                risk: RiskLevel::Medium,
                remediation: "Give the test steps an expected result",
            },
            non_empty("expected_results"),
        ),
    ]
}

fn standard(name: &str, prefix: &str, description: &str, mut rules: Vec<Rule>) -> StandardRuleSet {
    rules.extend(test_documentation(prefix));
    StandardRuleSet {
        name: name.to_string(),
        version: BUILTIN_VERSION.to_string(),
        description: description.to_string(),
        rules,
    }
}

fn fda_820() -> StandardRuleSet {
    standard(
        "FDA 21 CFR Part 820",
        "FDA_820",
        "Quality System Regulation for medical device manufacturers",
        vec![
            rule(
                Spec {
                    id: "FDA_820_001",
                    title: "Design Controls",
                    category: "design_controls",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Document design inputs, outputs, reviews, verification and validation for the requirement",
                },
                any_of(&[
                    r"design\s+control",
                    r"design\s+input",
                    r"design\s+output",
                    r"design\s+review",
                    r"design\s+verification",
                    r"design\s+validation",
                ]),
            ),
            rule(
                Spec {
                    id: "FDA_820_001_TC",
                    title: "Design Verification Testing",
                    category: "design_controls",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add test steps that verify or validate the design and record traceability",
                },
                any_of(&[
                    r"verify\s+design",
                    r"validate\s+design",
                    r"design\s+review",
                    r"traceability",
                ]),
            ),
            rule(
                Spec {
                    id: "FDA_820_002",
                    title: "Risk Management",
                    category: "risk_management",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Perform and reference a risk or hazard analysis with mitigations",
                },
                any_of(&[
                    r"risk\s+analysis",
                    r"risk\s+management",
                    r"hazard\s+analysis",
                    r"failure\s+mode",
                ]),
            ),
            rule(
                Spec {
                    id: "FDA_820_002_TC",
                    title: "Risk-Based Testing",
                    category: "risk_management",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add risk, hazard or failure-mode test scenarios",
                },
                any_of(&[
                    r"risk\s+test",
                    r"safety\s+test",
                    r"hazard\s+test",
                    r"failure\s+test",
                ]),
            ),
            rule(
                Spec {
                    id: "FDA_820_003",
                    title: "Design History Traceability",
                    category: "traceability",
                    target: RuleTarget::Requirement,
                    mandatory: false,
                    risk: RiskLevel::Medium,
                    remediation: "Reference the source document the requirement was derived from",
                },
                RulePattern::Field {
                    field: "source_document".to_string(),
                    comparator: Comparator::NonEmpty,
                    expected: None,
                },
            ),
        ],
    )
}

fn iec_62304() -> StandardRuleSet {
    standard(
        "IEC 62304",
        "IEC_62304",
        "Medical device software lifecycle processes",
        vec![
            rule(
                Spec {
                    id: "IEC_62304_001",
                    title: "Software Safety Classification",
                    category: "safety_classification",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "State the software safety class (A, B or C) and the supporting safety analysis",
                },
                any_of(&[
                    r"safety\s+class",
                    r"class\s+[abc]\b",
                    r"safety\s+classification",
                    r"medical\s+device\s+software",
                ]),
            ),
            rule(
                Spec {
                    id: "IEC_62304_001_TC",
                    title: "Safety Class Verification",
                    category: "safety_classification",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add safety verification tests matching the software safety class",
                },
                any_of(&[
                    r"safety\s+test",
                    r"class\s+[abc]\s+test",
                    r"safety\s+verification",
                ]),
            ),
            rule(
                Spec {
                    id: "IEC_62304_002",
                    title: "Software Development Lifecycle",
                    category: "lifecycle",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::Medium,
                    remediation: "Reference the software development plan, architecture or design documentation",
                },
                any_of(&[
                    r"software\s+development\s+plan",
                    r"development\s+lifecycle",
                    r"software\s+architecture",
                    r"software\s+design",
                ]),
            ),
            rule(
                Spec {
                    id: "IEC_62304_002_TC",
                    title: "Lifecycle Test Levels",
                    category: "lifecycle",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::Medium,
                    remediation: "Classify the test as unit, integration, system or software test",
                },
                any_of(&[
                    r"integration\s+test",
                    r"system\s+test",
                    r"software\s+test",
                    r"unit\s+test",
                ]),
            ),
            rule(
                Spec {
                    id: "IEC_62304_003",
                    title: "Safety Class Declared",
                    category: "safety_classification",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::Critical,
                    remediation: "Record metadata.safety_class as A, B or C on every safety requirement",
                },
                RulePattern::CrossField {
                    field: "metadata.safety_class".to_string(),
                    tag_field: "type".to_string(),
                    tag_value: "safety".to_string(),
                    allowed: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                },
            ),
        ],
    )
}

fn iso_13485() -> StandardRuleSet {
    standard(
        "ISO 13485",
        "ISO_13485",
        "Quality management systems for medical devices",
        vec![
            rule(
                Spec {
                    id: "ISO_13485_001",
                    title: "Quality Management System",
                    category: "quality_management",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::Medium,
                    remediation: "Tie the requirement to documented quality management procedures",
                },
                any_of(&[
                    r"quality\s+management",
                    r"qms\b",
                    r"quality\s+system",
                    r"quality\s+control",
                ]),
            ),
            rule(
                Spec {
                    id: "ISO_13485_001_TC",
                    title: "Quality Verification",
                    category: "quality_management",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::Medium,
                    remediation: "Add quality verification steps to the test case",
                },
                any_of(&[
                    r"quality\s+test",
                    r"qms\s+test",
                    r"quality\s+verification",
                ]),
            ),
        ],
    )
}

fn iso_27001() -> StandardRuleSet {
    standard(
        "ISO 27001",
        "ISO_27001",
        "Information security management systems",
        vec![
            rule(
                Spec {
                    id: "ISO_27001_001",
                    title: "Information Security Management",
                    category: "information_security",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Specify the security controls (access control, encryption, authentication) that apply",
                },
                any_of(&[
                    r"information\s+security",
                    r"data\s+security",
                    r"security\s+control",
                    r"access\s+control",
                    r"encryption",
                    r"authentication",
                ]),
            ),
            rule(
                Spec {
                    id: "ISO_27001_001_TC",
                    title: "Security Testing",
                    category: "information_security",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add security, access control, authentication, encryption or penetration tests",
                },
                any_of(&[
                    r"security\s+test",
                    r"access\s+control\s+test",
                    r"authentication\s+test",
                    r"encryption\s+test",
                    r"penetration\s+test",
                ]),
            ),
        ],
    )
}

fn hipaa() -> StandardRuleSet {
    standard(
        "HIPAA",
        "HIPAA",
        "Health Insurance Portability and Accountability Act security and privacy rules",
        vec![
            rule(
                Spec {
                    id: "HIPAA_001",
                    title: "Protected Health Information",
                    category: "phi_protection",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Describe how protected health information is kept private and confidential",
                },
                any_of(&[
                    r"protected\s+health\s+information",
                    r"phi\b",
                    r"patient\s+data",
                    r"health\s+information",
                    r"privacy",
                    r"confidentiality",
                ]),
            ),
            rule(
                Spec {
                    id: "HIPAA_001_TC",
                    title: "Privacy Testing",
                    category: "phi_protection",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add privacy, PHI or confidentiality test scenarios",
                },
                any_of(&[
                    r"privacy\s+test",
                    r"phi\s+test",
                    r"data\s+protection\s+test",
                    r"confidentiality\s+test",
                ]),
            ),
            rule(
                Spec {
                    id: "HIPAA_002",
                    title: "Audit Controls",
                    category: "audit_controls",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Require an audit trail recording access to protected health information",
                },
                keywords(&["audit trail", "audit log", "access log"]),
            ),
        ],
    )
}

fn gdpr() -> StandardRuleSet {
    standard(
        "GDPR",
        "GDPR",
        "General Data Protection Regulation",
        vec![
            rule(
                Spec {
                    id: "GDPR_001",
                    title: "Data Protection and Privacy",
                    category: "data_protection",
                    target: RuleTarget::Requirement,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Address consent management and data subject rights for personal data",
                },
                any_of(&[
                    r"data\s+protection",
                    r"gdpr",
                    r"personal\s+data",
                    r"data\s+subject\s+rights",
                    r"consent",
                    r"data\s+processing",
                ]),
            ),
            rule(
                Spec {
                    id: "GDPR_001_TC",
                    title: "Data Protection Testing",
                    category: "data_protection",
                    target: RuleTarget::TestCase,
                    mandatory: true,
                    risk: RiskLevel::High,
                    remediation: "Add GDPR, consent or data subject request test scenarios",
                },
                any_of(&[
                    r"gdpr\s+test",
                    r"data\s+protection\s+test",
                    r"consent\s+test",
                    r"data\s+subject\s+test",
                    r"privacy\s+test",
                ]),
            ),
            rule(
                Spec {
                    id: "GDPR_002",
                    title: "Right to Erasure",
                    category: "data_subject_rights",
                    target: RuleTarget::Requirement,
                    mandatory: false,
                    risk: RiskLevel::Medium,
                    remediation: "State how personal data is erased on request",
                },
                keywords(&["erasure", "right to be forgotten", "delete personal data"]),
            ),
        ],
    )
}

/// All built-in standards at [`BUILTIN_VERSION`]
pub fn builtin_standards() -> Vec<StandardRuleSet> {
    vec![fda_820(), iec_62304(), iso_13485(), iso_27001(), hipaa(), gdpr()]
}
