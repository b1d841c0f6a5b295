//! Core data models for regtrace
//!
//! These models are used throughout the codebase for representing
//! requirements, test cases, findings and assessment results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::errors::{EngineError, EngineResult};

/// Hex-encoded SHA-256 of `input`, truncated to `len` characters.
pub(crate) fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..len.min(hex.len())].to_string()
}

/// Generate a deterministic finding ID based on content hash.
///
/// The ID is a 16-character hex string derived from hashing the artifact
/// (id + version), the rule (id + version), the outcome and the evidence.
/// Timestamps are not hashed: re-running an assessment over an unchanged
/// scope reproduces the same ids.
pub fn deterministic_finding_id(
    artifact_id: &str,
    artifact_version: u32,
    rule_id: &str,
    rule_version: u32,
    outcome: Outcome,
    evidence: &str,
) -> String {
    let input =
        format!("{artifact_id}\n{artifact_version}\n{rule_id}\n{rule_version}\n{outcome}\n{evidence}");
    short_hash(&input, 16)
}

/// Hash of a sorted, de-duplicated artifact id set.
pub fn scope_hash<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    let mut sorted: Vec<&String> = ids.into_iter().collect();
    sorted.sort();
    sorted.dedup();
    let joined = sorted
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    short_hash(&joined, 16)
}

/// Kind of artifact held in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Requirement,
    TestCase,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Requirement => write!(f, "requirement"),
            ArtifactKind::TestCase => write!(f, "test_case"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequirementType {
    #[default]
    Functional,
    Performance,
    Safety,
    Security,
    Regulatory,
    Usability,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for RequirementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequirementType::Functional => "functional",
            RequirementType::Performance => "performance",
            RequirementType::Safety => "safety",
            RequirementType::Security => "security",
            RequirementType::Regulatory => "regulatory",
            RequirementType::Usability => "usability",
            RequirementType::Other => "other",
        };
        write!(f, "{s}")
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStatus {
    #[default]
    Draft,
    Approved,
    Superseded,
}

impl std::fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequirementStatus::Draft => write!(f, "draft"),
            RequirementStatus::Approved => write!(f, "approved"),
            RequirementStatus::Superseded => write!(f, "superseded"),
        }
    }
}

/// Pointer to one specific version of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub version: u32,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

fn default_version() -> u32 {
    1
}

fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.chars().any(char::is_whitespace)
}

/// A natural-language requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(default, rename = "type")]
    pub req_type: RequirementType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub source_document: Option<String>,
    /// Applicable standard tags (e.g. "HIPAA", "IEC 62304")
    #[serde(default)]
    pub standards: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub status: RequirementStatus,
    /// External (ALM) identifiers and other opaque data, round-tripped untouched
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub supersedes: Option<ArtifactRef>,
    #[serde(default = "Utc::now")]
    pub revised_at: DateTime<Utc>,
}

impl Requirement {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
            req_type: RequirementType::default(),
            priority: Priority::default(),
            source_document: None,
            standards: Vec::new(),
            version: 1,
            status: RequirementStatus::default(),
            metadata: BTreeMap::new(),
            supersedes: None,
            revised_at: Utc::now(),
        }
    }

    pub fn with_type(mut self, req_type: RequirementType) -> Self {
        self.req_type = req_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standards.push(standard.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_source_document(mut self, doc: impl Into<String>) -> Self {
        self.source_document = Some(doc.into());
        self
    }

    pub fn is_superseded(&self) -> bool {
        self.status == RequirementStatus::Superseded
    }

    /// Reject malformed records. Nothing is repaired.
    pub fn validate(&self) -> EngineResult<()> {
        if !is_valid_id(&self.id) {
            return Err(EngineError::invalid_artifact(
                &self.id,
                "identifier must be non-empty and contain no whitespace",
            ));
        }
        if self.text.trim().is_empty() {
            return Err(EngineError::invalid_artifact(&self.id, "requirement text is empty"));
        }
        if self.version == 0 {
            return Err(EngineError::invalid_artifact(&self.id, "version must be >= 1"));
        }
        Ok(())
    }

    /// Same content, ignoring version bookkeeping.
    pub fn same_content(&self, other: &Requirement) -> bool {
        self.title == other.title
            && self.text == other.text
            && self.req_type == other.req_type
            && self.priority == other.priority
            && self.source_document == other.source_document
            && self.standards == other.standards
            && self.status == other.status
            && self.metadata == other.metadata
    }
}

/// One ordered step of a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    #[serde(default)]
    pub expected: String,
}

impl TestStep {
    pub fn new(action: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            expected: expected.into(),
        }
    }
}

/// A test case verifying one or more requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub preconditions: Option<String>,
    #[serde(default)]
    pub postconditions: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub compliance_tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub revised_at: DateTime<Utc>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            steps: Vec::new(),
            preconditions: None,
            postconditions: None,
            priority: Priority::default(),
            compliance_tags: Vec::new(),
            version: 1,
            metadata: BTreeMap::new(),
            revised_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, action: impl Into<String>, expected: impl Into<String>) -> Self {
        self.steps.push(TestStep::new(action, expected));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.compliance_tags.push(tag.into());
        self
    }

    pub fn with_preconditions(mut self, pre: impl Into<String>) -> Self {
        self.preconditions = Some(pre.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !is_valid_id(&self.id) {
            return Err(EngineError::invalid_artifact(
                &self.id,
                "identifier must be non-empty and contain no whitespace",
            ));
        }
        if self.title.trim().is_empty() {
            return Err(EngineError::invalid_artifact(&self.id, "test case title is empty"));
        }
        if self.steps.is_empty() {
            return Err(EngineError::invalid_artifact(&self.id, "test case has no steps"));
        }
        if let Some(pos) = self.steps.iter().position(|s| s.action.trim().is_empty()) {
            return Err(EngineError::invalid_artifact(
                &self.id,
                format!("step {} has an empty action", pos + 1),
            ));
        }
        if self.version == 0 {
            return Err(EngineError::invalid_artifact(&self.id, "version must be >= 1"));
        }
        Ok(())
    }

    pub fn same_content(&self, other: &TestCase) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.steps == other.steps
            && self.preconditions == other.preconditions
            && self.postconditions == other.postconditions
            && self.priority == other.priority
            && self.compliance_tags == other.compliance_tags
            && self.metadata == other.metadata
    }
}

/// Value of a named artifact field, as seen by field-check rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Iterate the individual values (one for text, each element for lists)
    pub fn values(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            FieldValue::Text(s) => Box::new(std::iter::once(s.as_str())),
            FieldValue::List(items) => Box::new(items.iter().map(|s| s.as_str())),
        }
    }

    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

fn optional_text(value: &Option<String>) -> Option<FieldValue> {
    value.as_ref().map(|s| FieldValue::Text(s.clone()))
}

/// Either kind of artifact, as stored in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Requirement(Requirement),
    TestCase(TestCase),
}

impl Artifact {
    pub fn id(&self) -> &str {
        match self {
            Artifact::Requirement(r) => &r.id,
            Artifact::TestCase(t) => &t.id,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Artifact::Requirement(r) => r.version,
            Artifact::TestCase(t) => t.version,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Requirement(_) => ArtifactKind::Requirement,
            Artifact::TestCase(_) => ArtifactKind::TestCase,
        }
    }

    pub fn revised_at(&self) -> DateTime<Utc> {
        match self {
            Artifact::Requirement(r) => r.revised_at,
            Artifact::TestCase(t) => t.revised_at,
        }
    }

    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef {
            id: self.id().to_string(),
            version: self.version(),
        }
    }

    pub fn as_requirement(&self) -> Option<&Requirement> {
        match self {
            Artifact::Requirement(r) => Some(r),
            Artifact::TestCase(_) => None,
        }
    }

    pub fn as_test_case(&self) -> Option<&TestCase> {
        match self {
            Artifact::TestCase(t) => Some(t),
            Artifact::Requirement(_) => None,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Artifact::Requirement(r) => r.validate(),
            Artifact::TestCase(t) => t.validate(),
        }
    }

    /// Searchable text: every human-written field joined by newlines
    pub fn text(&self) -> String {
        match self {
            Artifact::Requirement(r) => format!("{}\n{}", r.title, r.text),
            Artifact::TestCase(t) => {
                let mut parts = vec![t.title.clone(), t.description.clone()];
                if let Some(pre) = &t.preconditions {
                    parts.push(pre.clone());
                }
                for step in &t.steps {
                    parts.push(step.action.clone());
                    parts.push(step.expected.clone());
                }
                if let Some(post) = &t.postconditions {
                    parts.push(post.clone());
                }
                parts.join("\n")
            }
        }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        match self {
            Artifact::Requirement(r) => &r.metadata,
            Artifact::TestCase(t) => &t.metadata,
        }
    }

    /// Resolve a named field.
    ///
    /// `metadata.<key>` addresses opaque metadata explicitly; a bare name that
    /// is not a built-in field of this artifact kind falls back to metadata.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(key) = name.strip_prefix("metadata.") {
            return self.metadata().get(key).map(|v| FieldValue::Text(v.clone()));
        }

        let builtin = match (self, name) {
            (_, "id") => Some(Some(FieldValue::Text(self.id().to_string()))),
            (Artifact::Requirement(r), "title") => Some(Some(FieldValue::Text(r.title.clone()))),
            (Artifact::Requirement(r), "text") => Some(Some(FieldValue::Text(r.text.clone()))),
            (Artifact::Requirement(r), "type") => {
                Some(Some(FieldValue::Text(r.req_type.to_string())))
            }
            (Artifact::Requirement(r), "priority") => {
                Some(Some(FieldValue::Text(r.priority.to_string())))
            }
            (Artifact::Requirement(r), "status") => {
                Some(Some(FieldValue::Text(r.status.to_string())))
            }
            (Artifact::Requirement(r), "source_document") => Some(optional_text(&r.source_document)),
            (Artifact::Requirement(r), "standards") => {
                Some(Some(FieldValue::List(r.standards.clone())))
            }
            (Artifact::TestCase(t), "title") => Some(Some(FieldValue::Text(t.title.clone()))),
            (Artifact::TestCase(t), "text") | (Artifact::TestCase(t), "description") => {
                Some(Some(FieldValue::Text(t.description.clone())))
            }
            (Artifact::TestCase(t), "priority") => {
                Some(Some(FieldValue::Text(t.priority.to_string())))
            }
            (Artifact::TestCase(t), "preconditions") => Some(optional_text(&t.preconditions)),
            (Artifact::TestCase(t), "postconditions") => Some(optional_text(&t.postconditions)),
            (Artifact::TestCase(t), "compliance_tags") => {
                Some(Some(FieldValue::List(t.compliance_tags.clone())))
            }
            (Artifact::TestCase(t), "steps") => Some(Some(FieldValue::List(
                t.steps.iter().map(|s| s.action.clone()).collect(),
            ))),
            (Artifact::TestCase(t), "expected_results") => Some(Some(FieldValue::List(
                t.steps.iter().map(|s| s.expected.clone()).collect(),
            ))),
            _ => None,
        };

        match builtin {
            Some(value) => value,
            None => self.metadata().get(name).map(|v| FieldValue::Text(v.clone())),
        }
    }
}

/// Outcome of evaluating one rule against one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Partial,
    NotApplicable,
}

impl Outcome {
    /// Score contribution; `None` means excluded from the denominator
    pub fn value(self) -> Option<f64> {
        match self {
            Outcome::Pass => Some(1.0),
            Outcome::Partial => Some(0.5),
            Outcome::Fail => Some(0.0),
            Outcome::NotApplicable => None,
        }
    }

    pub fn is_applicable(self) -> bool {
        self != Outcome::NotApplicable
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail => write!(f, "fail"),
            Outcome::Partial => write!(f, "partial"),
            Outcome::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

/// Risk levels for rules, ordered low to critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Compliance level of an assessment.
///
/// Variants are declared worst-first so the derived `Ord` makes the aggregate
/// a plain `min`. `NotAssessed` sits between non-compliant and partial: no
/// evidence is better than failing evidence but never counts as compliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    NonCompliant,
    NotAssessed,
    PartiallyCompliant,
    Compliant,
}

impl ComplianceLevel {
    /// Worst-standard-wins aggregation. No levels yields `NotAssessed`.
    pub fn aggregate(levels: impl IntoIterator<Item = ComplianceLevel>) -> ComplianceLevel {
        levels
            .into_iter()
            .min()
            .unwrap_or(ComplianceLevel::NotAssessed)
    }
}

impl std::fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceLevel::NonCompliant => write!(f, "non_compliant"),
            ComplianceLevel::NotAssessed => write!(f, "not_assessed"),
            ComplianceLevel::PartiallyCompliant => write!(f, "partially_compliant"),
            ComplianceLevel::Compliant => write!(f, "compliant"),
        }
    }
}

/// The outcome of evaluating one rule against one artifact version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub artifact_id: String,
    pub artifact_version: u32,
    pub rule_id: String,
    pub rule_version: u32,
    pub standard: String,
    #[serde(default)]
    pub standard_version: String,
    pub outcome: Outcome,
    pub evidence: String,
    #[serde(default)]
    pub annotation: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Finding {
    /// Same finding content, ignoring the evaluation timestamp
    pub fn same_result(&self, other: &Finding) -> bool {
        self.id == other.id && self.outcome == other.outcome && self.evidence == other.evidence
    }
}

/// Summary of findings by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub pass: usize,
    pub fail: usize,
    pub partial: usize,
    pub not_applicable: usize,
    pub total: usize,
}

impl FindingsSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for f in findings {
            match f.outcome {
                Outcome::Pass => summary.pass += 1,
                Outcome::Fail => summary.fail += 1,
                Outcome::Partial => summary.partial += 1,
                Outcome::NotApplicable => summary.not_applicable += 1,
            }
            summary.total += 1;
        }
        summary
    }

    pub fn applicable(&self) -> usize {
        self.total - self.not_applicable
    }
}

/// A named, versioned rule set reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StandardRef {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for StandardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Remediation advice derived from failing mandatory rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rule_id: String,
    pub standard: String,
    pub risk: RiskLevel,
    pub remediation: String,
    /// Artifacts whose findings triggered this recommendation, sorted
    pub artifact_ids: Vec<String>,
}

/// Result of assessing one scope against one standard.
///
/// Read-only once recorded in the ledger; a later assessment of the same
/// scope and standard points back at it through `supersedes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Assigned by the ledger when the assessment is recorded
    #[serde(default)]
    pub id: String,
    /// Sorted artifact ids
    pub scope: Vec<String>,
    pub scope_hash: String,
    pub standard: StandardRef,
    /// Artifact versions observed at evaluation time
    pub artifact_versions: BTreeMap<String, u32>,
    pub findings: Vec<Finding>,
    pub summary: FindingsSummary,
    /// Weighted score in [0, 1]; `None` when nothing was applicable
    pub score: Option<f64>,
    pub level: ComplianceLevel,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
    pub graph_revision: u64,
    #[serde(default)]
    pub supersedes: Option<String>,
}

impl Assessment {
    pub fn findings_for<'a>(&'a self, artifact_id: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings
            .iter()
            .filter(move |f| f.artifact_id == artifact_id)
    }

    pub fn covers(&self, artifact_id: &str) -> bool {
        self.scope.binary_search_by(|s| s.as_str().cmp(artifact_id)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_id_is_stable() {
        let a = deterministic_finding_id("REQ-1", 1, "HIPAA_001", 1, Outcome::Fail, "no match");
        let b = deterministic_finding_id("REQ-1", 1, "HIPAA_001", 1, Outcome::Fail, "no match");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = deterministic_finding_id("REQ-1", 2, "HIPAA_001", 1, Outcome::Fail, "no match");
        assert_ne!(a, c);
    }

    #[test]
    fn test_scope_hash_ignores_order_and_duplicates() {
        let a = vec!["R2".to_string(), "R1".to_string()];
        let b = vec!["R1".to_string(), "R2".to_string(), "R1".to_string()];
        assert_eq!(scope_hash(&a), scope_hash(&b));
    }

    #[test]
    fn test_compliance_level_order() {
        assert!(ComplianceLevel::NonCompliant < ComplianceLevel::NotAssessed);
        assert!(ComplianceLevel::NotAssessed < ComplianceLevel::PartiallyCompliant);
        assert!(ComplianceLevel::PartiallyCompliant < ComplianceLevel::Compliant);
        assert_eq!(
            ComplianceLevel::aggregate([ComplianceLevel::Compliant, ComplianceLevel::NonCompliant]),
            ComplianceLevel::NonCompliant
        );
        assert_eq!(ComplianceLevel::aggregate([]), ComplianceLevel::NotAssessed);
    }

    #[test]
    fn test_requirement_validation() {
        assert!(Requirement::new("REQ-1", "Login", "The system shall log in").validate().is_ok());
        assert!(Requirement::new("REQ 1", "Login", "text").validate().is_err());
        assert!(Requirement::new("REQ-1", "Login", "   ").validate().is_err());
    }

    #[test]
    fn test_test_case_validation() {
        let tc = TestCase::new("TC-1", "Login works");
        assert!(tc.validate().is_err(), "no steps");
        let tc = tc.with_step("Open login page", "Page shown");
        assert!(tc.validate().is_ok());
    }

    #[test]
    fn test_field_resolution() {
        let req = Artifact::Requirement(
            Requirement::new("REQ-1", "Login", "text")
                .with_type(RequirementType::Safety)
                .with_standard("IEC 62304")
                .with_metadata("jira", "PROJ-12")
                .with_metadata("safety_class", "B"),
        );
        assert_eq!(req.field("type"), Some(FieldValue::Text("safety".into())));
        assert_eq!(
            req.field("standards"),
            Some(FieldValue::List(vec!["IEC 62304".into()]))
        );
        assert_eq!(req.field("metadata.jira"), Some(FieldValue::Text("PROJ-12".into())));
        // unknown bare name falls back to metadata
        assert_eq!(req.field("safety_class"), Some(FieldValue::Text("B".into())));
        assert_eq!(req.field("source_document"), None);
        assert_eq!(req.field("nonexistent"), None);
    }

    #[test]
    fn test_requirement_json_defaults() {
        let json = r#"{"id": "REQ-7", "text": "Data shall be encrypted at rest", "type": "security"}"#;
        let req: Requirement = serde_json::from_str(json).unwrap();
        assert_eq!(req.version, 1);
        assert_eq!(req.req_type, RequirementType::Security);
        assert_eq!(req.status, RequirementStatus::Draft);
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let make = |outcome| Finding {
            id: String::new(),
            artifact_id: "R".into(),
            artifact_version: 1,
            rule_id: "X".into(),
            rule_version: 1,
            standard: "S".into(),
            standard_version: "1".into(),
            outcome,
            evidence: String::new(),
            annotation: None,
            evaluated_at: Utc::now(),
        };
        let findings = vec![
            make(Outcome::Pass),
            make(Outcome::Fail),
            make(Outcome::NotApplicable),
        ];
        let summary = FindingsSummary::from_findings(&findings);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.applicable(), 2);
    }
}
