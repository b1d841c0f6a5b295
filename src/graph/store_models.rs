use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Artifact, Requirement, TestCase};

/// Relation carried by a traceability link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LinkRelation {
    /// Test case → requirement
    Verifies,
    Implements,
    /// Must stay acyclic
    DerivesFrom,
    RelatesTo,
}

impl std::fmt::Display for LinkRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkRelation::Verifies => write!(f, "verifies"),
            LinkRelation::Implements => write!(f, "implements"),
            LinkRelation::DerivesFrom => write!(f, "derivesFrom"),
            LinkRelation::RelatesTo => write!(f, "relatesTo"),
        }
    }
}

impl std::str::FromStr for LinkRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verifies" => Ok(LinkRelation::Verifies),
            "implements" => Ok(LinkRelation::Implements),
            "derivesfrom" | "derives_from" | "derives-from" => Ok(LinkRelation::DerivesFrom),
            "relatesto" | "relates_to" | "relates-to" => Ok(LinkRelation::RelatesTo),
            other => Err(format!("unknown link relation: {other}")),
        }
    }
}

/// A directed traceability edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceLink {
    pub source: String,
    pub target: String,
    pub relation: LinkRelation,
    pub created_at: DateTime<Utc>,
}

impl TraceLink {
    pub fn new(source: &str, target: &str, relation: LinkRelation) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            relation,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> (&str, &str, LinkRelation) {
        (&self.source, &self.target, self.relation)
    }
}

/// A graph node: the current version of an artifact plus the graph
/// revision that last changed it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactNode {
    pub artifact: Artifact,
    pub revision: u64,
}

/// Link record in an import bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkSpec {
    pub source: String,
    pub target: String,
    pub relation: LinkRelation,
}

/// Test case as ingested, with its `verifies` targets attached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCaseRecord {
    #[serde(flatten)]
    pub test_case: TestCase,
    #[serde(default)]
    pub verifies: Vec<String>,
}

/// Pre-extracted artifacts delivered by an upstream source (document
/// extraction, AI generation, ALM export)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactBundle {
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseRecord>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

impl ArtifactBundle {
    /// Every artifact id the bundle touches
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .requirements
            .iter()
            .map(|r| r.id.clone())
            .chain(self.test_cases.iter().map(|t| t.test_case.id.clone()))
            .chain(self.test_cases.iter().flat_map(|t| t.verifies.iter().cloned()))
            .chain(
                self.links
                    .iter()
                    .flat_map(|l| [l.source.clone(), l.target.clone()]),
            )
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: Vec<String>,
    pub revised: Vec<String>,
    pub unchanged: Vec<String>,
    pub links_added: usize,
}

/// Serializable form of the whole graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub revision: u64,
    pub nodes: Vec<ArtifactNode>,
    /// Prior versions, oldest first per artifact
    pub history: Vec<Artifact>,
    pub links: Vec<TraceLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_wire_names() {
        assert_eq!(
            serde_json::to_string(&LinkRelation::DerivesFrom).unwrap(),
            "\"derivesFrom\""
        );
        assert_eq!("relates_to".parse::<LinkRelation>(), Ok(LinkRelation::RelatesTo));
        assert!("blocks".parse::<LinkRelation>().is_err());
    }

    #[test]
    fn test_bundle_parsing() {
        let json = r#"{
            "requirements": [{"id": "REQ-1", "title": "PHI", "text": "Patient data shall be encrypted"}],
            "test_cases": [{
                "id": "TC-1",
                "title": "Encryption test",
                "steps": [{"action": "Inspect storage", "expected": "Ciphertext only"}],
                "verifies": ["REQ-1"]
            }],
            "links": []
        }"#;
        let bundle: ArtifactBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.test_cases[0].verifies, vec!["REQ-1"]);
        assert_eq!(bundle.test_cases[0].test_case.steps.len(), 1);
        assert_eq!(bundle.ids(), vec!["REQ-1", "TC-1"]);
    }
}
