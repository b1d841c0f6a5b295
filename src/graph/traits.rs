//! Read-only traceability queries
//!
//! Analysis and reporting code depends on this trait rather than on the
//! concrete graph state, so they work over any point-in-time view.

use super::{LinkRelation, TraceLink};
use crate::models::{Artifact, Requirement, TestCase};
use std::collections::BTreeSet;

pub trait TraceQuery: Send + Sync {
    /// Graph revision this view reflects
    fn revision(&self) -> u64;

    /// Current version of an artifact
    fn artifact(&self, id: &str) -> Option<&Artifact>;

    /// All requirements, sorted by id
    fn requirements(&self) -> Vec<&Requirement>;

    /// All test cases, sorted by id
    fn test_cases(&self) -> Vec<&TestCase>;

    /// Ids of test cases with a `verifies` link to the requirement, sorted
    fn verifying_tests(&self, requirement_id: &str) -> Vec<String>;

    /// Ids of requirements a test case verifies, sorted
    fn verified_requirements(&self, test_case_id: &str) -> Vec<String>;

    /// Links touching an artifact in either direction
    fn links_of(&self, id: &str) -> Vec<&TraceLink>;

    /// Transitive closure of artifacts reaching `id` through incoming edges
    /// of the given relations
    fn dependents(&self, id: &str, relations: &[LinkRelation]) -> BTreeSet<String>;

    fn requirement(&self, id: &str) -> Option<&Requirement> {
        self.artifact(id).and_then(Artifact::as_requirement)
    }

    fn test_case(&self, id: &str) -> Option<&TestCase> {
        self.artifact(id).and_then(Artifact::as_test_case)
    }
}
