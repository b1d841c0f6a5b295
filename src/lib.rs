//! regtrace - requirements traceability and compliance assessment
//!
//! Keeps a versioned graph of requirements and test cases, evaluates them
//! against regulatory rule sets and records every assessment in an
//! append-only ledger.
//!
//! ```no_run
//! use regtrace::assessor::{AssessmentLedger, ComplianceAssessor, StandardSelector};
//! use regtrace::config::ProjectConfig;
//! use regtrace::graph::ArtifactGraph;
//! use regtrace::models::{Requirement, TestCase};
//! use regtrace::rules::RuleStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let graph = ArtifactGraph::new();
//! graph.add_requirement(Requirement::new("R1", "Audit", "Access to PHI shall be logged"))?;
//! graph.add_test_case(
//!     TestCase::new("T1", "Audit log test").with_step("Open a record", "Access is logged"),
//!     &["R1"],
//! )?;
//!
//! let rules = RuleStore::with_builtin()?;
//! let ledger = AssessmentLedger::new();
//! let config = ProjectConfig::default();
//! let run = ComplianceAssessor::new(&graph, &rules, &ledger, &config)
//!     .assess(&["R1", "T1"], &[StandardSelector::latest("HIPAA")])?;
//! println!("{}", run.aggregate);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod assessor;
pub mod cli;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod graph;
pub mod models;
pub mod reporters;
pub mod rules;
pub mod scoring;
pub mod storage;
