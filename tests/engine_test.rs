//! End-to-end tests through the library API
//!
//! A workspace configured with a custom rule pack carrying two versions of
//! one standard: assess, persist, reopen, re-assess.

use regtrace::assessor::{ComplianceAssessor, StandardSelector};
use regtrace::models::{ComplianceLevel, Outcome, Requirement, TestCase};
use regtrace::storage::Workspace;

const PACK: &str = r#"
[[standard]]
name = "ACME"
version = "1.0"

[[standard.rules]]
id = "ACME_001"
title = "Audit trail"
category = "audit"
mandatory = true
risk = "high"
target = "requirement"
remediation = "Record access in an audit trail"
pattern = { kind = "keywords", any_of = ["audit trail"] }

[[standard]]
name = "ACME"
version = "2.0"

[[standard.rules]]
id = "ACME_001"
title = "Audit trail"
category = "audit"
mandatory = true
risk = "high"
target = "requirement"
remediation = "Record access in an audit trail"
pattern = { kind = "keywords", any_of = ["audit trail"] }

[[standard.rules]]
id = "ACME_002"
title = "Encryption"
category = "crypto"
mandatory = true
risk = "critical"
target = "requirement"
remediation = "Require encryption at rest"
pattern = { kind = "keywords", any_of = ["encrypt", "encrypted"] }
"#;

const CONFIG: &str = r#"
[rules]
builtin = false
packs = ["acme.toml"]
"#;

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("acme.toml"), PACK).unwrap();
    std::fs::write(dir.path().join("regtrace.toml"), CONFIG).unwrap();
    dir
}

#[test]
fn test_pinned_versions_and_persistence() {
    let dir = setup();

    let first_ids = {
        let ws = Workspace::open(dir.path()).unwrap();
        assert_eq!(ws.rules.len(), 2);
        assert!(!ws.rules.is_known("HIPAA"));

        ws.graph
            .add_requirement(Requirement::new(
                "R1",
                "Access log",
                "Every read of a record is written to the audit trail",
            ))
            .unwrap();
        ws.graph
            .add_test_case(
                TestCase::new("T1", "Audit trail test").with_step("Read a record", "Entry logged"),
                &["R1"],
            )
            .unwrap();

        let run = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
            .assess(
                &["R1", "T1"],
                &[StandardSelector::latest("ACME"), StandardSelector::parse("ACME@1.0")],
            )
            .unwrap();
        assert!(run.failures.is_empty());

        let v2 = run
            .assessments
            .iter()
            .find(|a| a.standard.version == "2.0")
            .unwrap();
        let v1 = run
            .assessments
            .iter()
            .find(|a| a.standard.version == "1.0")
            .unwrap();

        // Test-case-only scope entries are not applicable to requirement rules
        assert_eq!(v1.level, ComplianceLevel::Compliant);
        assert_eq!(v1.summary.not_applicable, 1);
        // 2 * pass + 2 * fail over weight 4
        assert_eq!(v2.score, Some(0.5));
        assert_eq!(v2.level, ComplianceLevel::NonCompliant);
        assert_eq!(v2.recommendations.len(), 1);
        assert_eq!(v2.recommendations[0].rule_id, "ACME_002");
        assert_eq!(run.aggregate, ComplianceLevel::NonCompliant);

        // Both versions share the (scope, standard) chain in selector order
        assert_eq!(v1.supersedes.as_deref(), Some(v2.id.as_str()));

        ws.save().unwrap();
        vec![v1.id.clone(), v2.id.clone()]
    };

    // Reopen: rules, graph and ledger come back from the database
    let ws = Workspace::open(dir.path()).unwrap();
    assert_eq!(ws.rules.len(), 2);
    assert_eq!(ws.graph.revision(), 2);
    assert_eq!(ws.ledger.len(), 2);
    for id in &first_ids {
        assert!(ws.ledger.get(id).is_some());
    }

    let store = ws.store().unwrap();
    let r1_findings = store.findings_for("R1", 1).unwrap();
    assert!(r1_findings
        .iter()
        .any(|f| f.rule_id == "ACME_002" && f.outcome == Outcome::Fail));

    // Re-assessing the same scope supersedes the earlier record
    let rerun = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
        .assess(&["T1", "R1"], &[StandardSelector::pinned("ACME", "1.0")])
        .unwrap();
    let again = &rerun.assessments[0];
    assert_eq!(again.supersedes.as_deref(), Some(first_ids[0].as_str()));
    assert_eq!(ws.ledger.len(), 3);
    assert_eq!(ws.ledger.latest_all().len(), 1);
}

#[test]
fn test_revision_makes_assessment_stale() {
    let dir = setup();
    let ws = Workspace::open(dir.path()).unwrap();
    ws.graph
        .add_requirement(Requirement::new("R1", "Crypto", "Data is encrypted at rest"))
        .unwrap();

    let run = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
        .assess(&["R1"], &[StandardSelector::latest("ACME")])
        .unwrap();
    let assessment = &run.assessments[0];
    assert!(!regtrace::analysis::is_stale(assessment, &*ws.graph.snapshot()));

    ws.graph
        .revise_requirement(Requirement::new(
            "R1",
            "Crypto",
            "Data is encrypted at rest and every access lands in the audit trail",
        ))
        .unwrap();

    let snapshot = ws.graph.snapshot();
    let warning = regtrace::analysis::check_staleness(assessment, &*snapshot).unwrap();
    assert_eq!(warning.changes.len(), 1);
    assert_eq!(warning.changes[0].assessed_version, Some(1));
    assert_eq!(warning.changes[0].current_version, Some(2));

    // The revised text passes both rules
    let rerun = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
        .assess(&["R1"], &[StandardSelector::latest("ACME")])
        .unwrap();
    assert_eq!(rerun.assessments[0].level, ComplianceLevel::Compliant);
    assert!(!regtrace::analysis::is_stale(&rerun.assessments[0], &*snapshot));
}

#[test]
fn test_unknown_standard_is_reported_not_fatal() {
    let dir = setup();
    let ws = Workspace::open(dir.path()).unwrap();
    ws.graph
        .add_requirement(Requirement::new("R1", "Log", "Keep an audit trail"))
        .unwrap();

    let run = ComplianceAssessor::new(&ws.graph, &ws.rules, &ws.ledger, &ws.config)
        .assess(
            &["R1"],
            &[StandardSelector::latest("ACME"), StandardSelector::pinned("ACME", "9.9")],
        )
        .unwrap();
    assert_eq!(run.assessments.len(), 1);
    assert_eq!(run.failures.len(), 1);
    assert!(run.failures[0].to_string().contains("9.9"));
}
