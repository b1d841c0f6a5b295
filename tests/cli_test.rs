//! CLI contract tests
//!
//! Runs the regtrace binary against a fresh workspace per test:
//! init, import, assess, report, check and their exit codes.

use std::path::Path;
use std::process::Command;

fn regtrace_bin() -> String {
    env!("CARGO_BIN_EXE_regtrace").to_string()
}

const BUNDLE: &str = r#"{
  "requirements": [
    {
      "id": "R1",
      "title": "PHI encryption",
      "text": "The system shall encrypt all PHI at rest and log every access in an audit trail",
      "standards": ["HIPAA"]
    },
    {
      "id": "R2",
      "title": "Export",
      "text": "Users can export their reports as PDF"
    }
  ],
  "test_cases": [
    {
      "id": "T1",
      "title": "PHI encryption test",
      "description": "Verify PHI is encrypted at rest",
      "steps": [{ "action": "Inspect the stored record", "expected": "Ciphertext only" }],
      "compliance_tags": ["phi_protection"],
      "verifies": ["R1"]
    }
  ]
}"#;

fn run(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(regtrace_bin())
        .args(args)
        .arg(dir)
        .output()
        .expect("Failed to run regtrace");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Initialized workspace with the bundle imported
fn setup_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["init"]);
    assert_eq!(code, 0, "init failed: {stderr}");

    let bundle = dir.path().join("bundle.json");
    std::fs::write(&bundle, BUNDLE).unwrap();
    let (code, stdout, stderr) = run(
        dir.path(),
        &["import", "--file", bundle.to_str().unwrap()],
    );
    assert_eq!(code, 0, "import failed: {stderr}");
    assert!(stdout.contains("3 added"), "unexpected import output: {stdout}");
    dir
}

#[test]
fn test_init_creates_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run(dir.path(), &["init"]);
    assert_eq!(code, 0);
    assert!(dir.path().join(".regtrace").join("engine.redb").exists());
    assert!(dir.path().join("regtrace.toml").exists());

    // Second init keeps the existing files
    let (code, stdout, _) = run(dir.path(), &["init"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Already initialized"));
}

#[test]
fn test_commands_require_init() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["assess"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("regtrace init"), "stderr: {stderr}");
}

#[test]
fn test_reimport_is_idempotent() {
    let dir = setup_workspace();
    let bundle = dir.path().join("bundle.json");
    let (code, stdout, _) = run(
        dir.path(),
        &["import", "--file", bundle.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("0 added"), "stdout: {stdout}");
    assert!(stdout.contains("3 unchanged"), "stdout: {stdout}");
}

#[test]
fn test_standards_json_lists_builtins() {
    let dir = setup_workspace();
    let (code, stdout, _) = run(dir.path(), &["standards", "--json"]);
    assert_eq!(code, 0);
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    let names: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"HIPAA"));
    assert!(names.contains(&"GDPR"));
}

#[test]
fn test_assess_then_report_json() {
    let dir = setup_workspace();
    let (code, stdout, stderr) = run(
        dir.path(),
        &["assess", "--standard", "HIPAA", "--format", "json"],
    );
    assert_eq!(code, 0, "assess failed: {stderr}");
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    let assessments = v["assessments"].as_array().unwrap();
    assert_eq!(assessments.len(), 1);
    assert_eq!(assessments[0]["standard"]["name"], "HIPAA");
    assert_eq!(assessments[0]["scope"].as_array().unwrap().len(), 3);

    // The assessment survives the process and shows up in the report
    let (code, stdout, _) = run(dir.path(), &["report", "--format", "json"]);
    assert_eq!(code, 0);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    assert_eq!(report["standards"].as_array().unwrap().len(), 1);
    assert_eq!(report["content_hash"].as_str().unwrap().len(), 64);
    assert_eq!(report["matrix"]["requirements"].as_array().unwrap().len(), 2);
    assert_eq!(report["matrix"]["orphaned_requirements"][0], "R2");
}

#[test]
fn test_report_written_to_file() {
    let dir = setup_workspace();
    let (code, _, _) = run(dir.path(), &["assess", "--standard", "GDPR"]);
    assert_eq!(code, 0);

    let out = dir.path().join("audit.md");
    let (code, _, _) = run(
        dir.path(),
        &["report", "--format", "markdown", "-o", out.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    let md = std::fs::read_to_string(&out).unwrap();
    assert!(md.starts_with("# Compliance Report"));
    assert!(md.contains("GDPR"));
}

#[test]
fn test_fail_on_exit_code() {
    let dir = setup_workspace();
    // R2 says nothing about PHI, so mandatory HIPAA_001 fails on it
    let (code, _, stderr) = run(dir.path(), &["assess", "--fail-on", "compliant"]);
    assert_eq!(code, 1, "stderr: {stderr}");
    assert!(stderr.contains("--fail-on"));
}

#[test]
fn test_gaps_reports_untested_requirement() {
    let dir = setup_workspace();
    let (code, stdout, _) = run(dir.path(), &["gaps", "--json"]);
    assert_eq!(code, 0);
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    assert_eq!(v["total_requirements"], 2);
    assert_eq!(v["covered_requirements"], 1);
    let gaps = v["gaps"].as_array().unwrap();
    assert!(gaps
        .iter()
        .any(|g| g["requirement_id"] == "R2" && g["kind"] == "no_verifying_tests"));
}

#[test]
fn test_gaps_filtered_by_standard() {
    let dir = setup_workspace();
    let (code, stdout, _) = run(dir.path(), &["gaps", "--standard", "HIPAA", "--json"]);
    assert_eq!(code, 0);
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    assert_eq!(v["standard"], "HIPAA");
    // R2 carries no HIPAA tag
    assert_eq!(v["total_requirements"], 1);
    assert!(v["gaps"]
        .as_array()
        .unwrap()
        .iter()
        .all(|g| g["requirement_id"] == "R1"));
}

#[test]
fn test_impact_lists_verifying_tests() {
    let dir = setup_workspace();
    let (code, stdout, _) = run(dir.path(), &["impact", "--requirement", "R1", "--json"]);
    assert_eq!(code, 0);
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("Invalid JSON");
    assert!(v["affected"].as_array().unwrap().iter().any(|id| id == "T1"));

    let (code, _, _) = run(dir.path(), &["impact", "--requirement", "NOPE"]);
    assert_ne!(code, 0);
}

#[test]
fn test_check_clean_graph() {
    let dir = setup_workspace();
    let (code, stdout, _) = run(dir.path(), &["check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Graph integrity OK"));
}

#[test]
fn test_check_flags_stale_assessment() {
    let dir = setup_workspace();
    let (code, _, _) = run(dir.path(), &["assess", "--standard", "HIPAA"]);
    assert_eq!(code, 0);

    let revised = BUNDLE.replace("Users can export their reports as PDF", "Users can export reports as CSV");
    let bundle = dir.path().join("bundle-v2.json");
    std::fs::write(&bundle, revised).unwrap();
    let (code, stdout, _) = run(
        dir.path(),
        &["import", "--file", bundle.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("Revised: R2"), "stdout: {stdout}");

    let (code, stdout, _) = run(dir.path(), &["check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("is stale"), "stdout: {stdout}");
}
