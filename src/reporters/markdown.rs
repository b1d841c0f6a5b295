//! Markdown reporter for GitHub-flavored Markdown output
//!
//! Generates reports suitable for:
//! - Audit evidence attachments
//! - Pull request comments
//! - Wikis and quality manuals

use super::{Report, TraceabilityMatrix};
use crate::models::ComplianceLevel;
use anyhow::Result;

/// Matrices wider than this are listed instead of drawn as a grid
const MAX_MATRIX_COLUMNS: usize = 12;

/// Render report as GitHub-flavored Markdown
pub fn render(report: &Report) -> Result<String> {
    let mut md = String::new();

    md.push_str(&render_header(report));
    md.push('\n');

    md.push_str(&render_standards(report));
    md.push('\n');

    md.push_str(&render_recommendations(report));
    md.push('\n');

    md.push_str(&render_matrix(&report.content.matrix));
    md.push('\n');

    if !report.content.warnings.is_empty() {
        md.push_str(&render_warnings(report));
        md.push('\n');
    }

    md.push_str(&render_footer(report));

    Ok(md)
}

fn level_badge(level: ComplianceLevel) -> &'static str {
    match level {
        ComplianceLevel::Compliant => "✅ Compliant",
        ComplianceLevel::PartiallyCompliant => "⚠️ Partially compliant",
        ComplianceLevel::NonCompliant => "❌ Non-compliant",
        ComplianceLevel::NotAssessed => "➖ Not assessed",
    }
}

fn render_header(report: &Report) -> String {
    let timestamp = report.generated_at.format("%Y-%m-%d %H:%M:%S UTC");

    format!(
        r#"# Compliance Report

**Overall: {}** | **Standards: {}** | **Graph revision: {}**

Generated: {}
"#,
        level_badge(report.content.aggregate),
        report.content.standards.len(),
        report.content.graph_revision,
        timestamp
    )
}

fn render_standards(report: &Report) -> String {
    if report.content.standards.is_empty() {
        return "## Standards\n\nNo assessments recorded.\n".to_string();
    }

    let mut out = String::from(
        r#"## Standards

| Standard | Version | Score | Level | Pass | Fail | Partial | N/A |
|----------|---------|-------|-------|------|------|---------|-----|
"#,
    );

    for s in &report.content.standards {
        let score = s
            .score
            .map(|v| format!("{:.1}%", v * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let stale = if s.stale { " (stale)" } else { "" };
        out.push_str(&format!(
            "| {}{} | {} | {} | {} | {} | {} | {} | {} |\n",
            s.standard,
            stale,
            s.version,
            score,
            level_badge(s.level),
            s.findings.pass,
            s.findings.fail,
            s.findings.partial,
            s.findings.not_applicable
        ));
    }
    out
}

fn render_recommendations(report: &Report) -> String {
    let recs = &report.content.recommendations;
    if recs.is_empty() {
        return "## Recommendations\n\nNo mandatory rule failures. 🎉\n".to_string();
    }

    let mut out = String::from("## Recommendations\n\n");
    for rec in recs {
        out.push_str(&format!(
            "{}. **[{}]** {} ({} `{}`)\n   - Affects: {}\n",
            rec.rank,
            rec.risk.to_string().to_uppercase(),
            rec.remediation,
            rec.standard,
            rec.rule_id,
            rec.artifact_ids.join(", ")
        ));
    }
    out
}

fn render_matrix(matrix: &TraceabilityMatrix) -> String {
    let mut out = format!(
        r#"## Traceability Matrix

| Metric | Value |
|--------|-------|
| **Requirement coverage** | {:.1}% |
| **Requirements with tests** | {} / {} |
| **Test cases with requirements** | {} / {} |

"#,
        matrix.coverage_percentage,
        matrix.requirements_with_tests,
        matrix.requirements.len(),
        matrix.test_cases_with_requirements,
        matrix.test_cases.len()
    );

    if matrix.requirements.is_empty() {
        out.push_str("No requirements in scope.\n");
        return out;
    }

    if matrix.test_cases.len() <= MAX_MATRIX_COLUMNS {
        out.push_str(&format!("| Requirement | {} |\n", matrix.test_cases.join(" | ")));
        out.push_str(&format!("|---|{}\n", "---|".repeat(matrix.test_cases.len())));
        for (req, row) in matrix.requirements.iter().zip(&matrix.cells) {
            let cells: Vec<&str> = row.iter().map(|&c| if c { "✓" } else { " " }).collect();
            out.push_str(&format!("| {} | {} |\n", req, cells.join(" | ")));
        }
    } else {
        for (req, row) in matrix.requirements.iter().zip(&matrix.cells) {
            let tests: Vec<&str> = matrix
                .test_cases
                .iter()
                .zip(row)
                .filter(|(_, c)| **c)
                .map(|(t, _)| t.as_str())
                .collect();
            out.push_str(&format!("- **{}**: {}\n", req, tests.join(", ")));
        }
    }

    if !matrix.orphaned_requirements.is_empty() {
        out.push_str(&format!(
            "\n**Requirements without tests:** {}\n",
            matrix.orphaned_requirements.join(", ")
        ));
    }
    if !matrix.orphaned_test_cases.is_empty() {
        out.push_str(&format!(
            "\n**Test cases without requirements:** {}\n",
            matrix.orphaned_test_cases.join(", ")
        ));
    }
    out
}

fn render_warnings(report: &Report) -> String {
    let mut out = String::from("## ⚠️ Stale Assessments\n\n");
    for w in &report.content.warnings {
        let changes: Vec<String> = w
            .changes
            .iter()
            .map(|c| {
                let from = c.assessed_version.map_or("-".to_string(), |v| format!("v{v}"));
                let to = c.current_version.map_or("removed".to_string(), |v| format!("v{v}"));
                format!("{} ({} → {})", c.artifact_id, from, to)
            })
            .collect();
        out.push_str(&format!(
            "- `{}` ({}): {}\n",
            w.assessment_id,
            w.standard,
            changes.join(", ")
        ));
    }
    out
}

fn render_footer(report: &Report) -> String {
    format!(
        "---\n\n*Generated by regtrace · content hash `{}`*\n",
        &report.content_hash[..report.content_hash.len().min(16)]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_markdown_sections() {
        let report = test_report();
        let md = render(&report).expect("render markdown");
        assert!(md.starts_with("# Compliance Report"));
        assert!(md.contains("## Standards"));
        assert!(md.contains("❌ Non-compliant"));
        assert!(md.contains("| R1 | ✓ |"));
        assert!(md.contains("Require an audit trail"));
    }

    #[test]
    fn test_markdown_stale_section() {
        let report = crate::reporters::tests::stale_report();
        let md = render(&report).expect("render markdown");
        assert!(md.contains("Stale Assessments"));
        assert!(md.contains("R1 (v1 → v2)"));
    }
}
