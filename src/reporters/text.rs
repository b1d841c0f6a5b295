//! Text (terminal) reporter with colors and formatting

use super::Report;
use crate::models::{ComplianceLevel, RiskLevel};
use anyhow::Result;

/// Level colors (ANSI escape codes)
fn level_color(level: ComplianceLevel) -> &'static str {
    match level {
        ComplianceLevel::Compliant => "\x1b[32m",          // Green
        ComplianceLevel::PartiallyCompliant => "\x1b[33m", // Yellow
        ComplianceLevel::NonCompliant => "\x1b[31m",       // Red
        ComplianceLevel::NotAssessed => "\x1b[90m",        // Gray
    }
}

/// Risk colors
fn risk_color(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Critical => "\x1b[31m",
        RiskLevel::High => "\x1b[91m",
        RiskLevel::Medium => "\x1b[33m",
        RiskLevel::Low => "\x1b[34m",
    }
}

/// Reset ANSI color
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Recommendations shown before truncating
const MAX_RECOMMENDATIONS: usize = 10;

fn risk_tag(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Critical => "[C]",
        RiskLevel::High => "[H]",
        RiskLevel::Medium => "[M]",
        RiskLevel::Low => "[L]",
    }
}

/// Render report as formatted terminal output
pub fn render(report: &Report) -> Result<String> {
    let c = &report.content;
    let mut out = String::new();

    let level_c = level_color(c.aggregate);
    out.push_str(&format!("\n{BOLD}Compliance Report{RESET}\n"));
    out.push_str(&format!(
        "{DIM}──────────────────────────────────────{RESET}\n"
    ));
    out.push_str(&format!(
        "Overall: {level_c}{BOLD}{}{RESET}  Standards: {}  Graph revision: {}\n\n",
        c.aggregate,
        c.standards.len(),
        c.graph_revision
    ));

    // Per-standard table
    out.push_str(&format!("{BOLD}STANDARDS{RESET}\n"));
    if c.standards.is_empty() {
        out.push_str(&format!("  {DIM}no assessments recorded{RESET}\n"));
    }
    for s in &c.standards {
        let score = s
            .score
            .map(|v| format!("{:>5.1}%", v * 100.0))
            .unwrap_or_else(|| "  n/a ".to_string());
        let stale = if s.stale {
            format!("  \x1b[33mstale{RESET}")
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  {:<24} {DIM}v{:<8}{RESET} {}  {}{:<20}{RESET} {DIM}{} pass / {} fail / {} partial{RESET}{}\n",
            s.standard,
            s.version,
            score,
            level_color(s.level),
            s.level,
            s.findings.pass,
            s.findings.fail,
            s.findings.partial,
            stale
        ));
    }
    out.push('\n');

    // Recommendations
    if !c.recommendations.is_empty() {
        out.push_str(&format!(
            "{BOLD}RECOMMENDATIONS{RESET} ({} total)\n",
            c.recommendations.len()
        ));
        for rec in c.recommendations.iter().take(MAX_RECOMMENDATIONS) {
            out.push_str(&format!(
                "  {DIM}{:>3}{RESET}  {}{}{RESET}  {}  {DIM}{} · {}{RESET}\n",
                rec.rank,
                risk_color(rec.risk),
                risk_tag(rec.risk),
                rec.remediation,
                rec.rule_id,
                rec.artifact_ids.join(", ")
            ));
        }
        let remaining = c.recommendations.len().saturating_sub(MAX_RECOMMENDATIONS);
        if remaining > 0 {
            out.push_str(&format!(
                "\n  {DIM}...and {} more (use --format markdown for the full list){RESET}\n",
                remaining
            ));
        }
        out.push('\n');
    }

    // Traceability
    let m = &c.matrix;
    out.push_str(&format!("{BOLD}TRACEABILITY{RESET}\n"));
    out.push_str(&format!(
        "  Coverage: {BOLD}{:.1}%{RESET}  Requirements with tests: {}/{}  Test cases with requirements: {}/{}\n",
        m.coverage_percentage,
        m.requirements_with_tests,
        m.requirements.len(),
        m.test_cases_with_requirements,
        m.test_cases.len()
    ));
    if !m.orphaned_requirements.is_empty() {
        out.push_str(&format!(
            "  {DIM}Untested:{RESET} {}\n",
            m.orphaned_requirements.join(", ")
        ));
    }
    out.push('\n');

    // Stale warnings
    for w in &c.warnings {
        out.push_str(&format!("\x1b[33m⚠ {}{RESET}\n", w));
    }

    out.push_str(&format!(
        "{DIM}content hash {}{RESET}\n",
        &report.content_hash[..report.content_hash.len().min(16)]
    ));

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::{stale_report, test_report};

    #[test]
    fn test_text_render_contains_sections() {
        let report = test_report();
        let out = render(&report).expect("render text");
        assert!(out.contains("Compliance Report"));
        assert!(out.contains("STANDARDS"));
        assert!(out.contains("RECOMMENDATIONS"));
        assert!(out.contains("non_compliant"));
        assert!(out.contains("TRACEABILITY"));
    }

    #[test]
    fn test_text_render_stale_warning() {
        let out = render(&stale_report()).expect("render text");
        assert!(out.contains("is stale"));
    }
}
