//! Assess command - evaluate artifacts against standards and record the result

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::time::Duration;

use super::open_workspace;
use crate::assessor::{AssessmentRun, ComplianceAssessor, StandardSelector};
use crate::models::{Assessment, ComplianceLevel};

/// Run the assess command
pub fn run(
    path: &Path,
    standards: Vec<String>,
    scope: Vec<String>,
    format: &str,
    workers: Option<usize>,
    deadline_ms: Option<u64>,
    fail_on: Option<String>,
) -> Result<()> {
    let threshold = fail_on.as_deref().map(parse_level).transpose()?;
    let workspace = open_workspace(path)?;

    let selectors = resolve_selectors(&workspace, standards);
    if selectors.is_empty() {
        anyhow::bail!("No standards registered. Add a rule pack under [rules] in regtrace.toml.");
    }

    let scope = if scope.is_empty() {
        workspace
            .graph
            .snapshot()
            .artifacts()
            .iter()
            .map(|a| a.id().to_string())
            .collect()
    } else {
        scope
    };
    if scope.is_empty() {
        anyhow::bail!("The graph is empty. Run 'regtrace import' first.");
    }

    let mut assessor = ComplianceAssessor::new(
        &workspace.graph,
        &workspace.rules,
        &workspace.ledger,
        &workspace.config,
    );
    if let Some(n) = workers {
        assessor = assessor.with_workers(n);
    }
    if let Some(ms) = deadline_ms {
        assessor = assessor.with_deadline(Duration::from_millis(ms));
    }

    let run = assessor
        .assess(&scope, &selectors)
        .context("Assessment failed")?;
    workspace.save()?;

    match format {
        "json" => print_json(&run)?,
        _ => print_text(&run),
    }

    if let Some(level) = threshold {
        if run.aggregate < level {
            eprintln!("Failing due to --fail-on={} threshold", level);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Explicit `--standard` values, then `[defaults] standards`, then the latest
/// version of every registered standard
fn resolve_selectors(
    workspace: &crate::storage::Workspace,
    standards: Vec<String>,
) -> Vec<StandardSelector> {
    let names = if standards.is_empty() {
        workspace.config.defaults.standards.clone()
    } else {
        standards
    };
    if names.is_empty() {
        return workspace
            .rules
            .latest_standards()
            .iter()
            .map(StandardSelector::from)
            .collect();
    }
    names.iter().map(|s| StandardSelector::parse(s)).collect()
}

fn parse_level(s: &str) -> Result<ComplianceLevel> {
    match s {
        "compliant" => Ok(ComplianceLevel::Compliant),
        "partially_compliant" => Ok(ComplianceLevel::PartiallyCompliant),
        "not_assessed" => Ok(ComplianceLevel::NotAssessed),
        "non_compliant" => Ok(ComplianceLevel::NonCompliant),
        other => anyhow::bail!("Unknown compliance level '{}'", other),
    }
}

fn level_style(level: ComplianceLevel) -> console::StyledObject<ComplianceLevel> {
    match level {
        ComplianceLevel::Compliant => style(level).green(),
        ComplianceLevel::PartiallyCompliant => style(level).yellow(),
        ComplianceLevel::NonCompliant => style(level).red(),
        ComplianceLevel::NotAssessed => style(level).dim(),
    }
}

fn print_text(run: &AssessmentRun) {
    println!();
    for a in &run.assessments {
        print_assessment(a);
    }
    for failure in &run.failures {
        println!("  {} {}", style("✗").red(), failure);
    }
    let timeouts = run.timeouts();
    if timeouts > 0 {
        println!(
            "  {} {} evaluation(s) hit the deadline and were recorded as failed",
            style("⚠").yellow(),
            timeouts
        );
    }
    println!(
        "\nOverall: {}",
        level_style(run.aggregate).bold()
    );
}

fn print_assessment(a: &Assessment) {
    let score = a
        .score
        .map(|s| format!("{:.1}%", s * 100.0))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "  {:<28} {:>7}  {}  {}",
        style(&a.standard).cyan(),
        score,
        level_style(a.level),
        style(format!(
            "{} pass / {} fail / {} partial / {} n/a",
            a.summary.pass, a.summary.fail, a.summary.partial, a.summary.not_applicable
        ))
        .dim()
    );
    println!("    {}", style(&a.id).dim());
    for rec in &a.recommendations {
        println!(
            "    {} {} ({})",
            style("→").yellow(),
            rec.remediation,
            rec.rule_id
        );
    }
}

fn print_json(run: &AssessmentRun) -> Result<()> {
    let failures: Vec<String> = run.failures.iter().map(|e| e.to_string()).collect();
    let out = serde_json::json!({
        "aggregate": run.aggregate,
        "assessments": run.assessments,
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("compliant").unwrap(), ComplianceLevel::Compliant);
        assert_eq!(
            parse_level("partially_compliant").unwrap(),
            ComplianceLevel::PartiallyCompliant
        );
        assert!(parse_level("great").is_err());
    }
}
