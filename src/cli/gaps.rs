//! Gaps command - requirements missing verification or mandatory coverage

use anyhow::Result;
use console::style;
use std::path::Path;

use super::open_workspace;
use crate::analysis::{GapAnalyzer, GapKind};

/// Run the gaps command
pub fn run(path: &Path, scope: Vec<String>, standard: Option<String>, json: bool) -> Result<()> {
    let workspace = open_workspace(path)?;
    let snapshot = workspace.graph.snapshot();
    let analyzer = GapAnalyzer::new(&*snapshot, &workspace.rules, &workspace.ledger);

    let scope = (!scope.is_empty()).then_some(scope);
    let report = analyzer.coverage_gaps(scope.as_deref(), standard.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let tagged = report
        .standard
        .as_deref()
        .map(|s| format!(" tagged {s}"))
        .unwrap_or_default();
    println!(
        "\nCoverage: {} ({} of {} requirements{} have verifying tests)\n",
        style(format!("{:.1}%", report.coverage_percentage())).bold(),
        report.covered_requirements,
        report.total_requirements,
        tagged
    );

    if report.gaps.is_empty() {
        println!("{} No coverage gaps", style("✓").green());
    }
    for gap in &report.gaps {
        let label = match &gap.kind {
            GapKind::NoVerifyingTests => style("untested").red().to_string(),
            GapKind::MissingCategories { missing } => {
                let parts: Vec<String> = missing
                    .iter()
                    .map(|(standard, categories)| format!("{}: {}", standard, categories.join(", ")))
                    .collect();
                style(format!("missing {}", parts.join("; "))).yellow().to_string()
            }
        };
        println!("  {:<16} {}", style(&gap.requirement_id).cyan(), label);
        println!("    {} {}", style("→").dim(), gap.recommendation);
    }

    for err in &report.errors {
        println!("  {} {}", style("⚠").yellow(), err);
    }
    println!();
    Ok(())
}
