//! Impact command - artifacts and assessments affected by a requirement change

use anyhow::Result;
use console::style;
use std::path::Path;

use super::open_workspace;
use crate::analysis::GapAnalyzer;

/// Run the impact command
pub fn run(path: &Path, requirement: &str, json: bool) -> Result<()> {
    let workspace = open_workspace(path)?;
    let snapshot = workspace.graph.snapshot();
    let analyzer = GapAnalyzer::new(&*snapshot, &workspace.rules, &workspace.ledger);

    let affected = analyzer.impact_of(requirement)?;
    let assessments = analyzer.impacted_assessments(requirement)?;

    if json {
        let ids: Vec<&str> = assessments.iter().map(|a| a.id.as_str()).collect();
        let out = serde_json::json!({
            "requirement": requirement,
            "affected": affected,
            "assessments": ids,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "\nChanging {} affects {} artifact(s)\n",
        style(requirement).cyan().bold(),
        affected.len()
    );
    for id in &affected {
        println!("  {}", id);
    }

    if assessments.is_empty() {
        println!("\nNo recorded assessments cover it.");
    } else {
        println!("\n{} assessment(s) would need to be re-run:", assessments.len());
        for a in &assessments {
            println!(
                "  {}  {}  {}",
                style(&a.id).dim(),
                style(&a.standard).cyan(),
                a.level
            );
        }
    }
    println!();
    Ok(())
}
