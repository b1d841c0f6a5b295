//! Check command - graph integrity and assessment staleness

use anyhow::Result;
use console::style;
use std::path::Path;

use super::open_workspace;
use crate::analysis::GapAnalyzer;

/// Run the check command. Exits with code 1 when the graph has violations.
pub fn run(path: &Path) -> Result<()> {
    let workspace = open_workspace(path)?;
    let violations = workspace.graph.integrity_check();

    let snapshot = workspace.graph.snapshot();
    let stale = GapAnalyzer::new(&*snapshot, &workspace.rules, &workspace.ledger).stale_assessments();

    println!(
        "\nGraph revision {}: {} artifact(s), {} link(s)\n",
        style(snapshot.revision()).cyan(),
        snapshot.artifact_count(),
        snapshot.link_count()
    );

    if violations.is_empty() {
        println!("  {} Graph integrity OK", style("[OK]").green());
    } else {
        for v in &violations {
            println!("  {} {}", style("[!!]").red(), v);
        }
    }

    if stale.is_empty() {
        println!("  {} No stale assessments", style("[OK]").green());
    } else {
        for w in &stale {
            println!("  {} {}", style("[--]").yellow(), w);
        }
    }
    println!();

    if !violations.is_empty() {
        eprintln!("{} integrity violation(s) found", violations.len());
        std::process::exit(1);
    }
    Ok(())
}
