//! Import command - load an artifact bundle into the graph

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use super::open_workspace;
use crate::graph::ArtifactBundle;

/// Run the import command
pub fn run(path: &Path, file: &Path) -> Result<()> {
    let workspace = open_workspace(path)?;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let bundle: ArtifactBundle = serde_json::from_str(&content)
        .with_context(|| format!("Invalid artifact bundle: {}", file.display()))?;

    let summary = workspace
        .graph
        .import(bundle)
        .with_context(|| format!("Import of {} rejected", file.display()))?;
    workspace.save()?;

    println!(
        "{} Imported {}",
        style("✓").green(),
        style(file.display()).cyan()
    );
    println!(
        "  {} added, {} revised, {} unchanged, {} link(s) added",
        style(summary.added.len()).green(),
        style(summary.revised.len()).yellow(),
        style(summary.unchanged.len()).dim(),
        summary.links_added
    );
    if !summary.revised.is_empty() {
        println!("  Revised: {}", summary.revised.join(", "));
    }
    println!(
        "  Graph revision {}",
        style(workspace.graph.revision()).cyan()
    );
    Ok(())
}
