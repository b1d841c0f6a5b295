//! Report command - render the latest assessments

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::str::FromStr;

use super::open_workspace;
use crate::reporters::{self, OutputFormat, ReportBuilder};

/// Run the report command
pub fn run(
    path: &Path,
    format: Option<String>,
    output: Option<&Path>,
    standards: Vec<String>,
    scope: Vec<String>,
) -> Result<()> {
    let workspace = open_workspace(path)?;

    let format = format
        .or_else(|| workspace.config.defaults.format.clone())
        .unwrap_or_else(|| "text".to_string());
    let format = OutputFormat::from_str(&format)?;

    let snapshot = workspace.graph.snapshot();
    let assessments = workspace.ledger.latest_all();
    let scope = (!scope.is_empty()).then_some(scope);

    let report = ReportBuilder::new(&*snapshot)
        .with_standards(standards)
        .build(&assessments, scope.as_deref())?;
    let rendered = reporters::report_with_format(&report, format)?;

    match output {
        Some(out) => {
            std::fs::write(out, &rendered)
                .with_context(|| format!("Failed to write report to {}", out.display()))?;
            eprintln!(
                "{} Report written to {}",
                style("✓").green(),
                style(out.display()).cyan()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
