//! Standards command - list registered rule sets

use anyhow::Result;
use console::style;
use std::path::Path;

use super::open_workspace;

/// Run the standards command
pub fn run(path: &Path, json: bool) -> Result<()> {
    let workspace = open_workspace(path)?;
    let overview = workspace.rules.overview();

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    if overview.is_empty() {
        println!("No standards registered.");
        return Ok(());
    }

    println!(
        "\n{:<16} {:<10} {:>6} {:>10} {:>10}",
        style("STANDARD").bold(),
        style("VERSION").bold(),
        style("RULES").bold(),
        style("MANDATORY").bold(),
        style("HIGH RISK").bold()
    );
    for s in &overview {
        println!(
            "{:<16} {:<10} {:>6} {:>10} {:>10}",
            style(&s.name).cyan(),
            s.version,
            s.rules_count,
            s.mandatory_rules,
            s.high_risk_rules
        );
        if !s.description.is_empty() {
            println!("  {}", style(&s.description).dim());
        }
    }
    println!();
    Ok(())
}
