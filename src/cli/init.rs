//! Init command - create a regtrace workspace

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::config::{default_config_toml, CONFIG_FILE};
use crate::storage::{Workspace, DATA_DIR};

/// Run the init command
pub fn run(path: &Path) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;

    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }

    println!("\n{} Initializing regtrace\n", style("▸").bold());

    let data_dir = root.join(DATA_DIR);
    if data_dir.exists() {
        println!(
            "{} Already initialized at {}",
            style("✓").green(),
            style(data_dir.display()).cyan()
        );
    } else {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        println!(
            "{} Created {}",
            style("✓").green(),
            style(data_dir.display()).cyan()
        );
    }

    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        println!(
            "{} Keeping existing {}",
            style("✓").green(),
            style(CONFIG_FILE).cyan()
        );
    } else {
        std::fs::write(&config_path, default_config_toml())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("{} Created {}", style("✓").green(), style(CONFIG_FILE).cyan());
    }

    // Opening registers the configured rule sets; saving pins them in the database
    let workspace = Workspace::open(&root)?;
    workspace.save()?;

    println!(
        "{} {} standard version(s) registered",
        style("✓").green(),
        style(workspace.rules.len()).cyan()
    );
    println!(
        "\nNext: {} then {}",
        style("regtrace import -i <bundle.json>").cyan(),
        style("regtrace assess").cyan()
    );
    Ok(())
}
