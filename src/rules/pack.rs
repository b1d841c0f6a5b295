//! Rule pack loading (TOML or JSON)
//!
//! A pack holds one or more standards:
//!
//! ```toml
//! [[standard]]
//! name = "ACME Internal"
//! version = "1.0"
//!
//! [[standard.rules]]
//! id = "ACME_001"
//! title = "Audit trail"
//! category = "audit"
//! mandatory = true
//! risk = "high"
//! pattern = { kind = "keywords", any_of = ["audit trail"] }
//! ```
//!
//! A file containing a single standard at the top level is accepted too.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use super::StandardRuleSet;

#[derive(Deserialize)]
struct RulePack {
    #[serde(rename = "standard")]
    standards: Vec<StandardRuleSet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PackFile {
    Many(RulePack),
    One(StandardRuleSet),
}

impl PackFile {
    fn into_sets(self) -> Vec<StandardRuleSet> {
        match self {
            PackFile::Many(pack) => pack.standards,
            PackFile::One(set) => vec![set],
        }
    }
}

/// Parse pack content; `is_json` picks the format
pub fn parse_rule_pack(content: &str, is_json: bool) -> Result<Vec<StandardRuleSet>> {
    let pack: PackFile = if is_json {
        serde_json::from_str(content).context("invalid JSON rule pack")?
    } else {
        toml::from_str(content).context("invalid TOML rule pack")?
    };
    Ok(pack.into_sets())
}

/// Load a rule pack file. The format follows the extension (`.json` or TOML).
pub fn load_rule_pack(path: &Path) -> Result<Vec<StandardRuleSet>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rule pack {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let sets = parse_rule_pack(&content, is_json)
        .with_context(|| format!("failed to parse rule pack {}", path.display()))?;
    debug!("Loaded {} standard(s) from {}", sets.len(), path.display());
    Ok(sets)
}
