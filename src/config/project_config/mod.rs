//! Workspace-level configuration support
//!
//! Loads configuration from `regtrace.toml` or `.regtracerc.json` in the
//! workspace root.
//!
//! # Configuration Format
//!
//! ```toml
//! # regtrace.toml
//!
//! [scoring]
//! mandatory_weight = 2.0
//! optional_weight = 1.0
//! compliant_threshold = 0.90
//! partial_threshold = 0.60
//!
//! [assessment]
//! workers = 8
//! deadline_ms = 30000
//!
//! [rules]
//! builtin = true
//! packs = ["rules/internal.toml"]
//!
//! [defaults]
//! format = "text"
//! standards = ["HIPAA", "ISO 27001"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "regtrace.toml";
pub const JSON_CONFIG_FILE: &str = ".regtracerc.json";

/// Workspace configuration loaded from regtrace.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub assessment: AssessmentConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub defaults: CliDefaults,
}

/// Weights and level thresholds for compliance scoring
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default = "default_mandatory_weight")]
    pub mandatory_weight: f64,

    #[serde(default = "default_optional_weight")]
    pub optional_weight: f64,

    /// Minimum score for `compliant`
    #[serde(default = "default_compliant_threshold")]
    pub compliant_threshold: f64,

    /// Minimum score for `partially_compliant`
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f64,
}

fn default_mandatory_weight() -> f64 {
    2.0
}

fn default_optional_weight() -> f64 {
    1.0
}

fn default_compliant_threshold() -> f64 {
    0.90
}

fn default_partial_threshold() -> f64 {
    0.60
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mandatory_weight: default_mandatory_weight(),
            optional_weight: default_optional_weight(),
            compliant_threshold: default_compliant_threshold(),
            partial_threshold: default_partial_threshold(),
        }
    }
}

impl ScoringConfig {
    /// Weights must be positive and `0 <= partial <= compliant <= 1`
    pub fn is_valid(&self) -> bool {
        self.mandatory_weight.is_finite()
            && self.optional_weight.is_finite()
            && self.mandatory_weight > 0.0
            && self.optional_weight > 0.0
            && (0.0..=1.0).contains(&self.partial_threshold)
            && (0.0..=1.0).contains(&self.compliant_threshold)
            && self.partial_threshold <= self.compliant_threshold
    }
}

/// Assessment runtime settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AssessmentConfig {
    /// Evaluation threads (0 = one per core)
    #[serde(default)]
    pub workers: usize,

    /// Per-assessment deadline in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl AssessmentConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Which rule sets a workspace loads
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RulesConfig {
    /// Register the built-in standards
    #[serde(default = "default_true")]
    pub builtin: bool,

    /// Rule pack files, relative to the workspace root
    #[serde(default)]
    pub packs: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            packs: Vec::new(),
        }
    }
}

/// CLI defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CliDefaults {
    /// Default output format (text, json, markdown)
    #[serde(default)]
    pub format: Option<String>,

    /// Standards assessed when `--standard` is not given
    #[serde(default)]
    pub standards: Vec<String>,
}

/// Load workspace configuration from the root directory.
///
/// Tries `regtrace.toml` first, then `.regtracerc.json`. A file that fails to
/// parse or carries invalid scoring settings is reported and skipped.
pub fn load_project_config(root: &Path) -> ProjectConfig {
    let toml_path = root.join(CONFIG_FILE);
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded workspace config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = root.join(JSON_CONFIG_FILE);
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded workspace config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No workspace config found, using defaults");
    ProjectConfig::default()
}

fn check(config: ProjectConfig) -> anyhow::Result<ProjectConfig> {
    if !config.scoring.is_valid() {
        anyhow::bail!(
            "invalid [scoring] section: weights must be positive and 0 <= partial_threshold <= compliant_threshold <= 1"
        );
    }
    Ok(config)
}

/// Load configuration from a TOML file
fn load_toml_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    check(toml::from_str(&content)?)
}

/// Load configuration from a JSON file
fn load_json_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    check(serde_json::from_str(&content)?)
}

/// Default `regtrace.toml` written by `regtrace init`
pub fn default_config_toml() -> String {
    r#"# regtrace workspace configuration

[scoring]
mandatory_weight = 2.0
optional_weight = 1.0
compliant_threshold = 0.90
partial_threshold = 0.60

[assessment]
workers = 0          # 0 = one thread per core
# deadline_ms = 30000

[rules]
builtin = true
packs = []

[defaults]
format = "text"
standards = []
"#
    .to_string()
}
