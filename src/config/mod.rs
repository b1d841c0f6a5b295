//! Configuration module for regtrace
//!
//! This module handles:
//! - Workspace configuration (regtrace.toml)
//! - Scoring weights and level thresholds
//! - Rule pack selection and CLI defaults

mod project_config;

pub use project_config::{
    default_config_toml, load_project_config, AssessmentConfig, CliDefaults, ProjectConfig,
    RulesConfig, ScoringConfig, CONFIG_FILE, JSON_CONFIG_FILE,
};
