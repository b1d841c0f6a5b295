//! CLI command definitions and handlers

mod assess;
mod check;
mod gaps;
mod impact;
mod import;
mod init;
mod report;
mod standards;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::storage::Workspace;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// regtrace - requirements traceability and compliance assessment
#[derive(Parser, Debug)]
#[command(name = "regtrace")]
#[command(
    version,
    about = "Trace requirements to test cases and assess them against regulatory standards",
    long_about = "regtrace keeps a versioned graph of requirements and test cases, evaluates \
them against standard rule sets (HIPAA, GDPR, ISO 13485 and custom packs) and records \
every assessment in an append-only ledger.\n\n\
Everything is stored locally under .regtrace/ in the workspace directory.",
    after_help = "\
Examples:
  regtrace init .                               Create a workspace in the current directory
  regtrace import -i artifacts.json             Load requirements, test cases and links
  regtrace assess --standard HIPAA              Assess every artifact against HIPAA
  regtrace gaps                                 List requirements missing verification
  regtrace report --format markdown -o audit.md Write an audit report"
)]
pub struct Cli {
    /// Path to the workspace (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of evaluation workers (1-64, default: [assessment] workers from config)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the .regtrace data directory and a regtrace.toml with default settings
    Init,

    /// Import requirements, test cases and links from a JSON bundle
    #[command(after_help = "\
The bundle is a JSON object with optional `requirements`, `test_cases` and `links` arrays.
Each test case may list the requirements it verifies in `verifies`.
Re-importing an unchanged bundle is a no-op; changed artifacts get a new version.")]
    Import {
        /// Bundle file
        #[arg(long, short = 'i')]
        file: PathBuf,
    },

    /// List registered standards and their rule counts
    Standards {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Assess artifacts against one or more standards
    #[command(after_help = "\
Examples:
  regtrace assess                                   All artifacts, configured standards
  regtrace assess --standard HIPAA --standard GDPR  Latest version of each standard
  regtrace assess --standard HIPAA@2024.1           Pin a standard version
  regtrace assess --scope R1 --scope T1             Assess selected artifacts only
  regtrace assess --fail-on partially_compliant     Exit 1 below this level (CI mode)")]
    Assess {
        /// Standard to assess (NAME or NAME@VERSION); repeatable
        #[arg(long, short = 's')]
        standard: Vec<String>,

        /// Artifact id to include (default: every artifact); repeatable
        #[arg(long)]
        scope: Vec<String>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Evaluation deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Exit with code 1 if the aggregate level is below this level
        #[arg(long, value_parser = ["compliant", "partially_compliant", "not_assessed"])]
        fail_on: Option<String>,
    },

    /// Show requirements that lack verifying tests or mandatory coverage
    Gaps {
        /// Requirement id to include (default: every requirement); repeatable
        #[arg(long)]
        scope: Vec<String>,

        /// Only requirements tagged with this standard, checked against it alone
        #[arg(long, short = 's')]
        standard: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a change to a requirement would affect
    Impact {
        /// Requirement id
        #[arg(long, short = 'r')]
        requirement: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check graph integrity and flag stale assessments (exit 1 on violations)
    Check,

    /// Build a compliance report from the latest assessments
    #[command(after_help = "\
Examples:
  regtrace report                                  Terminal report
  regtrace report --format json                    JSON for archiving or scripting
  regtrace report --format markdown -o audit.md    Markdown audit evidence
  regtrace report --standard HIPAA --scope R1      Restrict standards and matrix rows")]
    Report {
        /// Output format: text, json, markdown (or md)
        #[arg(long, short = 'f', value_parser = ["text", "json", "markdown", "md"])]
        format: Option<String>,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Only include these standards; repeatable
        #[arg(long, short = 's')]
        standard: Vec<String>,

        /// Requirement ids for the traceability matrix; repeatable
        #[arg(long)]
        scope: Vec<String>,
    },

    /// Show version information
    Version,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => init::run(&cli.path),

        Commands::Import { file } => import::run(&cli.path, &file),

        Commands::Standards { json } => standards::run(&cli.path, json),

        Commands::Assess {
            standard,
            scope,
            format,
            deadline_ms,
            fail_on,
        } => assess::run(
            &cli.path,
            standard,
            scope,
            &format,
            cli.workers,
            deadline_ms,
            fail_on,
        ),

        Commands::Gaps {
            scope,
            standard,
            json,
        } => gaps::run(&cli.path, scope, standard, json),

        Commands::Impact { requirement, json } => impact::run(&cli.path, &requirement, json),

        Commands::Check => check::run(&cli.path),

        Commands::Report {
            format,
            output,
            standard,
            scope,
        } => report::run(&cli.path, format, output.as_deref(), standard, scope),

        Commands::Version => {
            println!("regtrace {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Open an initialized workspace, failing with a hint otherwise
fn open_workspace(path: &Path) -> Result<Workspace> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !Workspace::is_initialized(&root) {
        anyhow::bail!(
            "No regtrace workspace at {}. Run 'regtrace init' first.",
            root.display()
        );
    }
    Workspace::open(&root)
}
